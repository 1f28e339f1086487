use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_CONVERSATION_ID: &str = "demo_conv_1";
pub const DEFAULT_LANG: &str = "en-US";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Environment variable holding the chat backend base URL
pub const API_BASE_ENV: &str = "VOICE_CHAT_API_BASE_URL";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub conversation_id: String,
    pub lang: String,
    /// Program + args that capture one utterance and print its transcript.
    /// `{lang}` is replaced with the recognition locale.
    pub recognizer_command: Option<Vec<String>>,
    /// Program + args that speak their last argument (or `{text}`).
    /// `{wpm}` and `{pitch}` are derived from the utterance.
    pub synthesizer_command: Option<Vec<String>>,
    pub speech_rate: f32,
    pub speech_pitch: f32,
    /// Seconds before a chat request is abandoned and reported as failed
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Values given on the command line or through the environment; these win
/// over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_base: Option<String>,
    pub conversation_id: Option<String>,
    pub lang: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            conversation_id: DEFAULT_CONVERSATION_ID.to_string(),
            lang: DEFAULT_LANG.to_string(),
            recognizer_command: None,
            synthesizer_command: None,
            speech_rate: 1.0,
            speech_pitch: 1.0,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Missing file means defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(api_base) = overrides.api_base.filter(|s| !s.trim().is_empty()) {
            self.api_base = api_base;
        }
        if let Some(conversation_id) = overrides.conversation_id {
            self.conversation_id = conversation_id;
        }
        if let Some(lang) = overrides.lang {
            self.lang = lang;
        }
        self
    }

    /// Never zero; a zero timeout would fail every request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("voice-chat").join("config.json"))
    }

    pub fn default_log_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("voice-chat").join("voicechat.log"))
    }
}
