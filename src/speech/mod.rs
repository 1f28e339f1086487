//! Speech input and output seams
//!
//! The session controller only talks to the traits in this module. Engines
//! report recognition progress through a [`RecognitionSink`] callback using
//! the start/result/error/end event contract; synthesis is fire-and-forget.

pub mod command;
pub mod listening;

use std::sync::Arc;

use thiserror::Error;

pub use command::{CommandRecognitionBackend, CommandRecognizer, CommandSynthesizer};
pub use listening::ListeningState;

#[derive(Debug, Error)]
pub enum SpeechError {
    /// No engine is available for this capability
    #[error("{0}")]
    Unsupported(String),

    /// The engine exists but refused to start
    #[error("failed to start recognition: {0}")]
    Start(String),
}

/// How a recognizer should listen
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionConfig {
    pub lang: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
}

impl Default for RecognitionConfig {
    /// Single-shot, final results only, one alternative, US English
    fn default() -> Self {
        Self {
            lang: "en-US".to_string(),
            continuous: false,
            interim_results: false,
            max_alternatives: 1,
        }
    }
}

impl RecognitionConfig {
    pub fn with_lang(lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f32,
}

/// One recognized segment with its ranked alternatives
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub alternatives: Vec<Alternative>,
    pub is_final: bool,
}

impl RecognitionResult {
    pub fn single(transcript: impl Into<String>) -> Self {
        Self {
            alternatives: vec![Alternative {
                transcript: transcript.into(),
                confidence: 1.0,
            }],
            is_final: true,
        }
    }
}

/// Events delivered by a recognition engine
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Start,
    Result(Vec<RecognitionResult>),
    /// Engine error code, e.g. `no-speech` or `not-allowed`
    Error(String),
    End,
}

impl RecognitionEvent {
    /// Top alternative of the first final result, trimmed; `None` when
    /// blank or when only interim results arrived
    pub fn top_alternative(&self) -> Option<Alternative> {
        let RecognitionEvent::Result(results) = self else {
            return None;
        };
        let top = results.iter().find(|r| r.is_final)?.alternatives.first()?;
        let transcript = top.transcript.trim();
        if transcript.is_empty() {
            return None;
        }
        Some(Alternative {
            transcript: transcript.to_string(),
            confidence: top.confidence,
        })
    }
}

pub type RecognitionSink = Arc<dyn Fn(RecognitionEvent) + Send + Sync>;

/// A live recognizer handle, reusable across start/stop cycles
pub trait Recognizer: Send {
    fn start(&mut self) -> Result<(), SpeechError>;
    fn stop(&mut self);
}

/// Creates recognizers; fails with [`SpeechError::Unsupported`] when the
/// platform offers no recognition capability.
pub trait RecognitionBackend: Send {
    fn create(
        &self,
        config: &RecognitionConfig,
        sink: RecognitionSink,
    ) -> Result<Box<dyn Recognizer>, SpeechError>;
}

/// A synthesized speech request
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
}

impl Utterance {
    /// Neutral rate and pitch
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

pub trait SpeechSynthesizer: Send + Sync {
    fn is_available(&self) -> bool;
    /// Queue an utterance behind anything already playing
    fn speak(&self, utterance: Utterance);
    /// Drop queued utterances and stop the one playing
    fn cancel(&self);
}
