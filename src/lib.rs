pub mod chat;
pub mod config;
pub mod session;
pub mod speech;
pub mod state;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use chat::{ChatClient, ChatError, ChatReply};
pub use config::Config;
pub use session::{SessionController, SessionEvent};
pub use speech::{
    CommandRecognitionBackend, CommandSynthesizer, ListeningState, RecognitionEvent,
    SpeechSynthesizer, Utterance,
};
pub use state::{ChatMessage, ChatRole, FALLBACK_REPLY};
