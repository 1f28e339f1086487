//! Listening lifecycle driven by recognition engine events.
//!
//! - Idle -> Listening (engine started)
//! - Listening -> Erroring (engine reported an error)
//! - Listening / Erroring -> Idle (engine ended)
//!
//! Engines may report an error or an end without a prior start (a denied
//! microphone, for example), so every event is accepted from every state.

use std::fmt;

use super::RecognitionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListeningState {
    #[default]
    Idle,
    Listening,
    /// An error was reported; waiting for the engine's end event
    Erroring,
}

impl fmt::Display for ListeningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListeningState::Idle => write!(f, "Idle"),
            ListeningState::Listening => write!(f, "Listening"),
            ListeningState::Erroring => write!(f, "Erroring"),
        }
    }
}

impl ListeningState {
    /// State after the engine delivers `event`. Results do not move the state.
    pub fn on_event(self, event: &RecognitionEvent) -> ListeningState {
        let next = match event {
            RecognitionEvent::Start => ListeningState::Listening,
            RecognitionEvent::Error(_) => ListeningState::Erroring,
            RecognitionEvent::End => ListeningState::Idle,
            RecognitionEvent::Result(_) => self,
        };
        if next != self {
            tracing::debug!("Listening state: {} -> {}", self, next);
        }
        next
    }

    pub fn is_listening(&self) -> bool {
        *self == ListeningState::Listening
    }
}
