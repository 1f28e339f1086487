//! Conversation session controller
//!
//! Single owner of the conversation state. Every mutation happens inside one
//! of the handlers below, called from the task that owns the controller.
//! Asynchronous work (chat requests, recognition engine callbacks) reports
//! back as [`SessionEvent`]s on the channel returned by
//! [`SessionController::new`]; feed them to [`SessionController::handle_event`].
//!
//! Chat exchanges are serialized: an utterance submitted while a request is
//! in flight is shown immediately but only sent once the previous reply has
//! settled, so replies always land after the turn that produced them.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chat::{ChatClient, ChatError, ChatReply};
use crate::config::Config;
use crate::speech::{
    Alternative, ListeningState, RecognitionBackend, RecognitionConfig, RecognitionEvent,
    RecognitionSink, Recognizer, SpeechError, SpeechSynthesizer, Utterance,
};
use crate::state::{ChatMessage, FALLBACK_REPLY};

pub const MICROPHONE_ERROR: &str = "Could not start microphone. Check permissions.";

#[derive(Debug)]
pub enum SessionEvent {
    Recognition(RecognitionEvent),
    ExchangeSettled {
        turn: u64,
        outcome: Result<ChatReply, ChatError>,
    },
}

/// A user turn waiting to be sent, bound to the conversation it was typed in
struct QueuedTurn {
    conversation_id: String,
    user_text: String,
}

struct InFlight {
    turn: u64,
    task: JoinHandle<()>,
}

pub struct SessionController {
    conversation_id: String,
    messages: Vec<ChatMessage>,
    pending_input: String,
    listening: ListeningState,
    last_error: Option<String>,

    chat: ChatClient,
    recognition: Box<dyn RecognitionBackend>,
    recognition_config: RecognitionConfig,
    recognizer: Option<Box<dyn Recognizer>>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    speech_rate: f32,
    speech_pitch: f32,

    events: mpsc::UnboundedSender<SessionEvent>,
    queued: VecDeque<QueuedTurn>,
    in_flight: Option<InFlight>,
    next_turn: u64,
    shut_down: bool,
}

impl SessionController {
    pub fn new(
        config: &Config,
        chat: ChatClient,
        recognition: Box<dyn RecognitionBackend>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();

        let session = Self {
            conversation_id: config.conversation_id.clone(),
            messages: Vec::new(),
            pending_input: String::new(),
            listening: ListeningState::Idle,
            last_error: None,

            chat,
            recognition,
            recognition_config: RecognitionConfig::with_lang(config.lang.clone()),
            recognizer: None,
            synthesizer,
            speech_rate: config.speech_rate,
            speech_pitch: config.speech_pitch,

            events,
            queued: VecDeque::new(),
            in_flight: None,
            next_turn: 0,
            shut_down: false,
        };

        (session, events_rx)
    }

    // State accessors

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn conversation_id_mut(&mut self) -> &mut String {
        &mut self.conversation_id
    }

    pub fn set_conversation_id(&mut self, id: impl Into<String>) {
        self.conversation_id = id.into();
    }

    /// Oldest first
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn pending_input_mut(&mut self) -> &mut String {
        &mut self.pending_input
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some() || !self.queued.is_empty()
    }

    pub fn is_listening(&self) -> bool {
        self.listening.is_listening()
    }

    pub fn listening_state(&self) -> ListeningState {
        self.listening
    }

    // Submission

    /// Typed input path: trims the input box and submits it
    pub fn submit_input(&mut self) {
        let trimmed = self.pending_input.trim().to_string();
        if trimmed.is_empty() {
            return;
        }
        self.pending_input.clear();
        self.submit_text(&trimmed);
    }

    /// Append a user message and send it to the backend.
    /// Blank text is ignored without touching the error banner.
    pub fn submit_text(&mut self, text: &str) {
        if self.shut_down || text.trim().is_empty() {
            return;
        }

        self.messages.push(ChatMessage::user(text));
        self.last_error = None;
        self.queued.push_back(QueuedTurn {
            conversation_id: self.conversation_id.clone(),
            user_text: text.to_string(),
        });
        self.dispatch_next();
    }

    fn dispatch_next(&mut self) {
        if self.in_flight.is_some() {
            tracing::debug!(queued = self.queued.len(), "exchange in flight, utterance queued");
            return;
        }
        let Some(QueuedTurn {
            conversation_id,
            user_text,
        }) = self.queued.pop_front()
        else {
            return;
        };

        self.next_turn += 1;
        let turn = self.next_turn;
        let chat = self.chat.clone();
        let events = self.events.clone();

        tracing::debug!(turn, conversation_id = %conversation_id, "dispatching chat exchange");
        let task = tokio::spawn(async move {
            let outcome = chat.send(&conversation_id, &user_text).await;
            let _ = events.send(SessionEvent::ExchangeSettled { turn, outcome });
        });
        self.in_flight = Some(InFlight { turn, task });
    }

    fn on_exchange_settled(&mut self, turn: u64, outcome: Result<ChatReply, ChatError>) {
        if self.in_flight.as_ref().map(|f| f.turn) != Some(turn) {
            tracing::debug!(turn, "ignoring stale exchange result");
            return;
        }
        self.in_flight = None;

        match outcome {
            Ok(reply) => {
                tracing::info!(turn, "assistant replied");
                self.messages.push(ChatMessage::assistant(reply.reply.clone()));
                self.speak(&reply.reply);
            }
            Err(e) => {
                tracing::error!(turn, error = %e, "chat exchange failed");
                self.messages.push(ChatMessage::assistant(FALLBACK_REPLY));
                self.last_error = Some(e.to_string());
            }
        }

        self.dispatch_next();
    }

    // Speech output

    fn speak(&self, text: &str) {
        if !self.synthesizer.is_available() {
            tracing::debug!("speech synthesis off, reply not spoken");
            return;
        }
        self.synthesizer.speak(Utterance {
            text: text.to_string(),
            rate: self.speech_rate,
            pitch: self.speech_pitch,
        });
    }

    // Speech input

    fn recognition_sink(&self) -> RecognitionSink {
        let events = self.events.clone();
        Arc::new(move |event| {
            let _ = events.send(SessionEvent::Recognition(event));
        })
    }

    /// Create the recognizer on first use, then start a listening cycle.
    /// Failures land in the error banner; listening stays off.
    pub fn start_listening(&mut self) {
        if self.shut_down {
            return;
        }

        if self.recognizer.is_none() {
            match self.recognition.create(&self.recognition_config, self.recognition_sink()) {
                Ok(recognizer) => self.recognizer = Some(recognizer),
                Err(SpeechError::Unsupported(reason)) => {
                    tracing::warn!(%reason, "speech recognition unavailable");
                    self.last_error = Some(reason);
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to create recognizer");
                    self.last_error = Some(MICROPHONE_ERROR.to_string());
                    return;
                }
            }
        }

        if let Some(recognizer) = self.recognizer.as_mut() {
            if let Err(e) = recognizer.start() {
                tracing::warn!(error = %e, "failed to start recognizer");
                self.last_error = Some(MICROPHONE_ERROR.to_string());
            }
        }
    }

    pub fn stop_listening(&mut self) {
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
    }

    /// Talk/stop button
    pub fn toggle_listening(&mut self) {
        if self.is_listening() {
            self.stop_listening();
        } else {
            self.start_listening();
        }
    }

    fn on_recognition(&mut self, event: RecognitionEvent) {
        self.listening = self.listening.on_event(&event);

        match &event {
            RecognitionEvent::Start => self.last_error = None,
            RecognitionEvent::Error(code) => {
                tracing::warn!(%code, "speech recognition error");
                self.last_error = Some(format!("STT error: {code}"));
            }
            RecognitionEvent::End => {}
            RecognitionEvent::Result(_) => {
                if let Some(Alternative {
                    transcript,
                    confidence,
                }) = event.top_alternative()
                {
                    tracing::info!(%transcript, confidence, "heard");
                    self.submit_text(&transcript);
                }
            }
        }
    }

    // Events and lifetime

    pub fn handle_event(&mut self, event: SessionEvent) {
        if self.shut_down {
            return;
        }
        match event {
            SessionEvent::Recognition(event) => self.on_recognition(event),
            SessionEvent::ExchangeSettled { turn, outcome } => self.on_exchange_settled(turn, outcome),
        }
    }

    /// Cancel speech, release the recognizer and abandon any pending
    /// exchange. The controller ignores all further input.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.synthesizer.cancel();
        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.stop();
        }
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
        }
        self.queued.clear();
        self.listening = ListeningState::Idle;

        tracing::info!("session shut down");
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
