//! Test doubles for the speech seams, plus log capture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::speech::{
    RecognitionBackend, RecognitionConfig, RecognitionEvent, RecognitionSink, Recognizer,
    SpeechError, SpeechSynthesizer, Utterance,
};

#[derive(Clone, Copy)]
enum FakeMode {
    Supported,
    Unsupported,
    FailingStart,
}

#[derive(Default)]
struct Counters {
    creates: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// Recognition backend whose recognizers emit `Start` as soon as they are
/// started; tests inject every other event by hand.
#[derive(Clone)]
pub struct FakeRecognitionBackend {
    mode: FakeMode,
    counters: Arc<Counters>,
}

impl FakeRecognitionBackend {
    fn with_mode(mode: FakeMode) -> Self {
        Self {
            mode,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn supported() -> Self {
        Self::with_mode(FakeMode::Supported)
    }

    pub fn unsupported() -> Self {
        Self::with_mode(FakeMode::Unsupported)
    }

    pub fn failing_start() -> Self {
        Self::with_mode(FakeMode::FailingStart)
    }

    pub fn creates(&self) -> usize {
        self.counters.creates.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }
}

impl RecognitionBackend for FakeRecognitionBackend {
    fn create(
        &self,
        _config: &RecognitionConfig,
        sink: RecognitionSink,
    ) -> Result<Box<dyn Recognizer>, SpeechError> {
        if let FakeMode::Unsupported = self.mode {
            return Err(SpeechError::Unsupported(
                "Speech recognition not supported on this system.".to_string(),
            ));
        }
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRecognizer {
            fail_start: matches!(self.mode, FakeMode::FailingStart),
            counters: Arc::clone(&self.counters),
            sink,
        }))
    }
}

struct FakeRecognizer {
    fail_start: bool,
    counters: Arc<Counters>,
    sink: RecognitionSink,
}

impl Recognizer for FakeRecognizer {
    fn start(&mut self) -> Result<(), SpeechError> {
        if self.fail_start {
            return Err(SpeechError::Start("not-allowed".to_string()));
        }
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        (self.sink)(RecognitionEvent::Start);
        Ok(())
    }

    fn stop(&mut self) {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Synthesizer that records what it was asked to say
pub struct RecordingSynthesizer {
    available: bool,
    spoken: Mutex<Vec<Utterance>>,
    cancels: AtomicUsize,
}

impl RecordingSynthesizer {
    fn new(available: bool) -> Self {
        Self {
            available,
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn available() -> Self {
        Self::new(true)
    }

    pub fn unavailable() -> Self {
        Self::new(false)
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|u| u.text).collect()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl SpeechSynthesizer for RecordingSynthesizer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn speak(&self, utterance: Utterance) {
        self.spoken.lock().unwrap().push(utterance);
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects formatted log lines so tests can assert on what a user would see
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
