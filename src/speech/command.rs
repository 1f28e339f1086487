//! Speech engines backed by external programs.
//!
//! Recognition runs one process per listening cycle: the program captures a
//! single utterance and prints its transcript on stdout. Synthesis runs one
//! process per utterance, in order, from a background worker.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::{
    RecognitionBackend, RecognitionConfig, RecognitionEvent, RecognitionResult, RecognitionSink,
    Recognizer, SpeechError, SpeechSynthesizer, Utterance,
};

/// Words per minute at rate 1.0 (matches `say` and `espeak` defaults)
const BASE_WORDS_PER_MINUTE: f32 = 175.0;
/// `espeak` pitch at 1.0, on its 0-99 scale
const BASE_PITCH: f32 = 50.0;

fn substitute(args: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        })
        .collect()
}

pub fn default_synthesizer_command() -> Vec<String> {
    let command: &[&str] = if cfg!(target_os = "macos") {
        &["say", "-r", "{wpm}"]
    } else {
        &["espeak", "-s", "{wpm}", "-p", "{pitch}"]
    };
    command.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

fn recognizer_args(args: &[String], config: &RecognitionConfig) -> Vec<String> {
    let max_alternatives = config.max_alternatives.to_string();
    let continuous = config.continuous.to_string();
    let interim_results = config.interim_results.to_string();
    substitute(
        args,
        &[
            ("lang", config.lang.as_str()),
            ("max_alternatives", max_alternatives.as_str()),
            ("continuous", continuous.as_str()),
            ("interim_results", interim_results.as_str()),
        ],
    )
}

pub struct CommandRecognitionBackend {
    command: Option<Vec<String>>,
}

impl CommandRecognitionBackend {
    pub fn new(command: Option<Vec<String>>) -> Self {
        Self { command }
    }
}

impl RecognitionBackend for CommandRecognitionBackend {
    fn create(
        &self,
        config: &RecognitionConfig,
        sink: RecognitionSink,
    ) -> Result<Box<dyn Recognizer>, SpeechError> {
        let Some((program, args)) = self.command.as_deref().and_then(|c| c.split_first()) else {
            return Err(SpeechError::Unsupported(
                "Speech recognition not supported. Set recognizer_command in the config file."
                    .to_string(),
            ));
        };

        let program = which::which(program).map_err(|_| {
            SpeechError::Unsupported(format!(
                "Speech recognition not supported: `{program}` not found on PATH."
            ))
        })?;

        let args = recognizer_args(args, config);

        tracing::info!(program = %program.display(), lang = %config.lang, "recognizer created");
        Ok(Box::new(CommandRecognizer {
            program,
            args,
            sink,
            run: None,
        }))
    }
}

struct RecognitionRun {
    task: JoinHandle<()>,
    stop: Option<oneshot::Sender<()>>,
}

pub struct CommandRecognizer {
    program: PathBuf,
    args: Vec<String>,
    sink: RecognitionSink,
    run: Option<RecognitionRun>,
}

impl Recognizer for CommandRecognizer {
    fn start(&mut self) -> Result<(), SpeechError> {
        if self.run.as_ref().is_some_and(|run| !run.task.is_finished()) {
            return Err(SpeechError::Start("recognition has already started".to_string()));
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Start(e.to_string()))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_recognition(child, stop_rx, Arc::clone(&self.sink)));
        self.run = Some(RecognitionRun {
            task,
            stop: Some(stop_tx),
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = self.run.as_mut().and_then(|run| run.stop.take()) {
            let _ = stop.send(());
        }
    }
}

impl Drop for CommandRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_recognition(
    mut child: Child,
    mut stop: oneshot::Receiver<()>,
    sink: RecognitionSink,
) {
    sink(RecognitionEvent::Start);

    let reader = child.stdout.take().map(|mut stdout| {
        tokio::spawn(async move {
            let mut out = String::new();
            stdout.read_to_string(&mut out).await.map(|_| out)
        })
    });

    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) if status.success() => {
                    let transcript = match reader {
                        Some(reader) => reader.await.ok().and_then(Result::ok).unwrap_or_default(),
                        None => String::new(),
                    };
                    if transcript.trim().is_empty() {
                        sink(RecognitionEvent::Error("no-speech".to_string()));
                    } else {
                        let transcript = transcript.trim_end_matches(['\r', '\n']);
                        sink(RecognitionEvent::Result(vec![RecognitionResult::single(transcript)]));
                    }
                }
                Ok(status) => {
                    tracing::warn!(%status, "recognizer exited unsuccessfully");
                    sink(RecognitionEvent::Error(format!("recognizer {status}")));
                }
                Err(e) => sink(RecognitionEvent::Error(e.to_string())),
            }
        }
        _ = &mut stop => {
            tracing::debug!("stopping recognizer");
            let _ = child.kill().await;
            if let Some(reader) = reader {
                reader.abort();
            }
        }
    }

    sink(RecognitionEvent::End);
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

enum SynthJob {
    Speak { utterance: Utterance, generation: u64 },
    Flush(oneshot::Sender<()>),
}

/// Plays utterances one after another through an external program
pub struct CommandSynthesizer {
    available: bool,
    jobs: mpsc::UnboundedSender<SynthJob>,
    generation: watch::Sender<u64>,
}

impl CommandSynthesizer {
    /// Uses the platform default program when `command` is `None`.
    /// Must be called inside a tokio runtime.
    pub fn new(command: Option<Vec<String>>) -> Self {
        let command = command.unwrap_or_else(default_synthesizer_command);
        let program = command
            .split_first()
            .and_then(|(program, args)| which::which(program).ok().map(|p| (p, args.to_vec())));

        let (jobs, jobs_rx) = mpsc::unbounded_channel();
        let (generation, generation_rx) = watch::channel(0u64);

        let available = match program {
            Some((program, args)) => {
                tracing::info!(program = %program.display(), "speech synthesis available");
                tokio::spawn(synthesis_worker(program, args, jobs_rx, generation_rx));
                true
            }
            None => {
                tracing::warn!(command = ?command, "speech synthesis program not found");
                false
            }
        };

        Self {
            available,
            jobs,
            generation,
        }
    }

    /// Never speaks; used when output is muted
    pub fn disabled() -> Self {
        let (jobs, _) = mpsc::unbounded_channel();
        let (generation, _) = watch::channel(0u64);
        Self {
            available: false,
            jobs,
            generation,
        }
    }

    /// Resolves once everything queued so far has finished playing
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.jobs.send(SynthJob::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn speak(&self, utterance: Utterance) {
        let generation = *self.generation.borrow();
        if self.jobs.send(SynthJob::Speak { utterance, generation }).is_err() {
            tracing::warn!("speech synthesis worker is gone");
        }
    }

    fn cancel(&self) {
        self.generation.send_modify(|g| *g += 1);
    }
}

fn utterance_args(args: &[String], utterance: &Utterance) -> Vec<String> {
    let wpm = ((BASE_WORDS_PER_MINUTE * utterance.rate).round().max(1.0) as u32).to_string();
    let pitch = ((BASE_PITCH * utterance.pitch).round().clamp(0.0, 99.0) as u32).to_string();

    let mut out = substitute(
        args,
        &[
            ("wpm", wpm.as_str()),
            ("pitch", pitch.as_str()),
            ("text", utterance.text.as_str()),
        ],
    );
    if !args.iter().any(|arg| arg.contains("{text}")) {
        out.push(utterance.text.clone());
    }
    out
}

async fn synthesis_worker(
    program: PathBuf,
    args: Vec<String>,
    mut jobs: mpsc::UnboundedReceiver<SynthJob>,
    mut generation: watch::Receiver<u64>,
) {
    while let Some(job) = jobs.recv().await {
        let (utterance, queued_at) = match job {
            SynthJob::Flush(done) => {
                let _ = done.send(());
                continue;
            }
            SynthJob::Speak { utterance, generation } => (utterance, generation),
        };

        if *generation.borrow_and_update() != queued_at {
            tracing::debug!("dropping cancelled utterance");
            continue;
        }

        let spawned = Command::new(&program)
            .args(utterance_args(&args, &utterance))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(error = %e, "failed to start speech synthesis");
                continue;
            }
        };

        tokio::select! {
            status = child.wait() => {
                if let Ok(status) = status {
                    if !status.success() {
                        tracing::warn!(%status, "speech synthesis exited unsuccessfully");
                    }
                }
            }
            _ = generation.changed() => {
                tracing::debug!("cancelling utterance in flight");
                let _ = child.kill().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn collecting_sink() -> (RecognitionSink, mpsc::UnboundedReceiver<RecognitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: RecognitionSink = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        (sink, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<RecognitionEvent>) -> RecognitionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for recognition event")
            .expect("sink closed")
    }

    #[test]
    fn test_substitute_placeholders() {
        let args = strings(&["--lang", "{lang}", "-n{max_alternatives}"]);
        let out = substitute(&args, &[("lang", "en-US"), ("max_alternatives", "1")]);
        assert_eq!(out, strings(&["--lang", "en-US", "-n1"]));
    }

    #[test]
    fn test_recognizer_args_carry_listening_mode() {
        let args = strings(&[
            "--lang={lang}",
            "--alternatives={max_alternatives}",
            "--continuous={continuous}",
            "--interim={interim_results}",
        ]);
        let out = recognizer_args(&args, &RecognitionConfig::with_lang("en-GB"));
        assert_eq!(
            out,
            strings(&["--lang=en-GB", "--alternatives=1", "--continuous=false", "--interim=false"])
        );
    }

    #[test]
    fn test_utterance_args_appends_text() {
        let args = strings(&["-s", "{wpm}", "-p", "{pitch}"]);
        let out = utterance_args(&args, &Utterance::new("hi there"));
        assert_eq!(out, strings(&["-s", "175", "-p", "50", "hi there"]));
    }

    #[test]
    fn test_utterance_args_text_placeholder() {
        let args = strings(&["--say={text}", "--fast"]);
        let mut utterance = Utterance::new("hello");
        utterance.rate = 2.0;
        let out = utterance_args(&args, &utterance);
        assert_eq!(out, strings(&["--say=hello", "--fast"]));
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut utterance = Utterance::new("x");
        utterance.pitch = 4.0;
        let out = utterance_args(&strings(&["{pitch}"]), &utterance);
        assert_eq!(out[0], "99");
    }

    #[test]
    fn test_backend_without_command_is_unsupported() {
        let (sink, _rx) = collecting_sink();
        let backend = CommandRecognitionBackend::new(None);
        let err = backend.create(&RecognitionConfig::default(), sink).err().unwrap();
        assert!(matches!(err, SpeechError::Unsupported(_)));
    }

    #[test]
    fn test_backend_with_missing_program_is_unsupported() {
        let (sink, _rx) = collecting_sink();
        let backend =
            CommandRecognitionBackend::new(Some(strings(&["no-such-recognizer-program-xyz"])));
        let err = backend.create(&RecognitionConfig::default(), sink).err().unwrap();
        assert!(err.to_string().contains("not found on PATH"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recognizer_reports_transcript() {
        let (sink, mut rx) = collecting_sink();
        let backend =
            CommandRecognitionBackend::new(Some(strings(&["sh", "-c", "echo '  book a flight  '"])));
        let mut recognizer = backend.create(&RecognitionConfig::default(), sink).unwrap();
        recognizer.start().unwrap();

        assert_eq!(next_event(&mut rx).await, RecognitionEvent::Start);
        let result = next_event(&mut rx).await;
        assert_eq!(
            result.top_alternative().map(|a| a.transcript).as_deref(),
            Some("book a flight")
        );
        assert_eq!(next_event(&mut rx).await, RecognitionEvent::End);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recognizer_empty_output_is_no_speech() {
        let (sink, mut rx) = collecting_sink();
        let backend = CommandRecognitionBackend::new(Some(strings(&["true"])));
        let mut recognizer = backend.create(&RecognitionConfig::default(), sink).unwrap();
        recognizer.start().unwrap();

        assert_eq!(next_event(&mut rx).await, RecognitionEvent::Start);
        assert_eq!(next_event(&mut rx).await, RecognitionEvent::Error("no-speech".into()));
        assert_eq!(next_event(&mut rx).await, RecognitionEvent::End);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recognizer_stop_ends_cycle_and_can_restart() {
        let (sink, mut rx) = collecting_sink();
        let backend = CommandRecognitionBackend::new(Some(strings(&["sleep", "30"])));
        let mut recognizer = backend.create(&RecognitionConfig::default(), sink).unwrap();

        recognizer.start().unwrap();
        assert_eq!(next_event(&mut rx).await, RecognitionEvent::Start);
        assert!(recognizer.start().is_err(), "second start while running must fail");

        recognizer.stop();
        assert_eq!(next_event(&mut rx).await, RecognitionEvent::End);

        // Give the run task a moment to finish before reusing the handle
        tokio::time::sleep(Duration::from_millis(50)).await;
        recognizer.start().unwrap();
        assert_eq!(next_event(&mut rx).await, RecognitionEvent::Start);
        recognizer.stop();
        assert_eq!(next_event(&mut rx).await, RecognitionEvent::End);
    }

    #[tokio::test]
    async fn test_synthesizer_missing_program_is_unavailable() {
        let synth = CommandSynthesizer::new(Some(strings(&["no-such-tts-program-xyz"])));
        assert!(!synth.is_available());
        // Speaking and flushing must not hang or panic
        synth.speak(Utterance::new("hi"));
        synth.flush().await;
    }

    #[tokio::test]
    async fn test_disabled_synthesizer() {
        let synth = CommandSynthesizer::disabled();
        assert!(!synth.is_available());
        synth.cancel();
        synth.flush().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_synthesizer_plays_and_flushes() {
        let synth = CommandSynthesizer::new(Some(strings(&["true"])));
        assert!(synth.is_available());
        synth.speak(Utterance::new("one"));
        synth.speak(Utterance::new("two"));
        tokio::time::timeout(Duration::from_secs(5), synth.flush())
            .await
            .expect("flush timed out");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_synthesizer_cancel_drops_queue() {
        let synth = CommandSynthesizer::new(Some(strings(&["sleep", "30"])));
        synth.speak(Utterance::new("1"));
        synth.speak(Utterance::new("2"));
        synth.cancel();
        // Without cancellation this would take a minute
        tokio::time::timeout(Duration::from_secs(5), synth.flush())
            .await
            .expect("cancelled utterances still playing");
    }
}
