use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use voice_chat::config::{API_BASE_ENV, Overrides};
use voice_chat::{
    ChatClient, CommandRecognitionBackend, CommandSynthesizer, Config, SessionController,
    SpeechSynthesizer,
};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "voicechat", version)]
#[command(about = "Talk to a chat assistant by voice or keyboard and hear its replies")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Base URL of the chat backend
    #[arg(long, global = true, env = API_BASE_ENV)]
    api_base: Option<String>,

    /// Conversation to continue
    #[arg(long, global = true)]
    conversation_id: Option<String>,

    /// Recognition language, e.g. en-US
    #[arg(long, global = true)]
    lang: Option<String>,

    /// Write logs here instead of the default log file (interactive mode only)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the reply
    Send {
        /// Message text
        text: String,
        /// Also speak the reply aloud
        #[arg(long)]
        speak: bool,
    },
    /// Check that the chat backend is reachable
    Health,
    /// Print the effective configuration and where it is read from
    Config {
        /// Write the effective configuration back to the config file
        #[arg(long)]
        save: bool,
    },
}

fn log_filter(verbose: u8) -> EnvFilter {
    // RUST_LOG wins over -v
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

fn init_stderr_logging(verbose: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// The terminal belongs to the UI, so interactive mode logs to a file.
/// Keep the guard alive until exit or buffered lines are lost.
fn init_file_logging(verbose: u8, path: &Path) -> Result<WorkerGuard> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = Overrides {
        api_base: cli.api_base.clone(),
        conversation_id: cli.conversation_id.clone(),
        lang: cli.lang.clone(),
    };

    match cli.command {
        None => {
            let log_path = match cli.log_file {
                Some(path) => path,
                None => Config::default_log_path()?,
            };
            let _guard = init_file_logging(cli.verbose, &log_path)?;
            let config = Config::load()?.apply(overrides);
            run_tui(config).await
        }
        Some(Commands::Send { text, speak }) => {
            init_stderr_logging(cli.verbose);
            let config = Config::load()?.apply(overrides);
            send_once(config, &text, speak).await
        }
        Some(Commands::Health) => {
            init_stderr_logging(cli.verbose);
            let config = Config::load()?.apply(overrides);
            check_health(&config).await
        }
        Some(Commands::Config { save }) => {
            init_stderr_logging(cli.verbose);
            let config = Config::load()?.apply(overrides);
            show_config(&config, save)
        }
    }
}

async fn run_tui(config: Config) -> Result<()> {
    tracing::info!(api_base = %config.api_base, conversation_id = %config.conversation_id, "starting");

    let synthesizer = Arc::new(CommandSynthesizer::new(config.synthesizer_command.clone()));
    let (session, session_events) = SessionController::new(
        &config,
        ChatClient::new(&config.api_base).with_timeout(config.request_timeout()),
        Box::new(CommandRecognitionBackend::new(config.recognizer_command.clone())),
        synthesizer,
    );
    let mut app = App::new(session, config.api_base.clone());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(session_events);

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    app.session.shutdown();
    tui::restore()?;
    result
}

async fn send_once(config: Config, text: &str, speak: bool) -> Result<()> {
    if text.trim().is_empty() {
        bail!("message is empty");
    }

    let synthesizer = Arc::new(if speak {
        CommandSynthesizer::new(config.synthesizer_command.clone())
    } else {
        CommandSynthesizer::disabled()
    });
    if speak && !synthesizer.is_available() {
        eprintln!("Speech synthesis not available; printing the reply only.");
    }

    let (mut session, mut session_events) = SessionController::new(
        &config,
        ChatClient::new(&config.api_base).with_timeout(config.request_timeout()),
        Box::new(CommandRecognitionBackend::new(None)),
        synthesizer.clone(),
    );

    session.submit_text(text);
    while session.is_loading() {
        match session_events.recv().await {
            Some(event) => session.handle_event(event),
            None => break,
        }
    }

    if let Some(reply) = session.messages().last() {
        println!("{}", reply.content);
    }
    // Let the reply finish playing before the session cancels speech
    synthesizer.flush().await;

    if let Some(error) = session.last_error() {
        bail!("{}", error);
    }
    Ok(())
}

async fn check_health(config: &Config) -> Result<()> {
    let client = ChatClient::new(&config.api_base).with_timeout(config.request_timeout());
    match client.health().await {
        Ok(true) => {
            println!("{} is up", client.base_url());
            Ok(())
        }
        Ok(false) => bail!("{} answered but reported unhealthy", client.base_url()),
        Err(e) => bail!("{} is unreachable: {}", client.base_url(), e),
    }
}

fn show_config(config: &Config, save: bool) -> Result<()> {
    let path = Config::get_config_path()?;
    if save {
        config.save()?;
        println!("Saved {}", path.display());
    } else {
        println!("# {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
