//! CLI binary for Lara.

use clap::{Parser, Subcommand};
use lara::capture::{ChannelCapture, MicFeed};
use lara::services::{InMemoryMediaLibrary, InMemoryTaskStore, RecordingNavigator, SilentSpeech};
use lara::{Assistant, AssistantEvent, ClassifierChain, Collaborators, LaraConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::info;

/// Lara: wake-word voice command assistant.
#[derive(Parser)]
#[command(name = "lara", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the assistant. Each stdin line is one recognised utterance.
    Listen {
        /// Stop after one command instead of returning to wake listening.
        #[arg(long)]
        one_shot: bool,
    },

    /// Classify a command and print the intent as JSON.
    Classify {
        /// Only use the offline pattern classifier.
        #[arg(long)]
        offline: bool,

        /// Command text.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Write it to the default config path as well.
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => LaraConfig::from_file(path)?,
        None => {
            let default = LaraConfig::default_config_path();
            if default.exists() {
                LaraConfig::from_file(&default)?
            } else {
                LaraConfig::default()
            }
        }
    };
    config.validate()?;
    let _log_guard = lara::logging::init_tracing(&config.logging)?;

    match cli.command.unwrap_or(Command::Listen { one_shot: false }) {
        Command::Listen { one_shot } => run_listen(config, one_shot).await,
        Command::Classify { offline, text } => run_classify(config, offline, &text.join(" ")).await,
        Command::Config { write } => run_config(&config, write),
    }
}

async fn run_listen(mut config: LaraConfig, one_shot: bool) -> anyhow::Result<()> {
    println!("Lara v{}", env!("CARGO_PKG_VERSION"));
    config.orchestrator.one_shot |= one_shot;
    let wake_phrase = capitalize(&config.wakeword.phrase);

    let (capture, feed) = ChannelCapture::new();
    let collaborators = Collaborators {
        capture: Arc::new(capture),
        tasks: Arc::new(InMemoryTaskStore::new()),
        media: Arc::new(InMemoryMediaLibrary::demo()),
        navigator: Arc::new(RecordingNavigator::new()),
        speech: Arc::new(SilentSpeech::new()),
    };
    let assistant = Arc::new(Assistant::new(config, collaborators));

    let mut events = assistant.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    let ctrl_c = Arc::clone(&assistant);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            ctrl_c.stop();
            std::process::exit(0);
        }
    });

    assistant.start();
    println!(
        "\nSay \"{wake_phrase}\" then a command, one utterance per line.\n\
         An empty line is silence. /activate, /stop, /start, /restart, /quit control the assistant.\n"
    );

    let stdin = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    feed_stdin(stdin, &feed, &assistant).await?;

    assistant.stop();
    assistant.router().flush().await;
    Ok(())
}

async fn feed_stdin(
    mut lines: LinesStream<BufReader<tokio::io::Stdin>>,
    feed: &MicFeed,
    assistant: &Assistant,
) -> anyhow::Result<()> {
    while let Some(line) = lines.next().await {
        let line = line?;
        match line.trim() {
            "/quit" => break,
            "/stop" => assistant.stop(),
            "/start" => {
                assistant.start();
            }
            "/restart" => {
                assistant.restart().await;
            }
            "/activate" => {
                assistant.activate();
            }
            "" => {
                feed.silence();
            }
            utterance => {
                feed.say(utterance);
            }
        }
    }
    Ok(())
}

fn print_event(event: &AssistantEvent) {
    match event {
        AssistantEvent::StateChanged { to, .. } => println!("[{to}]"),
        AssistantEvent::WakeDetected { .. } => println!("Yes?"),
        AssistantEvent::CommandCaptured { text, .. } => println!("> {text}"),
        AssistantEvent::NoSpeechCaptured { .. } => println!("(no speech captured)"),
        AssistantEvent::IntentClassified(c) => {
            println!("  intent: {} ({:.2}, {:?})", c.intent.tag(), c.confidence, c.source);
        }
        AssistantEvent::ActionCompleted(result) => println!("{}", result.message),
        AssistantEvent::Navigated { path } => println!("  -> {path}"),
        AssistantEvent::BackgroundWriteCompleted { kind, id } => println!("  saved {kind} {id}"),
        AssistantEvent::BackgroundFailure { kind, error, .. } => {
            eprintln!("  {kind} was not saved: {error}");
        }
        AssistantEvent::Fatal { message } => eprintln!("Error: {message}"),
    }
}

async fn run_classify(config: LaraConfig, offline: bool, text: &str) -> anyhow::Result<()> {
    let chain = if offline {
        ClassifierChain::pattern_only()
    } else {
        ClassifierChain::from_config(&config.classifier)
    };
    let classified = chain.classify(text).await;
    println!("{}", serde_json::to_string_pretty(&classified)?);
    Ok(())
}

fn run_config(config: &LaraConfig, write: bool) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    if write {
        let path = LaraConfig::default_config_path();
        config.save_to_file(&path)?;
        eprintln!("\nwrote {}", path.display());
    }
    Ok(())
}

/// Capitalize the first character of each word.
fn capitalize(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
