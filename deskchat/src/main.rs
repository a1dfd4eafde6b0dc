//! `DeskChat`: line-oriented support chat client.
//!
//! Mounts a chat screen against the configured backend, prints the
//! conversation as it changes and sends each line typed on stdin.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/deskchat/config.toml`).
//!
//! ```bash
//! # Offline demo against an in-process backend
//! cargo run --bin deskchat -- --offline
//!
//! # Against a backend (or the stub server)
//! cargo run --bin deskchat -- --base-url http://127.0.0.1:8787 --token secret
//!
//! # Or via environment variables
//! DESKCHAT_URL=http://127.0.0.1:8787 cargo run --bin deskchat
//! ```
//!
//! Commands: `/read` marks all messages read, `/quit` exits.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing_appender::non_blocking::WorkerGuard;

use deskchat::chat::{ChatEvent, SendError};
use deskchat::config::{ChatConfig, CliArgs, ClientConfig};
use deskchat::screen::ChatScreen;
use deskchat::transcript::Transcript;
use deskchat::transport::ChatTransport;
use deskchat::transport::http::HttpTransport;
use deskchat::transport::memory::MemoryTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    // Invalid configuration is fatal; defaults would drop the URL and token.
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    // Logs go to a file; stdout carries the transcript.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("deskchat starting");

    if cli.offline {
        let transport = MemoryTransport::new();
        transport.push_reply("Hi! You are chatting with an offline demo desk.");
        run(transport, config.chat).await?;
    } else if let Some(backend) = config.to_backend_config() {
        let transport = HttpTransport::new(&backend)?;
        tracing::info!(url = %transport.messages_url(), "using backend");
        run(transport, config.chat).await?;
    } else {
        eprintln!("No backend configured. Pass --base-url (or set DESKCHAT_URL), or use --offline.");
    }

    tracing::info!("deskchat exiting");
    Ok(())
}

/// Initialize file-based logging.
///
/// Logs are written to a file (never stdout, which carries the transcript).
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("deskchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main loop: print view changes and notices, forward stdin lines.
async fn run<T: ChatTransport + 'static>(transport: T, config: ChatConfig) -> std::io::Result<()> {
    let (screen, mut events) = ChatScreen::mount(transport, config);
    let mut views = screen.subscribe();
    let mut transcript = Transcript::new();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut sends: JoinSet<Option<SendError>> = JoinSet::new();

    println!("Connected. Type a message and press Enter. /read marks all read, /quit exits.");

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let messages = Arc::clone(&views.borrow_and_update().messages);
                for line in transcript.update(&messages) {
                    println!("{line}");
                }
            }
            Some(event) = events.recv() => match event {
                ChatEvent::SendFailed { text, reason } => {
                    println!("! could not send \"{text}\": {reason}");
                }
                ChatEvent::MessageConfirmed { id } => {
                    tracing::debug!(%id, "message confirmed");
                }
            },
            line = input.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "/quit" => break,
                    "" => {}
                    "/read" => {
                        let engine = Arc::clone(screen.engine());
                        sends.spawn(async move {
                            engine.mark_all_read().await;
                            None
                        });
                    }
                    _ => {
                        let engine = Arc::clone(screen.engine());
                        sends.spawn(async move { engine.send_text(&line).await.err() });
                    }
                }
            }
            Some(joined) = sends.join_next(), if !sends.is_empty() => {
                match joined {
                    Ok(Some(e @ (SendError::Cooldown | SendError::Validation(_)))) => {
                        println!("! {e}");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "send task failed"),
                }
            }
        }
    }

    sends.shutdown().await;
    screen.unmount().await;
    Ok(())
}
