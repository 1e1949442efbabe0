//! specula-agent — session activity daemon
//!
//! Composition root for the specula pipeline: tails session transcripts
//! and background-task output, and writes every push-surface message to
//! stdout as one JSON line. Logs go to the XDG state directory, so
//! stdout carries nothing but the stream.

use std::path::PathBuf;

use anyhow::{Context, Result};
use specula_core::{logging, Config, Monitor};

#[tokio::main]
async fn main() -> Result<()> {
    // Optional config path as the only argument
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load_from(&PathBuf::from(path))
            .context("failed to load configuration from argument")?,
        None => Config::load().context("failed to load configuration")?,
    };

    let _log_guard =
        logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(
        sessions_dir = %config.sessions_dir().display(),
        tasks_dir = %config.tasks_dir().display(),
        "specula agent starting up"
    );

    let monitor = Monitor::new(config);
    monitor.start().await.context("failed to start ingestion")?;

    let (subscriber, mut rx) = monitor.subscribe();
    tracing::info!(subscriber, "Streaming push messages on stdout");

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(message) => {
                    let line = serde_json::to_string(&message)
                        .context("failed to serialize push message")?;
                    println!("{line}");
                }
                None => {
                    tracing::warn!("Push channel closed, shutting down");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received ctrl-c, shutting down");
                break;
            }
        }
    }

    monitor.unsubscribe(subscriber);
    Ok(())
}
