//! Companion chat - terminal client
//!
//! Reads messages from stdin and prints the conversation as it streams in.
//! Logs go to stderr as JSON so stdout stays the transcript.

use companion_chat::api::{HttpCompanionApi, LoggingApi};
use companion_chat::config::ClientConfig;
use companion_chat::runtime;
use companion_chat::view::{is_affirmative, TranscriptPrinter, CLEAR_PROMPT};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "companion_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Configuration
    let config = ClientConfig::from_env()?;
    tracing::info!(api_url = %config.api_url, "Using companion service");

    let api = LoggingApi::new(HttpCompanionApi::new(&config)?);
    let (chat, join) = runtime::start(config.chat_context(), api);

    // Transcript
    let mut updates = BroadcastStream::new(chat.subscribe());
    let printer = tokio::spawn(async move {
        let mut printer = TranscriptPrinter::new(std::io::stdout());
        while let Some(update) = updates.next().await {
            match update {
                Ok(update) => {
                    if let Err(e) = printer.apply(&update) {
                        tracing::warn!(error = %e, "Transcript output failed");
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Transcript fell behind, updates skipped");
                }
            }
        }
    });

    chat.resume().await?;
    println!("Companion chat. Type a message, /clear to start over, /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/clear" => {
                print!("{CLEAR_PROMPT}");
                std::io::stdout().flush()?;
                let answer = lines.next_line().await?.unwrap_or_default();
                chat.clear(is_affirmative(&answer)).await?;
            }
            _ => chat.send(line).await?,
        }
    }

    chat.shutdown().await?;
    join.await?;
    drop(chat);
    printer.await?;

    Ok(())
}
