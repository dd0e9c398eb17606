use colored::Colorize;
use thiserror::Error;

/// Failures talking to the relay
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to reach the relay at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Relay returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Failed to read {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err);

    let msg = format!("{err:#}").to_lowercase();

    if msg.contains("failed to reach the relay") || msg.contains("connection refused") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Start the relay first, or point at another one with:");
        eprintln!(
            "  {} ecosure --server http://host:3001 <command>",
            "$".dimmed()
        );
    }

    if msg.contains("assistant_id") || msg.contains("openai_api_key") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Set OPENAI_API_KEY and ASSISTANT_ID in the relay's environment.");
    }

    if msg.contains("invalid thread id") || msg.contains("no thread found") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Start a fresh conversation with:");
        eprintln!("  {} ecosure chat", "$".dimmed());
    }

    std::process::exit(1);
}
