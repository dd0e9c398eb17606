use anyhow::Result;
use chrono::DateTime;
use colored::Colorize;
use ecosure_contracts::{ContentPart, MessagesResponse, Role};

use crate::client::{HttpRelay, RelayTransport, file_url};
use crate::output::{OutputFormat, json::print_json};
use crate::theme::Biome;

pub async fn run(
    relay: &HttpRelay,
    thread_id: &str,
    format: OutputFormat,
    biome: Biome,
) -> Result<()> {
    let messages = relay.thread_messages(thread_id).await?;

    if format.is_json() {
        return print_json(&MessagesResponse { messages });
    }

    if messages.is_empty() {
        println!("No messages in {thread_id}.");
        return Ok(());
    }

    for message in &messages {
        let who = match message.role {
            Role::User => "You".bold(),
            Role::Assistant => biome.heading("Assistant"),
        };
        let when = DateTime::from_timestamp(message.created_at, 0)
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{who} {}", when.dimmed());

        for part in &message.parts {
            match part {
                ContentPart::Text { text } => println!("{text}"),
                ContentPart::Image { file_id } => {
                    println!("  [image] {}", file_url(relay.base_url(), file_id).underline());
                }
                ContentPart::File { file_id, filename } => {
                    println!(
                        "  [file] {filename} {}",
                        file_url(relay.base_url(), file_id).underline()
                    );
                }
                ContentPart::Other { kind, .. } => {
                    println!("  {}", format!("[{kind}]").dimmed());
                }
            }
        }
        println!();
    }
    Ok(())
}
