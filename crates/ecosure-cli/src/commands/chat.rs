use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::ChatArgs;
use crate::client::{Attachment, HttpRelay};
use crate::commands::{remember_thread, stream_turn};
use crate::report::Report;
use crate::session::{Conversation, TurnOutcome};
use crate::state::ClientState;

const HELP: &str = "Commands: /attach PATH, /new, /quit";

pub async fn run(relay: &HttpRelay, args: ChatArgs) -> Result<()> {
    let mut state = ClientState::load();
    // Every chat process starts a fresh analysis.
    remember_thread(&mut state, None);

    let mut convo = Conversation::default();
    let mut pending = Vec::new();
    for path in &args.files {
        pending.push(Attachment::read(path).await?);
    }

    println!(
        "{} {}",
        state.biome.heading("ecoSure"),
        format!("({} theme)", state.biome).dimmed()
    );
    println!("{}", HELP.dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&pending);
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "/quit" | "/exit" => break,
            "/help" => {
                println!("{HELP}");
                continue;
            }
            "/new" => {
                convo.reset();
                pending.clear();
                remember_thread(&mut state, None);
                println!("{}", "Started a new analysis.".dimmed());
                continue;
            }
            _ => {}
        }
        if let Some(path) = line.strip_prefix("/attach ") {
            match Attachment::read(Path::new(path.trim())).await {
                Ok(file) => {
                    println!("{} {}", "Attached".dimmed(), file.filename);
                    pending.push(file);
                }
                Err(err) => eprintln!("{} {err}", "Error:".red().bold()),
            }
            continue;
        }

        if let Err(refused) = convo.check_send(line, pending.len()) {
            eprintln!("{}", refused.to_string().yellow());
            continue;
        }

        let files = std::mem::take(&mut pending);
        let (outcome, streamed) =
            stream_turn(relay, &mut convo, line.to_string(), files, true).await?;
        match outcome {
            TurnOutcome::Done { thread_id, .. } => {
                remember_thread(&mut state, thread_id);
                if let Some(report) = Report::latest(convo.messages(), relay.base_url()) {
                    let with_body = streamed.trim() != report.text.trim();
                    println!("{}", report.render(state.biome, with_body));
                }
            }
            TurnOutcome::Failed(message) => {
                let shown = convo.error().unwrap_or(&message);
                eprintln!("{} {shown}", "Error:".red().bold());
            }
        }
    }
    Ok(())
}

fn prompt(pending: &[Attachment]) {
    use std::io::Write;

    if pending.is_empty() {
        print!("{} ", "›".bold());
    } else {
        print!("{} ", format!("[{} file(s)] ›", pending.len()).bold());
    }
    let _ = std::io::stdout().flush();
}
