use anyhow::{Context, Result, bail};
use serde_json::json;

use crate::cli::AskArgs;
use crate::client::{Attachment, HttpRelay};
use crate::commands::{remember_thread, stream_turn};
use crate::output::{OutputFormat, json::print_json};
use crate::report::Report;
use crate::session::{Conversation, TurnOutcome};
use crate::state::ClientState;

pub async fn run(relay: &HttpRelay, args: AskArgs, format: OutputFormat) -> Result<()> {
    let message = args.message.unwrap_or_default();
    let mut state = ClientState::load();

    let thread_id = if args.new {
        None
    } else {
        args.thread
            .or_else(|| state.valid_thread_id().map(str::to_string))
    };
    let mut convo = Conversation::new(thread_id);
    convo.check_send(&message, args.files.len())?;

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        files.push(Attachment::read(path).await?);
    }

    let live = !format.is_json();
    let (outcome, streamed) = stream_turn(relay, &mut convo, message, files, live).await?;

    let thread_id = match outcome {
        TurnOutcome::Done { thread_id, .. } => thread_id,
        TurnOutcome::Failed(message) => bail!(message),
    };
    remember_thread(&mut state, thread_id.clone());

    let Some(report) = Report::latest(convo.messages(), relay.base_url()) else {
        bail!("The relay finished without an assistant message.");
    };

    if format.is_json() {
        print_json(&json!({ "thread_id": thread_id, "report": report }))?;
    } else {
        let with_body = streamed.trim() != report.text.trim();
        println!("{}", report.render(state.biome, with_body));
    }

    if let Some(path) = args.save {
        std::fs::write(&path, report.to_markdown())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !format.is_json() {
            println!("Saved report to {}", path.display());
        }
    }
    Ok(())
}
