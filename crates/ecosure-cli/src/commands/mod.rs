pub mod ask;
pub mod chat;
pub mod download;
pub mod messages;
pub mod theme;

use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use colored::Colorize;

use crate::client::{Attachment, HttpRelay};
use crate::output::progress;
use crate::session::{Conversation, Step, TurnOutcome, send_turn};
use crate::state::ClientState;

const ANSWER_HEADER: &str = "Assessment";

/// Streams one turn to the terminal. Returns how it ended and the text
/// shown while streaming.
pub(crate) async fn stream_turn(
    relay: &HttpRelay,
    convo: &mut Conversation,
    message: String,
    files: Vec<Attachment>,
    live: bool,
) -> Result<(TurnOutcome, String)> {
    let spinner = live.then(|| progress::ellipsis("Assessing…"));
    let mut view = LiveAnswer::new(live.then(std::io::stdout));

    let outcome = send_turn(relay, convo, message, files, |step, convo| {
        if let Some(spinner) = &spinner {
            if convo.is_streaming() || !convo.ellipsis_visible(Instant::now()) {
                spinner.finish_and_clear();
            }
        }
        view.observe(step, convo);
    })
    .await?;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    Ok((outcome, view.finish()))
}

/// Echoes answer text as it arrives, under a header printed once the
/// answer starts streaming.
struct LiveAnswer<W: Write> {
    out: Option<W>,
    started: bool,
    streamed: String,
}

impl<W: Write> LiveAnswer<W> {
    fn new(out: Option<W>) -> Self {
        Self {
            out,
            started: false,
            streamed: String::new(),
        }
    }

    fn observe(&mut self, step: &Step, convo: &Conversation) {
        if let Some(out) = self.out.as_mut() {
            if convo.is_streaming() && !self.started {
                self.started = true;
                let _ = writeln!(out, "{}", ANSWER_HEADER.dimmed());
            }
            if let Step::Chunk(text) = step {
                let _ = write!(out, "{text}");
                let _ = out.flush();
            }
        }
        // The draft is dropped once the thread is re-read, so take it now.
        if matches!(step, Step::Done { .. }) {
            self.streamed = convo.draft().unwrap_or_default().to_string();
        }
    }

    /// Ends the streamed block and returns the text it showed.
    fn finish(mut self) -> String {
        if let (true, Some(out)) = (self.started, self.out.as_mut()) {
            let _ = writeln!(out);
        }
        self.streamed
    }
}

/// Persists the conversation's thread. A failure only costs the next run
/// its context, so it is logged rather than returned.
pub(crate) fn remember_thread(state: &mut ClientState, thread_id: Option<String>) {
    state.set_thread(thread_id);
    if let Err(err) = state.save() {
        tracing::warn!(error = %err, "Failed to persist client state");
    }
}
