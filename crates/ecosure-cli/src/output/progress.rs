use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// How long the waiting indicator may stay up without any answer text.
pub const ELLIPSIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Spinner shown while waiting for the first piece of an answer. Clears
/// itself after [`ELLIPSIS_TIMEOUT`].
pub fn ellipsis(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈"));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));

    let handle = pb.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ELLIPSIS_TIMEOUT).await;
        handle.finish_and_clear();
    });
    pb
}
