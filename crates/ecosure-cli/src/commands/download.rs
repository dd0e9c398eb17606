use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::client::{HttpRelay, RelayTransport};
use crate::output::{OutputFormat, json::print_json};

pub async fn run(relay: &HttpRelay, file_id: &str, out: &Path, format: OutputFormat) -> Result<()> {
    let download = relay.download(file_id).await?;
    let filename = download.filename.unwrap_or_else(|| file_id.to_string());

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;
    let path = out.join(&filename);
    tokio::fs::write(&path, &download.bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if format.is_json() {
        print_json(&json!({
            "file_id": file_id,
            "path": path.display().to_string(),
            "bytes": download.bytes.len(),
        }))?;
    } else {
        println!("Saved {} ({} bytes)", path.display(), download.bytes.len());
    }
    Ok(())
}
