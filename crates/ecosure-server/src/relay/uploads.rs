//! Local staging of attachments between the inbound request and the upload.

use std::path::Path;

use tempfile::{NamedTempFile, TempPath};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::RelayError;

/// Name used when the client sent a file part without a filename.
pub const FALLBACK_FILENAME: &str = "upload.txt";

/// An attachment parked on local disk. Dropping it deletes the file.
#[derive(Debug)]
pub struct StagedUpload {
    filename: String,
    path: TempPath,
    writer: File,
    len: u64,
}

impl StagedUpload {
    pub fn create(dir: Option<&Path>, filename: Option<&str>) -> Result<Self, RelayError> {
        let file = match dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        let filename = filename
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(FALLBACK_FILENAME)
            .to_string();
        let (file, path) = file.into_parts();
        Ok(Self {
            filename,
            path,
            writer: File::from_std(file),
            len: 0,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a piece of the file, refusing to grow past `limit` bytes.
    pub async fn append(&mut self, bytes: &[u8], limit: u64) -> Result<(), RelayError> {
        let len = self.len.saturating_add(bytes.len() as u64);
        if len > limit {
            return Err(RelayError::InvalidRequest(format!(
                "File {} exceeds the {} MB upload limit.",
                self.filename,
                limit / (1024 * 1024)
            )));
        }
        self.writer.write_all(bytes).await?;
        self.len = len;
        Ok(())
    }

    /// Reads the staged bytes and deletes the local copy, whatever the read outcome.
    pub async fn take(self) -> Result<(String, Vec<u8>), RelayError> {
        let Self {
            filename,
            path,
            mut writer,
            ..
        } = self;
        let read = match writer.flush().await {
            Ok(()) => {
                drop(writer);
                tokio::fs::read(&path).await
            }
            Err(err) => Err(err),
        };
        let path_display = path.display().to_string();
        if let Err(err) = path.close() {
            tracing::warn!(path = %path_display, error = %err, "Failed to delete staged upload");
        }
        Ok((filename, read?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_returns_bytes_and_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedUpload::create(Some(dir.path()), Some("plan.pdf")).unwrap();
        staged.append(b"%PDF", 1024).await.unwrap();
        staged.append(b"-1.4", 1024).await.unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());

        let (name, bytes) = staged.take().await.unwrap();
        assert_eq!(name, "plan.pdf");
        assert_eq!(bytes, b"%PDF-1.4");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::create(Some(dir.path()), None).unwrap();
        assert_eq!(staged.filename(), FALLBACK_FILENAME);
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_limit_enforced() {
        let mut staged = StagedUpload::create(None, Some("big.bin")).unwrap();
        staged.append(&[0; 10], 16).await.unwrap();
        let err = staged.append(&[0; 10], 16).await.unwrap_err();
        assert!(err.to_string().contains("big.bin"));
        assert_eq!(staged.len(), 10);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_staging_many_chunks_on_a_single_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedUpload::create(Some(dir.path()), Some("survey.csv")).unwrap();
        let row = b"lot,zone,area_ha\n";
        for _ in 0..256 {
            staged.append(row, 1024 * 1024).await.unwrap();
        }
        assert_eq!(staged.len(), 256 * row.len() as u64);

        let (_, bytes) = staged.take().await.unwrap();
        assert_eq!(bytes.len(), 256 * row.len());
        assert!(bytes.starts_with(row));
    }
}
