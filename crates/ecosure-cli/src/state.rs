//! Client state persisted between runs: current thread and biome theme.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ecosure_contracts::is_thread_id;
use serde::{Deserialize, Serialize};

use crate::theme::Biome;

const STATE_FILE_ENV: &str = "ECOSURE_STATE_FILE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub biome: Biome,
}

impl ClientState {
    /// `ECOSURE_STATE_FILE`, else `<config_dir>/ecosure/state.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(STATE_FILE_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|p| p.join("ecosure").join("state.json"))
    }

    pub fn load() -> Self {
        Self::default_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Missing or unreadable state starts fresh.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Ignoring unreadable client state");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::default_path() else {
            tracing::debug!("No config directory, client state not saved");
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Stored thread id, only if it still looks like one.
    pub fn valid_thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref().filter(|id| is_thread_id(id))
    }

    pub fn set_thread(&mut self, thread_id: Option<String>) {
        self.thread_id = thread_id.filter(|id| !id.is_empty());
    }
}
