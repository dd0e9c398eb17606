use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ecosure_assistants::openai::DEFAULT_BASE_URL;

const CONFIG_ENV: &str = "ECOSURE_SERVER_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "ecosure.toml";

/// Relay configuration, read once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub base_url: String,
    pub stream_timeout: Duration,
    pub debug_sse: bool,
    pub upload_dir: Option<PathBuf>,
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
            assistant_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_timeout: Duration::from_millis(default_timeout_ms()),
            debug_sse: false,
            upload_dir: None,
            max_upload_bytes: mb_to_bytes(default_max_upload_mb()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    assistant: AssistantSection,
    #[serde(default)]
    stream: StreamSection,
    #[serde(default)]
    uploads: UploadsSection,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct AssistantSection {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    assistant_id: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamSection {
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default)]
    debug: bool,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            debug: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadsSection {
    #[serde(default)]
    dir: Option<PathBuf>,
    #[serde(default = "default_max_upload_mb")]
    max_mb: u64,
}

impl Default for UploadsSection {
    fn default() -> Self {
        Self {
            dir: None,
            max_mb: default_max_upload_mb(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_max_upload_mb() -> u64 {
    25
}

impl From<FileConfig> for ServerConfig {
    fn from(file: FileConfig) -> Self {
        Self {
            host: file.server.host,
            port: file.server.port,
            api_key: file.assistant.api_key,
            assistant_id: file.assistant.assistant_id,
            base_url: file
                .assistant
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            stream_timeout: Duration::from_millis(file.stream.timeout_ms),
            debug_sse: file.stream.debug,
            upload_dir: file.uploads.dir,
            max_upload_bytes: mb_to_bytes(file.uploads.max_mb),
        }
    }
}

impl ServerConfig {
    /// File config first, then environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = load_from_file()?.map(Self::from).unwrap_or_default();
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Overlays values from `lookup`. Unparseable numbers keep the current value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(id) = lookup("ASSISTANT_ID") {
            self.assistant_id = Some(id);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(host) = lookup("ECOSURE_SERVER_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT").and_then(|value| value.parse().ok()) {
            self.port = port;
        }
        if let Some(ms) = lookup("STREAM_TIMEOUT_MS").and_then(|value| value.parse().ok()) {
            self.stream_timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = lookup("DEBUG_SSE") {
            self.debug_sse = !matches!(flag.trim().to_ascii_lowercase().as_str(), "0" | "false");
        }
        if let Some(dir) = lookup("ECOSURE_UPLOAD_DIR") {
            self.upload_dir = Some(PathBuf::from(dir));
        }
        if let Some(mb) = lookup("ECOSURE_MAX_UPLOAD_MB").and_then(|value| value.parse::<u64>().ok())
        {
            self.max_upload_bytes = mb_to_bytes(mb);
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Logs what the relay will refuse to do. The process still starts.
    pub fn warn_if_incomplete(&self) {
        if self.api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY missing; chat requests will fail");
        }
        if self.assistant_id.is_none() {
            tracing::warn!("ASSISTANT_ID missing; chat requests will fail");
        }
    }
}

fn load_from_file() -> anyhow::Result<Option<FileConfig>> {
    let path = match env::var(CONFIG_ENV).ok() {
        Some(path) => Some(path),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Some(DEFAULT_CONFIG_FILE.to_string()),
        None => None,
    };

    let Some(path) = path else {
        return Ok(None);
    };

    let contents = fs::read_to_string(&path)
        .map_err(|err| anyhow::anyhow!("Failed to read config {}: {}", path, err))?;
    parse_file_config(&contents)
        .map(Some)
        .map_err(|err| anyhow::anyhow!("Failed to parse config {}: {}", path, err))
}

fn parse_file_config(contents: &str) -> Result<FileConfig, toml::de::Error> {
    toml::from_str(contents)
}

/// Oversized limits clamp to `u64::MAX` bytes.
fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}
