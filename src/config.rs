use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub recording: RecordingPolicy,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub upload: RetryPolicy,
    pub ai: AiConfig,
    pub blobs: BlobConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Fixed timing policy of the recording flow. The source constants are kept
/// as defaults and stay overridable from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingPolicy {
    /// Answer time limit applied when a question carries none.
    #[serde(default = "default_time_limit_secs")]
    pub default_time_limit_secs: u64,

    /// Minimum recording time before the skip action is allowed.
    #[serde(default = "default_min_skip_secs")]
    pub min_skip_secs: u64,

    /// Countdown between questions.
    #[serde(default = "default_intermission_secs")]
    pub intermission_secs: u64,

    /// One-time timer extension granted by the elaborate action, when the
    /// question carries no override.
    #[serde(default = "default_extension_secs")]
    pub default_extension_secs: u64,
}

fn default_time_limit_secs() -> u64 {
    120
}

fn default_min_skip_secs() -> u64 {
    5
}

fn default_intermission_secs() -> u64 {
    5
}

fn default_extension_secs() -> u64 {
    10
}

impl Default for RecordingPolicy {
    fn default() -> Self {
        Self {
            default_time_limit_secs: default_time_limit_secs(),
            min_skip_secs: default_min_skip_secs(),
            intermission_secs: default_intermission_secs(),
            default_extension_secs: default_extension_secs(),
        }
    }
}

/// Client-side session persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session records older than this are discarded on load.
    pub ttl_days: i64,

    /// Directory for the file-backed session store.
    pub state_dir: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_days: 7,
            state_dir: ".vetview/sessions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Transcription service endpoint (media bytes in, plain text out).
    pub transcription_url: String,

    /// Reasoning service endpoint (chat-completions shaped).
    pub analysis_url: String,

    pub api_key: String,

    /// Model passed to the reasoning service.
    pub model: String,

    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    /// Directory the filesystem blob store writes under.
    pub storage_path: String,

    /// Base URL prefixed onto blob references when handing out fetchable
    /// URLs, e.g. a CDN or the service's own media route.
    pub public_base_url: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("VETVIEW").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
