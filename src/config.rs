use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::completion::RetryPolicy;

/// Application-level constants
pub const APP_NAME: &str = "Handoff";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local Ollama instance used when nothing else is configured.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Model used by the permit, emergency and tutoring pipelines.
pub const DEFAULT_MODEL: &str = "mistral:latest";

/// Dashboard API bind address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";

/// Per-request timeout for completion calls (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Log filter applied when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,handoff_lib=debug"
}

/// Get the application data directory (~/Handoff/).
///
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Directory holding the local JSON knowledge files used for retrieval fallback.
pub fn knowledge_dir() -> PathBuf {
    app_data_dir().join("knowledge")
}

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ollama_url: String,
    pub model: String,
    /// Model for the AML screening agents (may differ from `model`).
    pub screening_model: String,
    pub bind_addr: SocketAddr,
    /// Remote context endpoint. `None` = local knowledge files only.
    pub retrieval_url: Option<String>,
    pub knowledge_dir: PathBuf,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            screening_model: DEFAULT_MODEL.to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8501)),
            retrieval_url: None,
            knowledge_dir: knowledge_dir(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from `HANDOFF_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model = non_empty("HANDOFF_MODEL").unwrap_or(defaults.model);
        let screening_model = non_empty("HANDOFF_SCREENING_MODEL").unwrap_or_else(|| model.clone());

        Self {
            ollama_url: non_empty("HANDOFF_OLLAMA_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.ollama_url),
            screening_model,
            model,
            bind_addr: parsed(&non_empty, "HANDOFF_BIND", defaults.bind_addr),
            retrieval_url: non_empty("HANDOFF_RETRIEVAL_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            knowledge_dir: non_empty("HANDOFF_KNOWLEDGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.knowledge_dir),
            timeout_secs: parsed(&non_empty, "HANDOFF_TIMEOUT_SECS", defaults.timeout_secs),
            retry: RetryPolicy {
                max_attempts: parsed(
                    &non_empty,
                    "HANDOFF_MAX_ATTEMPTS",
                    defaults.retry.max_attempts,
                )
                .max(1),
                backoff: parsed(&non_empty, "HANDOFF_BACKOFF_MS", None::<u64>)
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.backoff),
            },
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: ParseValue,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => T::parse_value(raw.trim()).unwrap_or_else(|| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable configuration value");
            default
        }),
    }
}

/// Parsing hook so `Option<u64>` settings can share `parsed`.
trait ParseValue: Sized {
    fn parse_value(raw: &str) -> Option<Self>;
}

impl ParseValue for u64 {
    fn parse_value(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ParseValue for u32 {
    fn parse_value(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ParseValue for SocketAddr {
    fn parse_value(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ParseValue for Option<u64> {
    fn parse_value(raw: &str) -> Option<Self> {
        raw.parse().ok().map(Some)
    }
}
