//! Configuration file model and resolution
//!
//! Config file path priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`~/.config/newln/<module>.toml`), if present
//! 4. Compiled defaults (fallback)
//!
//! Every field has a default, so a partial TOML file is valid.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Top-level TOML configuration for newln services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Directory holding prompt template overrides
    pub prompts_dir: Option<PathBuf>,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub generation: GenerationSettings,
    pub orchestrator: OrchestratorSettings,
    pub broadcaster: BroadcasterSettings,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

/// SQLite database location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; defaults to the OS data directory
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Configured path, or the OS-dependent default
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_database_path)
    }
}

/// External generation service settings
///
/// `max_concurrent_calls` and `max_attempts` have been run at both 3 and 5;
/// they stay configurable rather than fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// API key (the `GEMINI_API_KEY` environment variable takes priority)
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    /// Process-wide cap on in-flight generation calls
    pub max_concurrent_calls: usize,
    /// Total attempts per call, first attempt included
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `backoff_base_ms * backoff_factor^n`
    pub backoff_base_ms: u64,
    pub backoff_factor: u32,
    /// Upper bound of the random jitter added to every backoff
    pub max_jitter_ms: u64,
    pub request_timeout_secs: u64,
    /// Optional request-rate quota on top of the concurrency cap
    pub requests_per_minute: Option<u32>,
    /// Serve synthesized responses instead of calling the provider
    pub use_mock: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            max_concurrent_calls: 3,
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_factor: 2,
            max_jitter_ms: 500,
            request_timeout_secs: 60,
            requests_per_minute: None,
            use_mock: false,
        }
    }
}

/// Job orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Maximum candidate items per enrichment call
    pub enrichment_batch_size: usize,
    /// Deadline for one material's generation, in seconds
    pub deadline_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            enrichment_batch_size: 5,
            deadline_secs: 300,
        }
    }
}

/// Progress broadcaster settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcasterSettings {
    /// Bounded queue length per subscription
    pub subscriber_queue_capacity: usize,
}

impl Default for BroadcasterSettings {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.generation.max_concurrent_calls == 0 {
            return Err(Error::Config(
                "generation.max_concurrent_calls must be at least 1".to_string(),
            ));
        }
        if self.generation.max_attempts == 0 {
            return Err(Error::Config(
                "generation.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.enrichment_batch_size == 0 {
            return Err(Error::Config(
                "orchestrator.enrichment_batch_size must be at least 1".to_string(),
            ));
        }
        if self.broadcaster.subscriber_queue_capacity == 0 {
            return Err(Error::Config(
                "broadcaster.subscriber_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve which config file to read, if any
///
/// Explicit paths (CLI or environment) are returned even when missing so the
/// caller can report them; the per-user default is only returned if it exists.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    module_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    let user_config = dirs::config_dir().map(|d| d.join("newln").join(format!("{}.toml", module_name)));
    match user_config {
        Some(path) if path.exists() => Some(path),
        _ => None,
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Load the resolved config file, or compiled defaults when none was found
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    match path {
        Some(path) => load_toml_config(path),
        None => {
            info!("No config file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Get OS-dependent default database path
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("newln"))
        .unwrap_or_else(|| PathBuf::from("./newln_data"))
        .join("newln.db")
}
