//! Configuration resolution for newln-ai
//!
//! The TOML model lives in `newln_common::config`; this module resolves the
//! values that have more than one source.

use newln_common::config::TomlConfig;
use newln_common::{Error, Result};
use tracing::{info, warn};

/// Environment variable holding the generation API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "NEWLN_CONFIG";

/// Environment variable switching to the mock generation backend
pub const USE_MOCK_ENV: &str = "NEWLN_USE_MOCK_GENERATION";

/// Resolve the generation API key
///
/// **Priority:** ENV → TOML
pub fn resolve_gemini_api_key(toml_config: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .generation
        .api_key
        .as_ref()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Generation API key found in environment and TOML config. Using environment (highest priority)."
        );
    }

    if let Some(key) = env_key {
        info!("Generation API key loaded from environment variable");
        return Ok(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("Generation API key loaded from TOML config");
        return Ok(key.trim().to_string());
    }

    Err(Error::Config(format!(
        "Generation API key not configured. Set one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: [generation] api_key = \"your-key\"",
        API_KEY_ENV
    )))
}

/// Whether to run against the mock generation backend
///
/// **Priority:** ENV → TOML. Unrecognised environment values are ignored.
pub fn use_mock_generation(toml_config: &TomlConfig) -> bool {
    if let Ok(value) = std::env::var(USE_MOCK_ENV) {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => return true,
            "0" | "false" | "no" => return false,
            "" => {}
            other => warn!("Ignoring {}={}: expected true or false", USE_MOCK_ENV, other),
        }
    }
    toml_config.generation.use_mock
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
