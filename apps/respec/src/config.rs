//! # Application Configuration
//!
//! Server and CLI configuration, resolved in three layers:
//! 1. Built-in defaults
//! 2. An optional TOML config file (`--config`)
//! 3. `RESPEC_*` environment variable overrides (highest precedence)

use respec_core::RespecError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// CONFIG
// =============================================================================

/// Resolved application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Directory holding the spec release checkout.
    pub spec_dir: PathBuf,
    /// Path for the persistent release tracker; unset means in-memory.
    pub tracker_path: Option<PathBuf>,
    /// Host the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server binds to.
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            spec_dir: PathBuf::from("spec"),
            tracker_path: None,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file plus env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, RespecError> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| RespecError::Io(format!("{}: {}", p.display(), e)))?;
                toml::from_str(&raw).map_err(|e| {
                    RespecError::Serialization(format!("config {}: {}", p.display(), e))
                })?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `RESPEC_*` environment variable overrides.
    fn apply_env(&mut self) {
        if let Some(dir) = env_nonempty("RESPEC_SPEC_DIR") {
            self.spec_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_nonempty("RESPEC_TRACKER_PATH") {
            self.tracker_path = Some(PathBuf::from(path));
        }
        if let Some(host) = env_nonempty("RESPEC_HOST") {
            self.host = host;
        }
        if let Some(port) = env_nonempty("RESPEC_PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
    }

    /// The server bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// =============================================================================
// TESTS
// =============================================================================
