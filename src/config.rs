//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name used for credential lookups.
const KEYRING_SERVICE: &str = "agent-relay";

/// Environment variable holding the API credential (keychain fallback).
pub const API_KEY_ENV: &str = "AGENT_RELAY_API_KEY";
/// Environment variable overriding the upstream API base URL.
pub const BASE_URL_ENV: &str = "AGENT_RELAY_BASE_URL";
/// Environment variable overriding the worker executable path.
pub const WORKER_BIN_ENV: &str = "AGENT_RELAY_WORKER_BIN";
/// Environment variable overriding the worker entry script path.
pub const WORKER_SCRIPT_ENV: &str = "AGENT_RELAY_WORKER_SCRIPT";

/// Worker process launch settings.
///
/// The credential is loaded at runtime via OS keychain or environment
/// variables, not from the TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Worker executable (e.g., `node`). Bare names are resolved via `PATH`.
    pub executable: String,
    /// Entry script passed as the first argument, if the worker needs one.
    #[serde(default)]
    pub script: Option<PathBuf>,
    /// Extra arguments appended after the entry script.
    #[serde(default)]
    pub args: Vec<String>,
    /// API credential forwarded to the worker (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
    /// Alternate API endpoint base URL (populated at runtime).
    #[serde(skip)]
    pub base_url: Option<String>,
}

/// Configurable timeout values (seconds) for caller-observed windows.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Ping round-trip timeout.
    #[serde(default = "default_ping_seconds")]
    pub ping_seconds: u64,
    /// Idle window between stream pulls before the stream yields a
    /// timeout-error element and halts.
    #[serde(default = "default_stream_idle_seconds")]
    pub stream_idle_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ping_seconds: default_ping_seconds(),
            stream_idle_seconds: default_stream_idle_seconds(),
        }
    }
}

fn default_ping_seconds() -> u64 {
    5
}

fn default_stream_idle_seconds() -> u64 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Default working directory for the worker process.
    pub workspace_root: PathBuf,
    /// Worker launch settings.
    pub worker: WorkerConfig,
    /// Timeout configuration for caller-observed windows.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides for the worker executable and entry script.
    ///
    /// `AGENT_RELAY_WORKER_BIN` replaces `worker.executable`;
    /// `AGENT_RELAY_WORKER_SCRIPT` replaces `worker.script`. Unset variables
    /// leave the configured values untouched.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bin) = env::var(WORKER_BIN_ENV) {
            if !bin.is_empty() {
                self.worker.executable = bin;
            }
        }
        if let Ok(script) = env::var(WORKER_SCRIPT_ENV) {
            if !script.is_empty() {
                self.worker.script = Some(PathBuf::from(script));
            }
        }
    }

    /// Load the API credential from OS keychain with env-var fallback, and
    /// pick up an optional base-URL override from the environment.
    ///
    /// Tries the `agent-relay` keyring service first, then falls back to the
    /// `AGENT_RELAY_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env var provides
    /// the credential.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.worker.api_key = load_credential("api_key", API_KEY_ENV).await?;
        self.worker.base_url = env::var(BASE_URL_ENV).ok().filter(|url| !url.is_empty());
        Ok(())
    }

    /// Absolute path to the worker's working directory.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Ping round-trip timeout as a [`std::time::Duration`].
    #[must_use]
    pub fn ping_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeouts.ping_seconds)
    }

    /// Stream idle timeout as a [`std::time::Duration`].
    #[must_use]
    pub fn stream_idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeouts.stream_idle_seconds)
    }

    fn validate(&mut self) -> Result<()> {
        if self.worker.executable.trim().is_empty() {
            return Err(AppError::Config("worker.executable must not be empty".into()));
        }

        if self.timeouts.ping_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.ping_seconds must be greater than zero".into(),
            ));
        }

        if self.timeouts.stream_idle_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.stream_idle_seconds must be greater than zero".into(),
            ));
        }

        let canonical_root = self
            .workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
        self.workspace_root = canonical_root;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Try OS keychain first via spawn_blocking (keyring is synchronous I/O).
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    // Fallback to environment variable.
    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
