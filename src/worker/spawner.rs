//! Worker process spawner.
//!
//! Launches the persistent worker process with:
//! - `kill_on_drop(true)` so the process is cleaned up automatically.
//! - `env_clear()` + a safe variable allowlist, with the API credential and
//!   optional base-URL override injected explicitly.
//! - Startup validation: the executable must be locatable (`PATH` search for
//!   bare names) and the configured entry script must exist, otherwise
//!   [`AppError::Startup`] is returned before any process is created.
//!
//! Restart policy is delegated upward: on worker exit the bridge fails all
//! pending requests and terminates itself instead of respawning in place,
//! because worker-side in-flight state cannot be safely resumed.

use std::path::{Path, PathBuf};

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the spawned worker process.
///
/// Every other variable from the caller's environment is stripped via
/// `env_clear()` before the child is launched; the credential and base URL
/// are injected explicitly via `.env()` calls.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "TERM",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Environment variable carrying the API credential into the worker.
pub const WORKER_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
/// Environment variable carrying the base-URL override into the worker.
pub const WORKER_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";

// ── Connection handle ────────────────────────────────────────────────────────

/// Active stdio connection to a spawned worker process.
///
/// The bridge takes exclusive ownership of both pipes; `child` is handed to
/// the exit monitor so `kill_on_drop` keeps working.
#[derive(Debug)]
pub struct WorkerConnection {
    /// Child process handle — kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Worker's stdin for sending NDJSON requests.
    pub stdin: ChildStdin,
    /// Worker's stdout, read line-by-line by the reader task.
    pub stdout: ChildStdout,
}

/// Notification emitted by the exit monitor when the worker terminates.
#[derive(Debug, Clone)]
pub struct ExitNotice {
    /// OS exit code when the worker exited normally; `None` on signal.
    pub exit_code: Option<i32>,
    /// Human-readable description of the termination.
    pub reason: String,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Resolve the worker executable to an absolute path.
///
/// Paths containing a separator must exist as given; bare names are searched
/// against the directories in `PATH`.
///
/// # Errors
///
/// Returns [`AppError::Startup`] when the executable cannot be located.
pub fn resolve_executable(executable: &str) -> Result<PathBuf> {
    let candidate = Path::new(executable);
    if candidate.components().count() > 1 {
        if candidate.is_file() {
            return Ok(candidate.to_path_buf());
        }
        return Err(AppError::Startup(format!(
            "worker executable not found: {executable}"
        )));
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let full = dir.join(executable);
        if full.is_file() {
            return Ok(full);
        }
    }

    Err(AppError::Startup(format!(
        "worker executable '{executable}' not found in PATH"
    )))
}

/// Spawn the worker process described by `config`.
///
/// The spawner:
/// 1. Resolves the executable and validates the entry script path.
/// 2. Builds a `tokio::process::Command` with `env_clear()` and only the
///    variables listed in [`ALLOWED_ENV_VARS`].
/// 3. Injects the API credential and optional base-URL override.
/// 4. Captures stdin/stdout/stderr pipes and returns the connection.
///
/// # Errors
///
/// - [`AppError::Startup`] — executable or entry script missing, or the OS
///   spawn itself fails.
pub fn spawn_worker(config: &GlobalConfig) -> Result<WorkerConnection> {
    let executable = resolve_executable(&config.worker.executable)?;

    if let Some(script) = &config.worker.script {
        if !script.is_file() {
            return Err(AppError::Startup(format!(
                "worker entry script not found: {}",
                script.display()
            )));
        }
    }

    let mut cmd = Command::new(&executable);

    if let Some(script) = &config.worker.script {
        cmd.arg(script);
    }
    for arg in &config.worker.args {
        cmd.arg(arg);
    }

    // Strip inherited environment, then inject only the safe allowlist.
    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    if !config.worker.api_key.is_empty() {
        cmd.env(WORKER_API_KEY_ENV, &config.worker.api_key);
    }
    if let Some(base_url) = &config.worker.base_url {
        cmd.env(WORKER_BASE_URL_ENV, base_url);
    }

    cmd.current_dir(config.workspace_root())
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Startup(format!("failed to spawn worker: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Startup("failed to capture worker stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Startup("failed to capture worker stdout".into()))?;

    info!(executable = %executable.display(), "worker process spawned");

    Ok(WorkerConnection {
        child,
        stdin,
        stdout,
    })
}

// ── Exit monitor ─────────────────────────────────────────────────────────────

/// Spawn a background task that awaits worker exit and delivers an
/// [`ExitNotice`] to the bridge.
///
/// The notice must reach the bridge before its state is torn down so every
/// pending request can be failed with an explicit reason. The task respects
/// `cancel`: when the token fires it exits without emitting a notice (the
/// bridge is already shutting down on its own path); dropping the child
/// handle then kills the process via `kill_on_drop`.
#[must_use]
pub fn monitor_exit(
    mut child: Child,
    exit_tx: mpsc::Sender<ExitNotice>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let (exit_code, reason) = match result {
                    Ok(status) => {
                        let code = status.code();
                        let reason = code.map_or_else(
                            || "worker terminated by signal".to_owned(),
                            |c| format!("worker exited with code {c}"),
                        );
                        (code, reason)
                    }
                    Err(err) => {
                        warn!(%err, "error waiting for worker process");
                        (None, format!("wait error: {err}"))
                    }
                };

                if exit_tx.send(ExitNotice { exit_code, reason }).await.is_err() {
                    warn!("bridge gone before worker exit notice could be delivered");
                }
            }
            () = cancel.cancelled() => {
                info!("exit monitor: cancellation received, releasing worker");
            }
        }
    })
}
