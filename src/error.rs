//! Error taxonomy, exit codes and structured error output.
//!
//! Layers keep their own `thiserror` enums ([`StoreError`], [`ScanError`],
//! [`HashError`](crate::scanner::HashError), [`WatchError`]); everything
//! that can end a command converges on [`InventoryError`], which decides
//! the process exit code.

use std::path::PathBuf;

use serde::Serialize;

use crate::lock::LockError;
use crate::scanner::ScanError;
use crate::store::StoreError;
use crate::watcher::WatchError;

/// Errors that end a command.
#[derive(thiserror::Error, Debug)]
pub enum InventoryError {
    /// The store failed after retries. The run stops; the next run resumes.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// A filesystem failure outside the per-entry path.
    #[error(transparent)]
    Filesystem(#[from] ScanError),

    /// The watcher's event source died.
    #[error("Watcher subscription failed: {0}")]
    Subscription(String),

    /// Invalid or missing configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Another run holds the lock.
    #[error("Another run is in progress (lock held: {})", .0.display())]
    RunInProgress(PathBuf),

    /// Shutdown was requested mid-scan.
    #[error("Interrupted")]
    Interrupted,
}

impl From<LockError> for InventoryError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Locked(path) => Self::RunInProgress(path),
            LockError::Io { path, source } => Self::Filesystem(ScanError::Io { path, source }),
        }
    }
}

impl From<WatchError> for InventoryError {
    fn from(err: WatchError) -> Self {
        match err {
            WatchError::Store(e) => Self::Storage(e),
            other => Self::Subscription(other.to_string()),
        }
    }
}

impl From<figment::Error> for InventoryError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl InventoryError {
    /// The exit code this error maps to.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Storage(_) => ExitCode::StorageError,
            Self::Filesystem(_) => ExitCode::GeneralError,
            Self::Subscription(_) => ExitCode::SubscriptionFailure,
            Self::Config(_) => ExitCode::ConfigError,
            Self::RunInProgress(_) => ExitCode::RunInProgress,
            Self::Interrupted => ExitCode::Interrupted,
        }
    }
}

/// Process exit codes.
///
/// - 0: completed normally (including a clean watcher shutdown)
/// - 1: unexpected failure
/// - 2: store failure after retries
/// - 3: watcher subscription failure
/// - 4: configuration error
/// - 5: another run holds the lock
/// - 130: scan interrupted by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed normally.
    Success = 0,
    /// Unexpected failure.
    GeneralError = 1,
    /// Store failure.
    StorageError = 2,
    /// Watcher event source failure.
    SubscriptionFailure = 3,
    /// Configuration error.
    ConfigError = 4,
    /// Lock held by another run.
    RunInProgress = 5,
    /// Interrupted by a signal.
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "VT000",
            Self::GeneralError => "VT001",
            Self::StorageError => "VT002",
            Self::SubscriptionFailure => "VT003",
            Self::ConfigError => "VT004",
            Self::RunInProgress => "VT005",
            Self::Interrupted => "VT130",
        }
    }

    /// Exit code for an error returned from `run_app`.
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<InventoryError>())
            .map_or(Self::GeneralError, InventoryError::exit_code)
    }
}

/// Error shape printed with `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// Error code, e.g. "VT002"
    pub code: String,
    /// Process exit code
    pub exit_code: i32,
    /// Human-readable message including causes
    pub message: String,
    /// Whether the run was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Build from an application error.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
