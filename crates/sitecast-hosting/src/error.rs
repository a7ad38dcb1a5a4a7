//! Error types for hosting-engine operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while driving the hosting engine.
#[derive(Error, Debug)]
pub enum HostingError {
    /// Deployment source directory does not exist.
    #[error("Source path not found: {0}")]
    SourceNotFound(PathBuf),

    /// Two directories a file deployment touches overlap.
    #[error("Path {first} overlaps {second}")]
    PathOverlap {
        /// Path being written to.
        first: PathBuf,
        /// Path it must stay disjoint from.
        second: PathBuf,
    },

    /// Engine feature installation did not leave a usable engine.
    #[error("Hosting engine installation failed (exit code {exit_code:?}): {message}")]
    EngineInstallFailed {
        /// Installer exit code, if it ran to completion.
        exit_code: Option<i32>,
        /// Installer output or failure description.
        message: String,
    },

    /// Engine rejected a process pool setting.
    #[error("Process pool configuration rejected: {0}")]
    PoolConfiguration(String),

    /// Named site does not exist.
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    /// Certificate could not be bound to an HTTPS binding.
    #[error("Failed to attach certificate: {0}")]
    CertificateAttach(String),

    /// Generic engine failure.
    #[error("Hosting engine error: {0}")]
    Engine(String),

    /// External command failed or timed out.
    #[error("Command failed: {0}")]
    Command(String),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostingError {
    /// Create a generic engine error.
    #[must_use]
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a command error.
    #[must_use]
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }
}

/// Result type alias using [`HostingError`].
pub type HostingResult<T> = std::result::Result<T, HostingError>;
