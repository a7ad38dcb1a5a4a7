//! Error types for sitecast-control.

use sitecast_hosting::HostingError;

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors raised while resolving, running or rolling back a deployment.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// A profile id was supplied but does not resolve.
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Deployment not found.
    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    /// The certificate type names no known issuance path.
    #[error("unsupported certificate type: {0}")]
    UnsupportedCertificateType(String),

    /// Invalid status transition attempted.
    #[error("invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current status.
        from: &'static str,
        /// Attempted target status.
        to: &'static str,
    },

    /// Another deployment to the same site is running.
    #[error("a deployment to site {0} is already in progress")]
    TargetBusy(String),

    /// The deployment was cancelled at a stage boundary.
    #[error("deployment cancelled")]
    Cancelled,

    /// Hosting-engine or file-synchronisation failure.
    #[error(transparent)]
    Hosting(#[from] HostingError),

    /// Database collaborator error.
    #[error("database error: {0}")]
    Database(String),

    /// Certificate collaborator error.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Application discovery error.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Health-check collaborator error.
    #[error("health check error: {0}")]
    Health(String),

    /// Cloud environment detection error.
    #[error("cloud error: {0}")]
    Cloud(String),

    /// Persistence error.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a database error.
    #[must_use]
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a certificate error.
    #[must_use]
    pub fn certificate(msg: impl Into<String>) -> Self {
        Self::Certificate(msg.into())
    }

    /// Create a store error.
    #[must_use]
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<std::io::Error> for ControlError {
    fn from(e: std::io::Error) -> Self {
        Self::Hosting(HostingError::Io(e))
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("json: {e}"))
    }
}
