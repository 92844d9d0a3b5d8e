//! Remote-service error taxonomy.
//!
//! Transient classes (throttling, timeouts, outages) are retried with
//! bounded backoff at the call site; permanent classes (explicit rejection,
//! permission denial) surface immediately.

use thiserror::Error;

/// Result type alias for remote-service calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by the remote recovery service or the credential step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote service throttled the request: {0}")]
    Throttled(String),

    #[error("remote call timed out: {0}")]
    Timeout(String),

    #[error("remote service unavailable: {0}")]
    Unavailable(String),

    #[error("remote service rejected the request: {0}")]
    Rejected(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("scoped credentials expired for account '{0}'")]
    CredentialExpired(String),
}

impl RemoteError {
    /// Whether a retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Throttled(_) | Self::Timeout(_) | Self::Unavailable(_)
        )
    }
}
