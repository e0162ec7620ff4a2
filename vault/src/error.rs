//! Vault error types using thiserror 2.0.
//!
//! Every failure collapses onto one [`ErrorKind`]: configuration,
//! unreachable server, rejected credentials, protocol mismatch, or a
//! session-state error. Only the unreachable class is retryable, and only
//! by callers; nothing in this crate retries on its own.

use rust_common::{PlatformError, Retryable};
use std::fmt;
use thiserror::Error;

/// Coarse classification of a [`VaultError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing settings. Fatal.
    Configuration,
    /// Network failure, timeout or transient server error.
    Unreachable,
    /// Credentials, wrap token or renewal refused by the server. Fatal for the session.
    Rejected,
    /// Response did not have the expected shape.
    Protocol,
    /// Operation not valid in the current session state.
    Session,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Unreachable => "unreachable",
            Self::Rejected => "rejected",
            Self::Protocol => "protocol",
            Self::Session => "session",
        };
        f.write_str(name)
    }
}

/// A failure recorded in session state and carried by session events.
///
/// Unlike [`VaultError`] this is `Clone`, so it can be shared with every
/// reader of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    /// Classification of the underlying error
    pub kind: ErrorKind,
    /// Rendered error message
    pub message: String,
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl From<&VaultError> for SessionFailure {
    fn from(err: &VaultError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Vault-specific errors.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Invalid or incomplete configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Vault could not be reached, timed out, or answered with a transient error
    #[error("Vault unreachable: {0}")]
    Unreachable(String),

    /// Vault refused the credentials, wrap token or renewal
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// Vault answered with an unexpected payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No session token is available yet
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The session token expired before it could be renewed
    #[error("Session token expired")]
    TokenExpired,

    /// The session is in its terminal failed state
    #[error("Session failed: {0}")]
    SessionFailed(SessionFailure),

    /// Response body could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Platform error
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::Platform(PlatformError::InvalidInput(_)) => {
                ErrorKind::Configuration
            }
            Self::Unreachable(_)
            | Self::Platform(
                PlatformError::Http(_) | PlatformError::Unavailable(_) | PlatformError::Timeout(_),
            ) => ErrorKind::Unreachable,
            Self::AuthRejected(_) => ErrorKind::Rejected,
            Self::Protocol(_)
            | Self::Serialization(_)
            | Self::Platform(PlatformError::Serialization(_) | PlatformError::Internal(_)) => {
                ErrorKind::Protocol
            }
            Self::NotAuthenticated | Self::TokenExpired | Self::SessionFailed(_) => {
                ErrorKind::Session
            }
        }
    }

    /// Check if error is retryable by a caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unreachable)
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an unreachable error.
    #[must_use]
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    /// Create an authentication rejected error.
    #[must_use]
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::AuthRejected(msg.into())
    }

    /// Create a protocol error.
    #[must_use]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Map a transport failure from reqwest.
    ///
    /// Body decoding failures are protocol errors; everything else
    /// (connect, timeout, TLS, reset) means the server was not reached.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            Self::protocol(err.to_string())
        } else {
            Self::unreachable(err.to_string())
        }
    }
}

impl Retryable for VaultError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}
