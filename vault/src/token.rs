//! Token values handed between the bootstrap stages and the session.

use crate::error::{VaultError, VaultResult};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::{Duration, Instant};

/// Longest lease accepted from the server. Vault's own ceiling
/// (`max_lease_ttl`) defaults to 32 days.
pub const MAX_LEASE: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Validate a lease reported by the server in whole seconds.
///
/// # Errors
///
/// [`VaultError::Protocol`] when the lease exceeds [`MAX_LEASE`] or its
/// expiry cannot be represented from `start`.
pub fn server_lease(secs: u64, start: Instant) -> VaultResult<Duration> {
    let lease = Duration::from_secs(secs);
    if lease > MAX_LEASE || start.checked_add(lease).is_none() {
        return Err(VaultError::protocol(format!("lease of {secs}s out of range")));
    }
    Ok(lease)
}

/// Metadata Vault returns alongside a wrap token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapMetadata {
    /// Time the wrap token stays valid
    pub ttl: Duration,
    /// Path whose response was wrapped
    pub creation_path: Option<String>,
    /// Server-side creation time
    pub creation_time: Option<DateTime<Utc>>,
    /// Accessor of the wrap token (not a secret)
    pub accessor: Option<String>,
}

impl fmt::Display for WrapMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ttl={}s", self.ttl.as_secs())?;
        if let Some(path) = &self.creation_path {
            write!(f, " creation_path={path}")?;
        }
        if let Some(time) = &self.creation_time {
            write!(f, " creation_time={}", time.to_rfc3339())?;
        }
        if let Some(accessor) = &self.accessor {
            write!(f, " accessor={accessor}")?;
        }
        Ok(())
    }
}

/// A single-use wrap token and its metadata, as returned by a wrapped login.
#[derive(Clone)]
pub struct WrapResult {
    wrap_token: SecretString,
    wrap_info: WrapMetadata,
}

impl fmt::Debug for WrapResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapResult")
            .field("wrap_token", &"[REDACTED]")
            .field("wrap_info", &self.wrap_info)
            .finish()
    }
}

impl WrapResult {
    /// Pair a wrap token with its metadata.
    #[must_use]
    pub const fn new(wrap_token: SecretString, wrap_info: WrapMetadata) -> Self {
        Self {
            wrap_token,
            wrap_info,
        }
    }

    /// The wrap token. Unwrapping it consumes it server-side.
    #[must_use]
    pub const fn wrap_token(&self) -> &SecretString {
        &self.wrap_token
    }

    /// Metadata of the wrap token.
    #[must_use]
    pub const fn wrap_info(&self) -> &WrapMetadata {
        &self.wrap_info
    }

    /// Split into token and metadata.
    #[must_use]
    pub fn into_parts(self) -> (SecretString, WrapMetadata) {
        (self.wrap_token, self.wrap_info)
    }
}

/// A Vault session token coupled with its lease.
///
/// The token and its expiry form one immutable value: a renewal produces
/// a new `SessionToken` rather than mutating this one. A zero lease means
/// the token does not expire.
#[derive(Clone)]
pub struct SessionToken {
    token: SecretString,
    accessor: Option<String>,
    lease: Duration,
    issued_at: Instant,
    renewable: bool,
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("token", &"[REDACTED]")
            .field("accessor", &self.accessor)
            .field("lease", &self.lease)
            .field("renewable", &self.renewable)
            .finish_non_exhaustive()
    }
}

impl SessionToken {
    /// A token whose lease starts now.
    #[must_use]
    pub fn new(token: SecretString, lease: Duration, renewable: bool) -> Self {
        Self::issued_at(token, lease, renewable, Instant::now())
    }

    /// A token whose lease started at `issued_at`.
    #[must_use]
    pub const fn issued_at(
        token: SecretString,
        lease: Duration,
        renewable: bool,
        issued_at: Instant,
    ) -> Self {
        Self {
            token,
            accessor: None,
            lease,
            issued_at,
            renewable,
        }
    }

    /// Attach the token accessor.
    #[must_use]
    pub fn with_accessor(mut self, accessor: Option<String>) -> Self {
        self.accessor = accessor;
        self
    }

    /// The bearer value to send to Vault.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.token.expose_secret()
    }

    /// The token as a secret.
    #[must_use]
    pub const fn secret(&self) -> &SecretString {
        &self.token
    }

    /// Token accessor, safe to log.
    #[must_use]
    pub fn accessor(&self) -> Option<&str> {
        self.accessor.as_deref()
    }

    /// Lease granted by the server.
    #[must_use]
    pub const fn lease(&self) -> Duration {
        self.lease
    }

    /// When the current lease started.
    #[must_use]
    pub const fn lease_start(&self) -> Instant {
        self.issued_at
    }

    /// Whether the server allows renewing this token.
    #[must_use]
    pub const fn is_renewable(&self) -> bool {
        self.renewable
    }

    /// Whether the token has a finite lease.
    #[must_use]
    pub const fn expires(&self) -> bool {
        !self.lease.is_zero()
    }

    /// Expiry instant, `None` for tokens that never expire.
    ///
    /// A lease too long for the clock also yields `None`; leases from the
    /// server are bounded by [`server_lease`] before they get here.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        if !self.expires() {
            return None;
        }
        self.issued_at.checked_add(self.lease)
    }

    /// Lease left at `now`.
    #[must_use]
    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        self.expires_at().map(|at| at.saturating_duration_since(now))
    }

    /// Whether the lease has run out at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }

    /// Whether the lease has run out.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// When a renewal becomes due, given the fraction of the lease to
    /// consume first. `None` if the token cannot or need not be renewed.
    #[must_use]
    pub fn renewal_due_at(&self, fraction: f64) -> Option<Instant> {
        if !self.renewable || !self.expires() {
            return None;
        }
        self.issued_at
            .checked_add(self.lease.mul_f64(fraction.clamp(0.0, 1.0)))
    }

    /// The token after a successful renewal at `renewed_at`.
    ///
    /// Vault may rotate the token on renewal; the previous value is kept
    /// when it does not.
    #[must_use]
    pub fn renewed(
        &self,
        token: Option<SecretString>,
        lease: Duration,
        renewable: bool,
        renewed_at: Instant,
    ) -> Self {
        Self {
            token: token.unwrap_or_else(|| self.token.clone()),
            accessor: self.accessor.clone(),
            lease,
            issued_at: renewed_at,
            renewable,
        }
    }
}
