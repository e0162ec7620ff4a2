//! Cubbyhole unwrap of a wrapped login response.

use crate::{
    client::VaultClient,
    error::{VaultError, VaultResult},
    responses::AuthResponse,
    token::{SessionToken, server_lease},
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Path of the unwrap endpoint, relative to `/v1/`.
pub const UNWRAP_PATH: &str = "sys/wrapping/unwrap";

/// Exchange `wrap_token` for the session token it wraps.
///
/// Issues exactly one request with the wrap token as bearer credential.
/// Vault consumes the wrap token whatever the outcome, so a failure here
/// must not be retried with the same token.
///
/// # Errors
///
/// - [`VaultError::Configuration`] for an empty wrap token
/// - [`VaultError::AuthRejected`] when the token is invalid, expired or
///   already unwrapped
/// - [`VaultError::Unreachable`] on connection failure, timeout or 5xx
/// - [`VaultError::Protocol`] when the response lacks the token or lease
#[instrument(skip_all, fields(addr = %client.address()))]
pub async fn unwrap(client: &VaultClient, wrap_token: &SecretString) -> VaultResult<SessionToken> {
    if wrap_token.expose_secret().trim().is_empty() {
        return Err(VaultError::configuration("wrap token is empty"));
    }

    let requested_at = Instant::now();
    let response: AuthResponse = client
        .post(UNWRAP_PATH, Some(wrap_token), None)
        .await
        .inspect_err(|e| warn!(error = %e, "Unwrap failed"))?;

    let token = session_from_auth(response, requested_at)?;
    info!(
        lease_secs = token.lease().as_secs(),
        renewable = token.is_renewable(),
        accessor = token.accessor().unwrap_or(""),
        "Unwrapped session token"
    );
    Ok(token)
}

/// Build a session token from an `auth` block.
///
/// The lease is anchored at `requested_at`, before the round-trip, so the
/// local expiry never runs later than the server's.
pub(crate) fn session_from_auth(
    response: AuthResponse,
    requested_at: Instant,
) -> VaultResult<SessionToken> {
    let auth = response
        .auth
        .ok_or_else(|| VaultError::protocol("response has no auth block"))?;
    let client_token = auth
        .client_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| VaultError::protocol("auth.client_token missing"))?;
    let lease = auth
        .lease_duration
        .ok_or_else(|| VaultError::protocol("auth.lease_duration missing"))?;
    let lease = server_lease(lease, requested_at)?;

    Ok(SessionToken::issued_at(
        SecretString::from(client_token),
        lease,
        auth.renewable,
        requested_at,
    )
    .with_accessor(auth.accessor))
}
