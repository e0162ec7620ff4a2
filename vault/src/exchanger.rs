//! AppRole login returning a response-wrapped token.
//!
//! The login request carries the wrap directive, so Vault stores the real
//! token in a cubbyhole and answers with a single-use wrap token only.

use crate::{
    client::VaultClient,
    config::{FeatureSettings, VaultConfig},
    error::{VaultError, VaultResult},
    responses::{WrapInfo, WrappedResponse},
    token::{WrapMetadata, WrapResult},
};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Performs the wrapped AppRole login.
///
/// Holds no state beyond its configuration; each call builds a short-lived
/// unauthenticated client with the wrap directive attached.
#[derive(Debug, Clone, Default)]
pub struct CredentialExchanger {
    config: VaultConfig,
}

impl CredentialExchanger {
    /// Create an exchanger.
    #[must_use]
    pub const fn new(config: VaultConfig) -> Self {
        Self { config }
    }

    /// Log in with the role-id/secret-id from `settings` and return the
    /// wrap token. Makes at most one request and never retries.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Configuration`] before any request when bootstrap is
    ///   disabled or credentials are missing
    /// - [`VaultError::Unreachable`] on connection failure, timeout or 5xx
    /// - [`VaultError::AuthRejected`] when Vault refuses the credentials
    /// - [`VaultError::Protocol`] when the response is not a wrap envelope
    #[instrument(skip_all, fields(addr = %settings.url(), mount = %self.config.approle_mount))]
    pub async fn request_wrapped_token(&self, settings: &FeatureSettings) -> VaultResult<WrapResult> {
        let (role_id, secret_id) = settings.approle_credentials()?;
        let client = VaultClient::wrapping(settings.url(), &self.config)?;
        self.login(&client, role_id, secret_id).await
    }

    /// Wrapped login through an already-configured client.
    pub(crate) async fn login(
        &self,
        client: &VaultClient,
        role_id: &str,
        secret_id: &SecretString,
    ) -> VaultResult<WrapResult> {
        let body = serde_json::json!({
            "role_id": role_id,
            "secret_id": secret_id.expose_secret(),
        });

        let response: WrappedResponse = client
            .post(&self.config.login_path(), None, Some(&body))
            .await
            .inspect_err(|e| warn!(error = %e, "AppRole login failed"))?;

        if response.auth.as_ref().is_some_and(|auth| !auth.is_null()) {
            return Err(VaultError::protocol(
                "login response was not wrapped; refusing plain token",
            ));
        }

        let info = response
            .wrap_info
            .ok_or_else(|| VaultError::protocol("login response has no wrap_info"))?;
        let result = into_wrap_result(info)?;

        info!(
            wrap_ttl_secs = result.wrap_info().ttl.as_secs(),
            wrap_accessor = result.wrap_info().accessor.as_deref().unwrap_or(""),
            "Obtained wrapped token"
        );
        Ok(result)
    }
}

fn into_wrap_result(info: WrapInfo) -> VaultResult<WrapResult> {
    let token = info
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| VaultError::protocol("wrap_info.token missing"))?;
    let ttl = info
        .ttl
        .filter(|ttl| *ttl > 0)
        .ok_or_else(|| VaultError::protocol("wrap_info.ttl missing"))?;

    let creation_time = info
        .creation_time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    Ok(WrapResult::new(
        SecretString::from(token),
        WrapMetadata {
            ttl: Duration::from_secs(ttl),
            creation_path: info.creation_path,
            creation_time,
            accessor: info.accessor,
        },
    ))
}

/// Wrapped AppRole login with the given settings and tunables.
///
/// # Errors
///
/// See [`CredentialExchanger::request_wrapped_token`].
pub async fn request_wrapped_token(
    settings: &FeatureSettings,
    config: &VaultConfig,
) -> VaultResult<WrapResult> {
    CredentialExchanger::new(config.clone())
        .request_wrapped_token(settings)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn info(token: Option<&str>, ttl: Option<u64>) -> WrapInfo {
        WrapInfo {
            token: token.map(String::from),
            ttl,
            creation_time: Some("2024-05-01T10:00:00.123456789Z".to_string()),
            creation_path: Some("auth/approle/login".to_string()),
            accessor: Some("wrap-acc".to_string()),
        }
    }

    #[test]
    fn test_into_wrap_result() {
        let result = into_wrap_result(info(Some("hvs.wrap"), Some(60))).unwrap();
        assert_eq!(result.wrap_token().expose_secret(), "hvs.wrap");
        assert_eq!(result.wrap_info().ttl, Duration::from_secs(60));
        assert!(result.wrap_info().creation_time.is_some());
    }

    #[test]
    fn test_missing_token_is_protocol_error() {
        let err = into_wrap_result(info(None, Some(60))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let err = into_wrap_result(info(Some(""), Some(60))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_missing_ttl_is_protocol_error() {
        let err = into_wrap_result(info(Some("hvs.wrap"), None)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_disabled_bootstrap_fails_before_network() {
        let settings = FeatureSettings::new("http://127.0.0.1:9", false, "", "");
        let err = request_wrapped_token(&settings, &VaultConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Configuration(_)));
    }
}
