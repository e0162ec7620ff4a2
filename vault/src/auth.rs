//! Ways of obtaining the initial session token.

use crate::{
    client::VaultClient,
    config::{FeatureSettings, VaultConfig},
    error::{VaultError, VaultResult},
    exchanger::CredentialExchanger,
    responses::LookupResponse,
    token::{SessionToken, server_lease},
    unwrap::unwrap,
};
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Path of the token self-lookup endpoint, relative to `/v1/`.
pub const LOOKUP_SELF_PATH: &str = "auth/token/lookup-self";

/// Source of a session token.
#[async_trait]
pub trait ClientAuthentication: Send + Sync {
    /// Obtain a session token.
    async fn login(&self) -> VaultResult<SessionToken>;

    /// Whether calling [`ClientAuthentication::login`] again can succeed
    /// after a failure. False for sources built on a single-use token.
    fn supports_relogin(&self) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Unwraps one given wrap token.
///
/// The wrap token is single-use: a second login sends it again and Vault
/// answers with a rejection.
pub struct CubbyholeAuthentication {
    client: VaultClient,
    wrap_token: SecretString,
}

impl CubbyholeAuthentication {
    /// Authenticate by unwrapping `wrap_token` through `client`.
    #[must_use]
    pub const fn new(client: VaultClient, wrap_token: SecretString) -> Self {
        Self { client, wrap_token }
    }
}

#[async_trait]
impl ClientAuthentication for CubbyholeAuthentication {
    async fn login(&self) -> VaultResult<SessionToken> {
        unwrap(&self.client, &self.wrap_token).await
    }

    fn supports_relogin(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "cubbyhole"
    }
}

/// Wrapped AppRole login followed by a cubbyhole unwrap.
///
/// Every login obtains a fresh wrap token, so a failed attempt can be
/// repeated.
pub struct AppRoleWrappedAuthentication {
    settings: FeatureSettings,
    exchanger: CredentialExchanger,
    client: VaultClient,
}

impl AppRoleWrappedAuthentication {
    /// Build from bootstrap settings.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Configuration`] when the settings do not
    /// select the wrapped bootstrap or lack credentials.
    pub fn new(settings: FeatureSettings, config: &VaultConfig) -> VaultResult<Self> {
        settings.approle_credentials()?;
        let client = VaultClient::new(settings.url(), config)?;
        Ok(Self {
            settings,
            exchanger: CredentialExchanger::new(config.clone()),
            client,
        })
    }
}

#[async_trait]
impl ClientAuthentication for AppRoleWrappedAuthentication {
    async fn login(&self) -> VaultResult<SessionToken> {
        let wrapped = self.exchanger.request_wrapped_token(&self.settings).await?;
        unwrap(&self.client, wrapped.wrap_token()).await
    }

    fn supports_relogin(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "approle-wrapped"
    }
}

/// A pre-provisioned token, optionally looked up to learn its lease.
pub struct TokenAuthentication {
    client: VaultClient,
    token: SecretString,
    self_lookup: bool,
}

impl TokenAuthentication {
    /// Use `token` as is.
    #[must_use]
    pub const fn new(client: VaultClient, token: SecretString) -> Self {
        Self {
            client,
            token,
            self_lookup: true,
        }
    }

    /// Skip the self-lookup; the token is then treated as non-expiring and
    /// non-renewable.
    #[must_use]
    pub const fn without_self_lookup(mut self) -> Self {
        self.self_lookup = false;
        self
    }
}

#[async_trait]
impl ClientAuthentication for TokenAuthentication {
    #[instrument(skip_all, fields(addr = %self.client.address()))]
    async fn login(&self) -> VaultResult<SessionToken> {
        if !self.self_lookup {
            return Ok(SessionToken::new(self.token.clone(), Duration::ZERO, false));
        }

        let requested_at = Instant::now();
        let response: LookupResponse = self.client.get(LOOKUP_SELF_PATH, Some(&self.token)).await?;
        let data = response
            .data
            .ok_or_else(|| VaultError::protocol("lookup-self response has no data"))?;
        let ttl = data
            .ttl
            .ok_or_else(|| VaultError::protocol("lookup-self data.ttl missing"))?;

        let lease = server_lease(ttl, requested_at)?;

        info!(ttl_secs = ttl, renewable = data.renewable, "Looked up provided token");
        Ok(SessionToken::issued_at(
            self.token.clone(),
            lease,
            data.renewable,
            requested_at,
        )
        .with_accessor(data.accessor))
    }

    fn supports_relogin(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "token"
    }
}

/// Pick the authentication the settings call for.
///
/// # Errors
///
/// Returns [`VaultError::Configuration`] for invalid settings, or when
/// bootstrap is disabled and no token was provided.
pub fn authentication_for(
    settings: &FeatureSettings,
    config: &VaultConfig,
) -> VaultResult<Arc<dyn ClientAuthentication>> {
    settings.validate()?;

    if settings.is_wrapped() {
        return Ok(Arc::new(AppRoleWrappedAuthentication::new(settings.clone(), config)?));
    }

    let token = settings.token().cloned().ok_or_else(|| {
        VaultError::configuration("bootstrap disabled and no pre-provisioned token given")
    })?;
    let client = VaultClient::new(settings.url(), config)?;
    Ok(Arc::new(TokenAuthentication::new(client, token)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_wrapped_bootstrap() {
        let settings = FeatureSettings::wrapped("http://vault:8200", "role", "secret");
        let auth = authentication_for(&settings, &VaultConfig::default()).unwrap();
        assert_eq!(auth.name(), "approle-wrapped");
        assert!(auth.supports_relogin());
    }

    #[test]
    fn test_selects_token() {
        let settings = FeatureSettings::direct("http://vault:8200", "hvs.provided");
        let auth = authentication_for(&settings, &VaultConfig::default()).unwrap();
        assert_eq!(auth.name(), "token");
    }

    #[test]
    fn test_no_credentials_is_configuration_error() {
        let settings = FeatureSettings::new("http://vault:8200", false, "", "");
        let err = authentication_for(&settings, &VaultConfig::default()).err().unwrap();
        assert!(matches!(err, VaultError::Configuration(_)));
    }

    #[test]
    fn test_cubbyhole_does_not_relogin() {
        let client = VaultClient::with_http("http://vault:8200", reqwest::Client::new());
        let auth = CubbyholeAuthentication::new(client, SecretString::from("hvs.wrap"));
        assert!(!auth.supports_relogin());
    }

    #[tokio::test]
    async fn test_token_without_lookup() {
        let client = VaultClient::with_http("http://127.0.0.1:9", reqwest::Client::new());
        let auth = TokenAuthentication::new(client, SecretString::from("hvs.provided"))
            .without_self_lookup();
        let token = auth.login().await.unwrap();
        assert_eq!(token.expose(), "hvs.provided");
        assert!(token.expires_at().is_none());
        assert!(!token.is_renewable());
    }
}
