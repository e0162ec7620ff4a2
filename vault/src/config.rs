//! Vault connection settings and client tunables.

use crate::error::{VaultError, VaultResult};
use rust_common::{HttpConfig, TrustPolicy};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Header asking Vault to wrap a response instead of returning it plain.
pub const WRAP_TTL_HEADER: &str = "X-Vault-Wrap-TTL";
/// Header carrying a Vault token.
pub const TOKEN_HEADER: &str = "X-Vault-Token";
/// Header selecting a Vault Enterprise namespace.
pub const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// How a job reaches Vault and which credentials it starts from.
///
/// Built once per job and read-only afterwards. Empty strings are
/// treated as absent.
#[derive(Clone)]
pub struct FeatureSettings {
    url: String,
    wrapped: bool,
    role_id: Option<String>,
    secret_id: Option<SecretString>,
    token: Option<SecretString>,
}

impl std::fmt::Debug for FeatureSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureSettings")
            .field("url", &self.url)
            .field("wrapped", &self.wrapped)
            .field("role_id", &self.role_id)
            .field("secret_id", &self.secret_id.as_ref().map(|_| "[REDACTED]"))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl FeatureSettings {
    /// Create settings. `wrapped` selects the response-wrapped AppRole bootstrap.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        wrapped: bool,
        role_id: impl Into<String>,
        secret_id: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into().trim().trim_end_matches('/').to_string(),
            wrapped,
            role_id: non_empty(role_id),
            secret_id: non_empty(secret_id).map(SecretString::from),
            token: None,
        }
    }

    /// Settings for the wrapped AppRole bootstrap.
    #[must_use]
    pub fn wrapped(
        url: impl Into<String>,
        role_id: impl Into<String>,
        secret_id: impl Into<String>,
    ) -> Self {
        Self::new(url, true, role_id, secret_id)
    }

    /// Settings for a pre-provisioned token, bypassing the bootstrap.
    #[must_use]
    pub fn direct(url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut settings = Self::new(url, false, "", "");
        settings.token = non_empty(token).map(SecretString::from);
        settings
    }

    /// Read settings from `VAULT_ADDR`, `VAULT_WRAPPED_BOOTSTRAP`,
    /// `VAULT_ROLE_ID`, `VAULT_SECRET_ID` and `VAULT_TOKEN`.
    ///
    /// Bootstrap is enabled when `VAULT_WRAPPED_BOOTSTRAP` is `true`/`1`,
    /// or when it is unset and a role-id is present.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Configuration`] when `VAULT_ADDR` is unset.
    pub fn from_env() -> VaultResult<Self> {
        let var = |name: &str| std::env::var(name).unwrap_or_default();

        let url = non_empty(var("VAULT_ADDR"))
            .ok_or_else(|| VaultError::configuration("VAULT_ADDR is not set"))?;
        let role_id = var("VAULT_ROLE_ID");
        let wrapped = match var("VAULT_WRAPPED_BOOTSTRAP").trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => non_empty(role_id.clone()).is_some(),
        };

        let mut settings = Self::new(url, wrapped, role_id, var("VAULT_SECRET_ID"));
        settings.token = non_empty(var("VAULT_TOKEN")).map(SecretString::from);
        Ok(settings)
    }

    /// Vault base URL, without trailing slash.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the wrapped AppRole bootstrap is selected.
    #[must_use]
    pub const fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// AppRole role-id.
    #[must_use]
    pub fn role_id(&self) -> Option<&str> {
        self.role_id.as_deref()
    }

    /// AppRole secret-id.
    #[must_use]
    pub const fn secret_id(&self) -> Option<&SecretString> {
        self.secret_id.as_ref()
    }

    /// Pre-provisioned token.
    #[must_use]
    pub const fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    /// Check the URL and the role-id/secret-id pairing.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Configuration`] when the URL is not an
    /// http(s) URL, when only one of role-id and secret-id is set, or when
    /// bootstrap is selected without them.
    pub fn validate(&self) -> VaultResult<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| VaultError::configuration(format!("Vault URL {:?}: {e}", self.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(VaultError::configuration(format!(
                "Vault URL must be http or https, got {}",
                parsed.scheme()
            )));
        }

        match (self.role_id.is_some(), self.secret_id.is_some()) {
            (true, false) => Err(VaultError::configuration("role-id set without secret-id")),
            (false, true) => Err(VaultError::configuration("secret-id set without role-id")),
            (false, false) if self.wrapped => Err(VaultError::configuration(
                "wrapped bootstrap requires role-id and secret-id",
            )),
            _ => Ok(()),
        }
    }

    /// Role-id and secret-id for the wrapped bootstrap.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Configuration`] when bootstrap is disabled or
    /// the settings are otherwise invalid.
    pub fn approle_credentials(&self) -> VaultResult<(&str, &SecretString)> {
        if !self.wrapped {
            return Err(VaultError::configuration(
                "wrapped-token bootstrap is disabled for these settings",
            ));
        }
        self.validate()?;
        match (self.role_id.as_deref(), self.secret_id.as_ref()) {
            (Some(role_id), Some(secret_id)) if !secret_id.expose_secret().is_empty() => {
                Ok((role_id, secret_id))
            }
            _ => Err(VaultError::configuration(
                "wrapped bootstrap requires role-id and secret-id",
            )),
        }
    }
}

/// Vault client tunables.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Server certificate trust
    pub trust_policy: TrustPolicy,
    /// Vault Enterprise namespace
    pub namespace: Option<String>,
    /// Mount path of the AppRole auth method
    pub approle_mount: String,
    /// TTL requested for the wrapped login response
    pub wrap_ttl: Duration,
    /// Fraction of the lease consumed before renewal becomes due
    pub renewal_fraction: f64,
    /// Period of the renewal scheduler
    pub check_interval: Duration,
    /// Increment requested on renewal; server default when `None`
    pub renewal_increment: Option<Duration>,
    /// Revoke the session token when the session is closed
    pub revoke_on_close: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        let skip_verify = std::env::var("VAULT_SKIP_VERIFY")
            .is_ok_and(|v| matches!(v.trim(), "true" | "1"));

        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            trust_policy: if skip_verify {
                TrustPolicy::AcceptInvalid
            } else {
                TrustPolicy::System
            },
            namespace: std::env::var("VAULT_NAMESPACE").ok().and_then(non_empty),
            approle_mount: "approle".to_string(),
            wrap_ttl: Duration::from_secs(60),
            renewal_fraction: 2.0 / 3.0,
            check_interval: Duration::from_secs(5),
            renewal_increment: None,
            revoke_on_close: true,
        }
    }
}

impl VaultConfig {
    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the certificate trust policy.
    #[must_use]
    pub fn with_trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.trust_policy = policy;
        self
    }

    /// Set the Vault namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = non_empty(namespace);
        self
    }

    /// Set the AppRole mount path.
    #[must_use]
    pub fn with_approle_mount(mut self, mount: impl Into<String>) -> Self {
        self.approle_mount = mount.into().trim_matches('/').to_string();
        self
    }

    /// Set the wrap TTL (at least one second).
    #[must_use]
    pub fn with_wrap_ttl(mut self, ttl: Duration) -> Self {
        self.wrap_ttl = ttl.max(Duration::from_secs(1));
        self
    }

    /// Set the renewal fraction (clamped to 0.1-0.95).
    #[must_use]
    pub fn with_renewal_fraction(mut self, fraction: f64) -> Self {
        self.renewal_fraction = if fraction.is_nan() {
            2.0 / 3.0
        } else {
            fraction.clamp(0.1, 0.95)
        };
        self
    }

    /// Set the scheduler period (at least 10ms).
    #[must_use]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(Duration::from_millis(10));
        self
    }

    /// Request a specific increment on renewal.
    #[must_use]
    pub const fn with_renewal_increment(mut self, increment: Duration) -> Self {
        self.renewal_increment = Some(increment);
        self
    }

    /// Keep the token alive when the session is closed.
    #[must_use]
    pub const fn without_revoke_on_close(mut self) -> Self {
        self.revoke_on_close = false;
        self
    }

    /// Path of the AppRole login endpoint, relative to `/v1/`.
    #[must_use]
    pub fn login_path(&self) -> String {
        format!("auth/{}/login", self.approle_mount)
    }

    /// HTTP settings shared by every client talking to Vault.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        let config = HttpConfig::default()
            .with_timeout(self.timeout)
            .with_connect_timeout(self.connect_timeout)
            .with_trust_policy(self.trust_policy.clone());

        match &self.namespace {
            Some(namespace) => config.with_default_header(NAMESPACE_HEADER, namespace),
            None => config,
        }
    }
}
