//! Centralized HTTP client configuration and building.
//!
//! This module provides a standardized way to create HTTP clients with
//! consistent timeouts, TLS trust and default headers.

use crate::PlatformError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Client, ClientBuilder};
use std::time::Duration;

/// Which server certificates the client trusts.
#[derive(Clone, Default)]
pub enum TrustPolicy {
    /// Platform trust roots only.
    #[default]
    System,
    /// Platform roots plus the PEM encoded certificate(s) given.
    CustomCa(Vec<u8>),
    /// Accept any certificate. Only for local development servers.
    AcceptInvalid,
}

impl std::fmt::Debug for TrustPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => f.write_str("System"),
            Self::CustomCa(pem) => write!(f, "CustomCa({} bytes)", pem.len()),
            Self::AcceptInvalid => f.write_str("AcceptInvalid"),
        }
    }
}

/// HTTP client configuration.
///
/// Provides sensible defaults for production use with connection pooling,
/// timeouts, and TLS configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout (default: 30s)
    pub timeout: Duration,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// User agent string
    pub user_agent: String,
    /// Certificate trust
    pub trust_policy: TrustPolicy,
    /// Headers attached to every request
    pub default_headers: Vec<(String, String)>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: "vault-wrapped-session/0.1".to_string(),
            trust_policy: TrustPolicy::System,
            default_headers: Vec::new(),
        }
    }
}

impl HttpConfig {
    /// Create a new HTTP config with custom timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a new HTTP config with custom connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Create a new HTTP config with custom user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Create a new HTTP config with the given trust policy.
    #[must_use]
    pub fn with_trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.trust_policy = policy;
        self
    }

    /// Add a header sent with every request made by the client.
    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, PlatformError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| PlatformError::invalid_input(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| PlatformError::invalid_input(format!("header value for {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Build a configured HTTP client.
///
/// Creates a reqwest client with rustls TLS, connection pooling, and
/// the specified configuration.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidInput`] for a malformed header or CA
/// bundle, or when the client itself cannot be built.
///
/// # Examples
///
/// ```
/// use rust_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default()
///     .with_timeout(Duration::from_secs(60))
///     .with_default_header("X-Vault-Wrap-TTL", "60s");
/// let client = build_http_client(&config).expect("Failed to build client");
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, PlatformError> {
    let mut builder = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .default_headers(header_map(&config.default_headers)?)
        .use_rustls_tls();

    match &config.trust_policy {
        TrustPolicy::System => {}
        TrustPolicy::CustomCa(pem) => {
            let certs = Certificate::from_pem_bundle(pem)
                .map_err(|e| PlatformError::invalid_input(format!("CA bundle: {e}")))?;
            if certs.is_empty() {
                return Err(PlatformError::invalid_input("CA bundle contains no certificates"));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
        TrustPolicy::AcceptInvalid => {
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder
        .build()
        .map_err(|e| PlatformError::invalid_input(format!("HTTP client: {e}")))
}
