//! Vault HTTP transport.
//!
//! A thin wrapper over `reqwest` that knows the `/v1/` prefix, attaches
//! tokens, and maps status codes onto [`VaultError`] kinds:
//! 2xx decodes the body, 429 and 5xx are unreachable, any other 4xx is a
//! rejection.

use crate::{
    config::{TOKEN_HEADER, VaultConfig, WRAP_TTL_HEADER},
    error::{VaultError, VaultResult},
    responses::ErrorResponse,
};
use reqwest::{Client, Method, StatusCode};
use rust_common::build_http_client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

/// HTTP client bound to one Vault server.
#[derive(Clone)]
pub struct VaultClient {
    addr: String,
    http: Client,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient").field("addr", &self.addr).finish_non_exhaustive()
    }
}

impl VaultClient {
    /// Create a client for `addr` using the timeouts, trust policy and
    /// namespace from `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(addr: impl Into<String>, config: &VaultConfig) -> VaultResult<Self> {
        let http = build_http_client(&config.http_config())?;
        Ok(Self::with_http(addr, http))
    }

    /// Create a client whose every request asks Vault to wrap the response
    /// for `config.wrap_ttl`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn wrapping(addr: impl Into<String>, config: &VaultConfig) -> VaultResult<Self> {
        let http_config = config
            .http_config()
            .with_default_header(WRAP_TTL_HEADER, format!("{}s", config.wrap_ttl.as_secs()));
        let http = build_http_client(&http_config)?;
        Ok(Self::with_http(addr, http))
    }

    /// Wrap an existing reqwest client.
    #[must_use]
    pub fn with_http(addr: impl Into<String>, http: Client) -> Self {
        Self {
            addr: addr.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Server address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.addr
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.addr, path.trim_start_matches('/'))
    }

    /// POST `body` to `path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See the module documentation for the status mapping; undecodable
    /// bodies are [`VaultError::Serialization`].
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&SecretString>,
        body: Option<&serde_json::Value>,
    ) -> VaultResult<T> {
        let bytes = self.send(Method::POST, path, token, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// GET `path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// As for [`VaultClient::post`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&SecretString>,
    ) -> VaultResult<T> {
        let bytes = self.send(Method::GET, path, token, None).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// POST to `path`, ignoring any response body.
    ///
    /// # Errors
    ///
    /// As for [`VaultClient::post`], minus decoding.
    pub async fn post_empty(&self, path: &str, token: Option<&SecretString>) -> VaultResult<()> {
        self.send(Method::POST, path, token, None).await.map(drop)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&SecretString>,
        body: Option<&serde_json::Value>,
    ) -> VaultResult<Vec<u8>> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VaultError::from_transport(&e))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| VaultError::from_transport(&e))?;

        debug!(path, status = status.as_u16(), "Vault responded");
        classify(status, path, &bytes)?;
        Ok(bytes.to_vec())
    }
}

fn classify(status: StatusCode, path: &str, body: &[u8]) -> VaultResult<()> {
    if status.is_success() {
        return Ok(());
    }

    let message = format!(
        "{path}: {}",
        ErrorResponse::parse(body).message_or(&format!("status {status}"))
    );

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(VaultError::unreachable(message))
    } else if status.is_client_error() {
        Err(VaultError::rejected(message))
    } else {
        Err(VaultError::protocol(message))
    }
}
