//! Vault response envelopes.
//!
//! Every field is optional so a missing value surfaces as a protocol error
//! naming the field, instead of a generic decode failure. These types hold
//! raw tokens and deliberately do not implement `Debug`.

use serde::Deserialize;

/// Envelope of a response-wrapped call.
#[derive(Deserialize)]
pub struct WrappedResponse {
    pub wrap_info: Option<WrapInfo>,
    /// Present only if the server ignored the wrap directive.
    pub auth: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct WrapInfo {
    pub token: Option<String>,
    pub ttl: Option<u64>,
    pub creation_time: Option<String>,
    pub creation_path: Option<String>,
    pub accessor: Option<String>,
}

/// Response carrying an `auth` block (unwrap, renew-self).
#[derive(Deserialize)]
pub struct AuthResponse {
    pub auth: Option<AuthData>,
}

#[derive(Deserialize)]
pub struct AuthData {
    pub client_token: Option<String>,
    pub accessor: Option<String>,
    pub lease_duration: Option<u64>,
    #[serde(default)]
    pub renewable: bool,
}

/// `auth/token/lookup-self` response.
#[derive(Deserialize)]
pub struct LookupResponse {
    pub data: Option<LookupData>,
}

#[derive(Deserialize)]
pub struct LookupData {
    pub accessor: Option<String>,
    pub ttl: Option<u64>,
    #[serde(default)]
    pub renewable: bool,
}

/// Error body Vault attaches to non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ErrorResponse {
    /// Decode an error body, tolerating empty or non-JSON bodies.
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// Joined error messages, or `fallback` when the server sent none.
    pub fn message_or(&self, fallback: &str) -> String {
        if self.errors.is_empty() {
            fallback.to_string()
        } else {
            self.errors.join("; ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_response_decodes() {
        let body = serde_json::json!({
            "request_id": "",
            "lease_id": "",
            "renewable": false,
            "lease_duration": 0,
            "data": null,
            "auth": null,
            "wrap_info": {
                "token": "hvs.wrap",
                "accessor": "acc",
                "ttl": 60,
                "creation_time": "2024-01-01T00:00:00Z",
                "creation_path": "auth/approle/login"
            }
        });
        let parsed: WrappedResponse = serde_json::from_value(body).unwrap();
        let info = parsed.wrap_info.unwrap();
        assert_eq!(info.token.as_deref(), Some("hvs.wrap"));
        assert_eq!(info.ttl, Some(60));
        assert!(parsed.auth.is_none());
    }

    #[test]
    fn test_auth_response_defaults() {
        let parsed: AuthResponse =
            serde_json::from_value(serde_json::json!({"auth": {"client_token": "t"}})).unwrap();
        let auth = parsed.auth.unwrap();
        assert!(!auth.renewable);
        assert!(auth.lease_duration.is_none());
    }

    #[test]
    fn test_error_response_parse() {
        let parsed = ErrorResponse::parse(br#"{"errors":["permission denied"]}"#);
        assert_eq!(parsed.message_or("x"), "permission denied");

        let parsed = ErrorResponse::parse(b"<html>bad gateway</html>");
        assert_eq!(parsed.message_or("status 502"), "status 502");
    }
}
