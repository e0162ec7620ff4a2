//! Vault response bodies for tests.
//!
//! Shapes follow what Vault actually returns, including the fields the
//! client ignores, so decoding is exercised against realistic payloads.

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};

/// Body of a response-wrapped AppRole login.
#[must_use]
pub fn wrapped_login_response(wrap_token: &str, ttl_secs: u64, creation_path: &str) -> Value {
    json!({
        "request_id": "",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": null,
        "wrap_info": {
            "token": wrap_token,
            "accessor": format!("{wrap_token}-accessor"),
            "ttl": ttl_secs,
            "creation_time": Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            "creation_path": creation_path,
        },
        "warnings": null,
        "auth": null
    })
}

/// Body of a plain (unwrapped) AppRole login.
#[must_use]
pub fn plain_login_response(client_token: &str, lease_secs: u64, renewable: bool) -> Value {
    auth_response(client_token, lease_secs, renewable)
}

/// Body carrying an `auth` block, as returned by unwrap and renew-self.
#[must_use]
pub fn auth_response(client_token: &str, lease_secs: u64, renewable: bool) -> Value {
    json!({
        "request_id": "8e33c808-f86c-cff8-f30a-fbb3ac22c4a8",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": null,
        "wrap_info": null,
        "warnings": null,
        "auth": {
            "client_token": client_token,
            "accessor": format!("{client_token}-accessor"),
            "policies": ["default"],
            "token_policies": ["default"],
            "metadata": { "role_name": "ci" },
            "lease_duration": lease_secs,
            "renewable": renewable,
            "entity_id": "",
            "token_type": "service",
            "orphan": true
        }
    })
}

/// Body of `auth/token/lookup-self`.
#[must_use]
pub fn lookup_self_response(token: &str, ttl_secs: u64, renewable: bool) -> Value {
    json!({
        "data": {
            "accessor": format!("{token}-accessor"),
            "creation_ttl": ttl_secs,
            "display_name": "token",
            "policies": ["default"],
            "renewable": renewable,
            "ttl": ttl_secs,
            "type": "service"
        }
    })
}

/// Vault error body.
#[must_use]
pub fn error_response(message: &str) -> Value {
    json!({ "errors": [message] })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_login_has_no_auth() {
        let body = wrapped_login_response("hvs.wrap", 60, "auth/approle/login");
        assert!(body["auth"].is_null());
        assert_eq!(body["wrap_info"]["token"], "hvs.wrap");
        assert_eq!(body["wrap_info"]["ttl"], 60);
    }

    #[test]
    fn test_auth_response_fields() {
        let body = auth_response("hvs.session", 1200, true);
        assert_eq!(body["auth"]["client_token"], "hvs.session");
        assert_eq!(body["auth"]["lease_duration"], 1200);
        assert_eq!(body["auth"]["renewable"], true);
    }

    #[test]
    fn test_error_response() {
        assert_eq!(error_response("permission denied")["errors"][0], "permission denied");
    }
}
