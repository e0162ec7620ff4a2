//! In-process mock Vault server.
//!
//! Built on wiremock. Implements just enough of Vault for the wrapped
//! AppRole bootstrap: the login honours the wrap directive, wrap tokens
//! unwrap exactly once, and token renewal can be scripted to extend,
//! rotate, reject or fail transiently.

use crate::fixtures::{
    auth_response, error_response, lookup_self_response, plain_login_response,
    wrapped_login_response,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TOKEN_HEADER: &str = "x-vault-token";
const WRAP_TTL_HEADER: &str = "x-vault-wrap-ttl";

/// Endpoints served by [`MockVaultServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `POST auth/{mount}/login`
    Login,
    /// `POST sys/wrapping/unwrap`
    Unwrap,
    /// `POST auth/token/renew-self`
    RenewSelf,
    /// `GET auth/token/lookup-self`
    LookupSelf,
    /// `POST auth/token/revoke-self`
    RevokeSelf,
}

/// How `renew-self` answers for a live token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewBehavior {
    /// Keep the token, grant the configured lease.
    Extend,
    /// Issue a new token `<old>-r<n>` with lease `base + n` seconds.
    Rotate,
    /// Answer 400 "lease is not renewable".
    Reject,
    /// Answer 503 as a sealed server would.
    Unavailable,
}

#[derive(Debug, Clone, Copy)]
struct TokenRecord {
    renewable: bool,
}

#[derive(Debug)]
struct VaultState {
    role_id: String,
    secret_id: String,
    lease_secs: u64,
    renewable: bool,
    renew_behavior: RenewBehavior,
    wraps: HashMap<String, String>,
    tokens: HashMap<String, TokenRecord>,
    calls: HashMap<Endpoint, usize>,
    next_id: u64,
    renewals: u64,
}

impl VaultState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, endpoint: Endpoint) {
        *self.calls.entry(endpoint).or_default() += 1;
    }
}

type SharedState = Arc<Mutex<VaultState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, VaultState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bearer(request: &Request) -> Option<String> {
    request
        .headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn json(status: u16, body: &serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(body)
}

/// Parse a wrap TTL header value such as `60s`, `5m` or `90`.
fn parse_ttl(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Some(secs) = value.strip_suffix('s') {
        return secs.parse().ok();
    }
    if let Some(mins) = value.strip_suffix('m') {
        return mins.parse::<u64>().ok().map(|m| m * 60);
    }
    value.parse().ok()
}

#[derive(Deserialize)]
struct LoginBody {
    role_id: String,
    secret_id: String,
}

struct LoginResponder {
    state: SharedState,
    creation_path: String,
}

impl Respond for LoginResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = lock(&self.state);
        state.record(Endpoint::Login);

        let Ok(body) = request.body_json::<LoginBody>() else {
            return json(400, &error_response("missing role_id"));
        };
        if body.role_id != state.role_id || body.secret_id != state.secret_id {
            return json(400, &error_response("invalid role or secret ID"));
        }

        let id = state.next_id();
        let client_token = format!("hvs.session-{id}");
        let lease = state.lease_secs;
        let renewable = state.renewable;

        let wrap_ttl = request
            .headers
            .get(WRAP_TTL_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_ttl);

        let Some(wrap_ttl) = wrap_ttl else {
            state.tokens.insert(client_token.clone(), TokenRecord { renewable });
            return json(200, &plain_login_response(&client_token, lease, renewable));
        };

        let wrap_token = format!("hvs.wrap-{id}");
        state.wraps.insert(wrap_token.clone(), client_token);
        json(200, &wrapped_login_response(&wrap_token, wrap_ttl, &self.creation_path))
    }
}

struct UnwrapResponder {
    state: SharedState,
}

impl Respond for UnwrapResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = lock(&self.state);
        state.record(Endpoint::Unwrap);

        let wrapped = bearer(request).and_then(|token| state.wraps.remove(&token));
        let Some(client_token) = wrapped else {
            return json(400, &error_response("wrapping token is not valid or does not exist"));
        };

        let (lease, renewable) = (state.lease_secs, state.renewable);
        state.tokens.insert(client_token.clone(), TokenRecord { renewable });
        json(200, &auth_response(&client_token, lease, renewable))
    }
}

struct RenewResponder {
    state: SharedState,
    delay: Duration,
}

impl Respond for RenewResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = lock(&self.state);
        state.record(Endpoint::RenewSelf);

        let Some(token) = bearer(request) else {
            return json(400, &error_response("missing client token"));
        };
        let Some(record) = state.tokens.get(&token).copied() else {
            return json(403, &error_response("permission denied"));
        };

        let response = match state.renew_behavior {
            RenewBehavior::Unavailable => json(503, &error_response("Vault is sealed")),
            RenewBehavior::Reject => json(400, &error_response("lease is not renewable")),
            _ if !record.renewable => json(400, &error_response("lease is not renewable")),
            RenewBehavior::Extend => {
                state.renewals += 1;
                json(200, &auth_response(&token, state.lease_secs, true))
            }
            RenewBehavior::Rotate => {
                state.renewals += 1;
                let n = state.renewals;
                let base = token.split("-r").next().unwrap_or(&token).to_string();
                let rotated = format!("{base}-r{n}");
                state.tokens.remove(&token);
                state.tokens.insert(rotated.clone(), record);
                json(200, &auth_response(&rotated, state.lease_secs + n, true))
            }
        };
        response.set_delay(self.delay)
    }
}

struct LookupResponder {
    state: SharedState,
}

impl Respond for LookupResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = lock(&self.state);
        state.record(Endpoint::LookupSelf);

        match bearer(request).and_then(|t| state.tokens.get(&t).copied().map(|r| (t, r))) {
            Some((token, record)) => {
                json(200, &lookup_self_response(&token, state.lease_secs, record.renewable))
            }
            None => json(403, &error_response("permission denied")),
        }
    }
}

struct RevokeResponder {
    state: SharedState,
}

impl Respond for RevokeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = lock(&self.state);
        state.record(Endpoint::RevokeSelf);

        match bearer(request).and_then(|t| state.tokens.remove(&t)) {
            Some(_) => ResponseTemplate::new(204),
            None => json(403, &error_response("permission denied")),
        }
    }
}

/// Builder for [`MockVaultServer`].
#[derive(Debug, Clone)]
pub struct MockVaultServerBuilder {
    role_id: String,
    secret_id: String,
    approle_mount: String,
    lease: Duration,
    renewable: bool,
    renew_behavior: RenewBehavior,
    renew_delay: Duration,
}

impl Default for MockVaultServerBuilder {
    fn default() -> Self {
        Self {
            role_id: "ci-role-id".to_string(),
            secret_id: "ci-secret-id".to_string(),
            approle_mount: "approle".to_string(),
            lease: Duration::from_secs(1200),
            renewable: true,
            renew_behavior: RenewBehavior::Extend,
            renew_delay: Duration::ZERO,
        }
    }
}

impl MockVaultServerBuilder {
    /// AppRole credentials the login accepts.
    #[must_use]
    pub fn credentials(mut self, role_id: impl Into<String>, secret_id: impl Into<String>) -> Self {
        self.role_id = role_id.into();
        self.secret_id = secret_id.into();
        self
    }

    /// AppRole mount path.
    #[must_use]
    pub fn approle_mount(mut self, mount: impl Into<String>) -> Self {
        self.approle_mount = mount.into();
        self
    }

    /// Lease granted to session tokens (whole seconds).
    #[must_use]
    pub const fn lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Whether issued session tokens are renewable.
    #[must_use]
    pub const fn renewable(mut self, renewable: bool) -> Self {
        self.renewable = renewable;
        self
    }

    /// How renewals are answered.
    #[must_use]
    pub const fn renew_behavior(mut self, behavior: RenewBehavior) -> Self {
        self.renew_behavior = behavior;
        self
    }

    /// Delay every renewal response.
    #[must_use]
    pub const fn renew_delay(mut self, delay: Duration) -> Self {
        self.renew_delay = delay;
        self
    }

    /// Start the server.
    pub async fn start(self) -> MockVaultServer {
        let server = MockServer::start().await;
        let state: SharedState = Arc::new(Mutex::new(VaultState {
            role_id: self.role_id.clone(),
            secret_id: self.secret_id.clone(),
            lease_secs: self.lease.as_secs(),
            renewable: self.renewable,
            renew_behavior: self.renew_behavior,
            wraps: HashMap::new(),
            tokens: HashMap::new(),
            calls: HashMap::new(),
            next_id: 0,
            renewals: 0,
        }));

        let login_path = format!("auth/{}/login", self.approle_mount);
        Mock::given(method("POST"))
            .and(path(format!("/v1/{login_path}")))
            .respond_with(LoginResponder {
                state: state.clone(),
                creation_path: login_path,
            })
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/wrapping/unwrap"))
            .respond_with(UnwrapResponder { state: state.clone() })
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token/renew-self"))
            .respond_with(RenewResponder {
                state: state.clone(),
                delay: self.renew_delay,
            })
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/token/lookup-self"))
            .respond_with(LookupResponder { state: state.clone() })
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token/revoke-self"))
            .respond_with(RevokeResponder { state: state.clone() })
            .mount(&server)
            .await;

        MockVaultServer {
            server,
            state,
            role_id: self.role_id,
            secret_id: self.secret_id,
        }
    }
}

/// Mock Vault server for testing.
pub struct MockVaultServer {
    server: MockServer,
    state: SharedState,
    role_id: String,
    secret_id: String,
}

impl MockVaultServer {
    /// Configure a server.
    #[must_use]
    pub fn builder() -> MockVaultServerBuilder {
        MockVaultServerBuilder::default()
    }

    /// Start a server with defaults.
    pub async fn start() -> Self {
        Self::builder().start().await
    }

    /// Base URL of the server.
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Role-id the login accepts.
    #[must_use]
    pub fn role_id(&self) -> &str {
        &self.role_id
    }

    /// Secret-id the login accepts.
    #[must_use]
    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }

    /// Requests served by `endpoint` so far.
    #[must_use]
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        lock(&self.state).calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Change how renewals are answered from now on.
    pub fn set_renew_behavior(&self, behavior: RenewBehavior) {
        lock(&self.state).renew_behavior = behavior;
    }

    /// Register a pre-provisioned token.
    pub fn insert_token(&self, token: impl Into<String>, renewable: bool) {
        lock(&self.state)
            .tokens
            .insert(token.into(), TokenRecord { renewable });
    }

    /// Whether `token` is currently live.
    #[must_use]
    pub fn is_live(&self, token: &str) -> bool {
        lock(&self.state).tokens.contains_key(token)
    }

    /// Wrap tokens issued and not yet unwrapped.
    #[must_use]
    pub fn outstanding_wraps(&self) -> usize {
        lock(&self.state).wraps.len()
    }
}
