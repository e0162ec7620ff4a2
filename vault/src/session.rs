//! Session token lifecycle: initial authentication, renewal, revocation.
//!
//! State lives in an [`ArcSwap`], so readers always load one complete
//! snapshot and never see a token paired with another token's expiry.
//! Every state change (bootstrap, renewal, revocation, scheduler tick)
//! runs under `renew_lock`, so at most one network call against the
//! session is in flight at any time.

use crate::{
    auth::ClientAuthentication,
    client::VaultClient,
    config::VaultConfig,
    error::{ErrorKind, SessionFailure, VaultError, VaultResult},
    responses::AuthResponse,
    token::{SessionToken, server_lease},
};
use arc_swap::ArcSwap;
use rust_common::RetryPolicy;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Path of the self-renewal endpoint, relative to `/v1/`.
pub const RENEW_SELF_PATH: &str = "auth/token/renew-self";
/// Path of the self-revocation endpoint, relative to `/v1/`.
pub const REVOKE_SELF_PATH: &str = "auth/token/revoke-self";

const EVENT_CAPACITY: usize = 32;

/// Where a session stands.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// No token yet, or the token was revoked.
    Unauthenticated {
        /// Why the last bootstrap failed, if it did
        last_error: Option<SessionFailure>,
    },
    /// Holding a token.
    Authenticated(SessionToken),
    /// Renewal was refused or the token ran out. Terminal.
    RenewalFailed(SessionFailure),
}

impl SessionState {
    /// The held token, if any.
    #[must_use]
    pub const fn token(&self) -> Option<&SessionToken> {
        match self {
            Self::Authenticated(token) => Some(token),
            _ => None,
        }
    }

    /// Whether a token is held.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Whether the session reached its terminal failed state.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::RenewalFailed(_))
    }
}

/// Notifications for the orchestrator.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Initial authentication succeeded.
    Authenticated {
        /// Lease of the new token
        lease: Duration,
        /// Whether renewals will be scheduled
        renewable: bool,
    },
    /// Initial authentication failed; the session stays unauthenticated.
    AuthenticationFailed(SessionFailure),
    /// The lease was extended.
    Renewed {
        /// New lease reported by the server
        lease: Duration,
        /// Whether the server issued a different token
        rotated: bool,
    },
    /// A renewal hit a transient failure; a later tick tries again.
    RenewalDeferred(SessionFailure),
    /// The session is no longer usable.
    RenewalFailed(SessionFailure),
    /// The token was revoked on request.
    Revoked,
}

struct SessionInner {
    authentication: Arc<dyn ClientAuthentication>,
    client: VaultClient,
    config: VaultConfig,
    state: ArcSwap<SessionState>,
    renew_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

/// Owns one session token for its whole validity window.
///
/// Cloning is cheap and yields another handle to the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("authentication", &self.inner.authentication.name())
            .field("addr", &self.inner.client.address())
            .field("state", &self.inner.state.load_full())
            .finish()
    }
}

impl SessionManager {
    /// Create an unauthenticated session. Makes no request.
    #[must_use]
    pub fn new(
        authentication: Arc<dyn ClientAuthentication>,
        client: VaultClient,
        config: VaultConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                authentication,
                client,
                config,
                state: ArcSwap::from_pointee(SessionState::Unauthenticated { last_error: None }),
                renew_lock: Mutex::new(()),
                events,
            }),
        }
    }

    /// Create a session and authenticate it right away.
    ///
    /// A failed authentication does not fail construction: the session
    /// stays unauthenticated, records the error in its state and on the
    /// event channel, and [`SessionManager::current_token`] fails until
    /// [`SessionManager::bootstrap`] succeeds.
    pub async fn start(
        authentication: Arc<dyn ClientAuthentication>,
        client: VaultClient,
        config: VaultConfig,
    ) -> Self {
        let manager = Self::new(authentication, client, config);
        let _ = manager.bootstrap().await;
        manager
    }

    /// Listen for session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> Arc<SessionState> {
        self.inner.state.load_full()
    }

    /// Tunables of this session.
    #[must_use]
    pub fn config(&self) -> &VaultConfig {
        &self.inner.config
    }

    /// The last known good token, without blocking.
    ///
    /// The token is returned even if its lease has run out; check
    /// [`SessionToken::is_expired`] or use [`SessionManager::valid_token`].
    ///
    /// # Errors
    ///
    /// [`VaultError::NotAuthenticated`] before a successful bootstrap or
    /// after revocation, [`VaultError::SessionFailed`] once renewal failed.
    pub fn current_token(&self) -> VaultResult<SessionToken> {
        match &**self.inner.state.load() {
            SessionState::Authenticated(token) => Ok(token.clone()),
            SessionState::Unauthenticated { .. } => Err(VaultError::NotAuthenticated),
            SessionState::RenewalFailed(failure) => Err(VaultError::SessionFailed(failure.clone())),
        }
    }

    /// Like [`SessionManager::current_token`], but refuses expired tokens.
    ///
    /// # Errors
    ///
    /// As for `current_token`, plus [`VaultError::TokenExpired`].
    pub fn valid_token(&self) -> VaultResult<SessionToken> {
        let token = self.current_token()?;
        if token.is_expired() {
            return Err(VaultError::TokenExpired);
        }
        Ok(token)
    }

    /// Authenticate an unauthenticated session.
    ///
    /// Does nothing for an authenticated session. A failed session cannot
    /// be recovered; build a new one.
    ///
    /// # Errors
    ///
    /// The authentication error, or [`VaultError::SessionFailed`].
    #[instrument(skip_all, fields(auth = self.inner.authentication.name()))]
    pub async fn bootstrap(&self) -> VaultResult<()> {
        let _guard = self.inner.renew_lock.lock().await;

        match &**self.inner.state.load() {
            SessionState::Authenticated(_) => return Ok(()),
            SessionState::RenewalFailed(failure) => {
                return Err(VaultError::SessionFailed(failure.clone()));
            }
            SessionState::Unauthenticated { .. } => {}
        }

        match self.inner.authentication.login().await {
            Ok(token) => {
                info!(
                    lease_secs = token.lease().as_secs(),
                    renewable = token.is_renewable(),
                    "Session authenticated"
                );
                self.emit(SessionEvent::Authenticated {
                    lease: token.lease(),
                    renewable: token.is_renewable(),
                });
                self.inner.state.store(Arc::new(SessionState::Authenticated(token)));
                Ok(())
            }
            Err(e) => {
                let failure = SessionFailure::from(&e);
                warn!(error = %e, "Session authentication failed");
                self.inner.state.store(Arc::new(SessionState::Unauthenticated {
                    last_error: Some(failure.clone()),
                }));
                self.emit(SessionEvent::AuthenticationFailed(failure));
                Err(e)
            }
        }
    }

    /// [`SessionManager::bootstrap`], retrying unreachable-server failures
    /// with `policy`.
    ///
    /// Authentications built on a single-use token are attempted once,
    /// whatever the policy says.
    ///
    /// # Errors
    ///
    /// The last authentication error.
    pub async fn bootstrap_with_retry(&self, policy: &RetryPolicy) -> VaultResult<()> {
        if !self.inner.authentication.supports_relogin() {
            return self.bootstrap().await;
        }
        policy.execute(|| self.bootstrap()).await
    }

    /// Renew the session token now and return the new expiry.
    ///
    /// Waits for any renewal already in flight. A rejection, a malformed
    /// response, an expired token or a token the server marked
    /// non-renewable moves the session to [`SessionState::RenewalFailed`];
    /// an unreachable server leaves it authenticated. Once failed, returns
    /// at once without a request.
    ///
    /// # Errors
    ///
    /// The renewal error, [`VaultError::NotAuthenticated`] or
    /// [`VaultError::SessionFailed`].
    pub async fn renew(&self) -> VaultResult<Instant> {
        let _guard = self.inner.renew_lock.lock().await;
        self.renew_locked().await
    }

    /// [`SessionManager::renew`], reporting only success.
    pub async fn renew_token(&self) -> bool {
        self.renew().await.is_ok()
    }

    #[instrument(skip_all)]
    async fn renew_locked(&self) -> VaultResult<Instant> {
        let current = match &**self.inner.state.load() {
            SessionState::Authenticated(token) => token.clone(),
            SessionState::Unauthenticated { .. } => return Err(VaultError::NotAuthenticated),
            SessionState::RenewalFailed(failure) => {
                return Err(VaultError::SessionFailed(failure.clone()));
            }
        };

        if current.is_expired() {
            let err = VaultError::TokenExpired;
            self.fail(&err);
            return Err(err);
        }
        if !current.is_renewable() {
            let err = VaultError::rejected("session token is not renewable");
            self.fail(&err);
            return Err(err);
        }

        let body = self
            .inner
            .config
            .renewal_increment
            .map(|increment| serde_json::json!({ "increment": format!("{}s", increment.as_secs()) }));

        let requested_at = Instant::now();
        let result = self
            .inner
            .client
            .post::<AuthResponse>(RENEW_SELF_PATH, Some(current.secret()), body.as_ref())
            .await
            .and_then(|response| renewed_token(&current, response, requested_at));

        match result {
            Ok((renewed, expires_at)) => {
                let rotated = renewed.expose() != current.expose();
                info!(
                    lease_secs = renewed.lease().as_secs(),
                    rotated,
                    "Session token renewed"
                );
                self.emit(SessionEvent::Renewed {
                    lease: renewed.lease(),
                    rotated,
                });
                self.inner.state.store(Arc::new(SessionState::Authenticated(renewed)));
                Ok(expires_at)
            }
            Err(e) if e.kind() == ErrorKind::Unreachable => {
                warn!(error = %e, "Token renewal deferred");
                self.emit(SessionEvent::RenewalDeferred(SessionFailure::from(&e)));
                Err(e)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn fail(&self, err: &VaultError) {
        let failure = SessionFailure::from(err);
        error!(error = %err, "Session renewal failed; session is no longer usable");
        self.inner
            .state
            .store(Arc::new(SessionState::RenewalFailed(failure.clone())));
        self.emit(SessionEvent::RenewalFailed(failure));
    }

    /// Revoke the session token and return to unauthenticated.
    ///
    /// Does nothing when no token is held. The token is dropped locally
    /// even when the request fails.
    ///
    /// # Errors
    ///
    /// The revocation error.
    #[instrument(skip_all)]
    pub async fn revoke(&self) -> VaultResult<()> {
        let _guard = self.inner.renew_lock.lock().await;

        let Some(token) = self.inner.state.load().token().cloned() else {
            return Ok(());
        };

        let result = self
            .inner
            .client
            .post_empty(REVOKE_SELF_PATH, Some(token.secret()))
            .await;
        self.inner
            .state
            .store(Arc::new(SessionState::Unauthenticated { last_error: None }));

        match &result {
            Ok(()) => {
                info!("Session token revoked");
                self.emit(SessionEvent::Revoked);
            }
            Err(e) => warn!(error = %e, "Session token revocation failed"),
        }
        result
    }

    /// One scheduler step. Returns whether scheduling should continue.
    async fn tick(&self) -> bool {
        let Ok(_guard) = self.inner.renew_lock.try_lock() else {
            debug!("Renewal in flight, skipping tick");
            return true;
        };

        let state = self.inner.state.load_full();
        let token = match &*state {
            SessionState::RenewalFailed(_) => return false,
            SessionState::Unauthenticated { .. } => return true,
            SessionState::Authenticated(token) => token,
        };

        let now = Instant::now();
        if token.is_expired_at(now) {
            self.fail(&VaultError::TokenExpired);
            return false;
        }

        match token.renewal_due_at(self.inner.config.renewal_fraction) {
            Some(due) if now >= due => {
                debug!("Renewal due");
                let _ = self.renew_locked().await;
                !self.inner.state.load().is_failed()
            }
            _ => true,
        }
    }

    /// Start the periodic renewal task.
    ///
    /// The task checks the session every `check_interval`, renews once the
    /// configured fraction of the lease is used, and stops by itself when
    /// the session fails. Stop it with [`RenewalHandle::cancel`]; dropping
    /// the handle aborts it. Must be called within a Tokio runtime.
    #[must_use = "dropping the handle stops the renewal task"]
    pub fn spawn_renewal(&self) -> RenewalHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let manager = self.clone();
        let period = self.inner.config.check_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    keep_going = manager.tick() => {
                        if !keep_going {
                            break;
                        }
                    }
                }
            }
            debug!("Renewal task stopped");
        });

        RenewalHandle {
            shutdown,
            task: Some(task),
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

fn renewed_token(
    current: &SessionToken,
    response: AuthResponse,
    requested_at: Instant,
) -> VaultResult<(SessionToken, Instant)> {
    let auth = response
        .auth
        .ok_or_else(|| VaultError::protocol("renew-self response has no auth block"))?;
    let lease = auth
        .lease_duration
        .filter(|lease| *lease > 0)
        .ok_or_else(|| VaultError::protocol("renew-self granted no lease"))?;

    let rotated = auth
        .client_token
        .filter(|t| !t.is_empty())
        .map(SecretString::from);
    let lease = server_lease(lease, requested_at)?;
    let renewed = current.renewed(rotated, lease, auth.renewable, requested_at);
    let expires_at = renewed
        .expires_at()
        .ok_or_else(|| VaultError::protocol("renewed token has no expiry"))?;
    Ok((renewed, expires_at))
}

/// Handle to a running renewal task.
pub struct RenewalHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RenewalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl RenewalHandle {
    /// Stop the task and wait for it to exit. An in-flight renewal is
    /// abandoned; no request is issued afterwards.
    pub async fn cancel(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Renewal task panicked");
                }
            }
        }
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
