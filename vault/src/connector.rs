//! Entry point for the job orchestrator.

use crate::{
    auth::authentication_for,
    client::VaultClient,
    config::{FeatureSettings, VaultConfig},
    error::VaultResult,
    exchanger::CredentialExchanger,
    session::{RenewalHandle, SessionEvent, SessionManager},
    token::{SessionToken, WrapResult},
};
use rust_common::RetryPolicy;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Connects a job to Vault according to its settings.
#[derive(Debug, Clone)]
pub struct VaultConnector {
    settings: FeatureSettings,
    config: VaultConfig,
}

impl VaultConnector {
    /// Create a connector.
    #[must_use]
    pub const fn new(settings: FeatureSettings, config: VaultConfig) -> Self {
        Self { settings, config }
    }

    /// Settings this connector uses.
    #[must_use]
    pub const fn settings(&self) -> &FeatureSettings {
        &self.settings
    }

    /// Wrapped AppRole login only; see [`CredentialExchanger`].
    ///
    /// # Errors
    ///
    /// See [`CredentialExchanger::request_wrapped_token`].
    pub async fn request_wrapped_token(&self) -> VaultResult<WrapResult> {
        CredentialExchanger::new(self.config.clone())
            .request_wrapped_token(&self.settings)
            .await
    }

    /// An unauthenticated session for these settings. Makes no request.
    ///
    /// # Errors
    ///
    /// Configuration errors from the settings.
    pub fn session_manager(&self) -> VaultResult<SessionManager> {
        let authentication = authentication_for(&self.settings, &self.config)?;
        let client = VaultClient::new(self.settings.url(), &self.config)?;
        Ok(SessionManager::new(authentication, client, self.config.clone()))
    }

    /// Authenticate and start renewal.
    ///
    /// # Errors
    ///
    /// Configuration or authentication errors. The job should fail rather
    /// than continue without a credential.
    pub async fn connect(&self) -> VaultResult<ConnectedSession> {
        self.connect_with_retry(&RetryPolicy::none()).await
    }

    /// [`VaultConnector::connect`], retrying unreachable-server failures
    /// where the authentication allows it.
    ///
    /// # Errors
    ///
    /// As for [`VaultConnector::connect`].
    #[instrument(skip_all, fields(addr = %self.settings.url(), wrapped = self.settings.is_wrapped()))]
    pub async fn connect_with_retry(&self, policy: &RetryPolicy) -> VaultResult<ConnectedSession> {
        let manager = self.session_manager()?;
        manager.bootstrap_with_retry(policy).await?;
        let renewal = manager.spawn_renewal();
        info!("Vault session established");

        Ok(ConnectedSession {
            manager,
            renewal,
            revoke_on_close: self.config.revoke_on_close,
        })
    }
}

/// An authenticated session with its renewal task running.
#[derive(Debug)]
pub struct ConnectedSession {
    manager: SessionManager,
    renewal: RenewalHandle,
    revoke_on_close: bool,
}

impl ConnectedSession {
    /// The bearer token to attach to outgoing requests.
    ///
    /// # Errors
    ///
    /// Fails once the session has failed or the token has expired; the
    /// orchestrator should then fail the job.
    pub fn token(&self) -> VaultResult<SessionToken> {
        self.manager.valid_token()
    }

    /// Session failures and renewals.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.manager.subscribe()
    }

    /// The underlying session.
    #[must_use]
    pub const fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Stop renewal, then revoke the token if configured to.
    ///
    /// # Errors
    ///
    /// The revocation error; renewal is stopped regardless.
    pub async fn close(self) -> VaultResult<()> {
        self.renewal.cancel().await;
        if self.revoke_on_close {
            self.manager.revoke().await?;
        }
        info!("Vault session closed");
        Ok(())
    }
}
