//! Response-wrapped Vault bootstrap for build jobs.
//!
//! A job obtains its Vault token without the token ever passing through
//! configuration or logs:
//!
//! 1. [`exchanger`] performs the AppRole login with the wrap directive and
//!    receives a single-use wrap token.
//! 2. [`unwrap`] exchanges that wrap token, exactly once, for the session
//!    token.
//! 3. [`session`] owns the session token, renews it before expiry, and
//!    reports when it can no longer be used.
//!
//! [`VaultConnector`] ties the three together for the orchestrator.

pub mod auth;
pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod exchanger;
mod responses;
pub mod session;
pub mod token;
pub mod unwrap;

pub use auth::{
    AppRoleWrappedAuthentication, ClientAuthentication, CubbyholeAuthentication,
    TokenAuthentication, authentication_for,
};
pub use client::VaultClient;
pub use config::{FeatureSettings, VaultConfig};
pub use connector::{ConnectedSession, VaultConnector};
pub use error::{ErrorKind, SessionFailure, VaultError, VaultResult};
pub use exchanger::{CredentialExchanger, request_wrapped_token};
pub use rust_common::TrustPolicy;
pub use session::{RenewalHandle, SessionEvent, SessionManager, SessionState};
pub use token::{MAX_LEASE, SessionToken, WrapMetadata, WrapResult};
