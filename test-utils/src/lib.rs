//! Shared test utilities for the Vault bootstrap crates.
//!
//! This crate provides:
//! - Proptest generators for credentials, tokens and leases
//! - A mock Vault server speaking the AppRole, wrapping and token endpoints
//! - Vault response bodies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{Endpoint, MockVaultServer, MockVaultServerBuilder, RenewBehavior};

use rust_common::{TracingConfig, try_init_tracing};

/// Route `tracing` output through the test harness. Safe to call from
/// every test.
pub fn init_test_tracing() {
    let config = TracingConfig::default()
        .with_service_name("vault-tests")
        .with_test_writer();
    let _ = try_init_tracing(&config);
}
