//! Shared library for cross-cutting concerns of the Vault session crates.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration and building (timeouts, TLS trust, default headers)
//! - Retry policies with exponential backoff
//! - Tracing subscriber setup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod retry;
pub mod tracing_config;

pub use error::{PlatformError, Retryable};
pub use http::{HttpConfig, TrustPolicy, build_http_client};
pub use retry::{RetryConfig, RetryPolicy};
pub use tracing_config::{TracingConfig, init_tracing, try_init_tracing};
