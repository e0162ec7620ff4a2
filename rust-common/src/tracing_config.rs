//! Tracing subscriber setup.
//!
//! Installs an `EnvFilter` + fmt subscriber, optionally emitting JSON.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name attached to the root span
    pub service_name: String,
    /// Log level filter, overridden by `RUST_LOG` when set
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
    /// Route output through the test writer so `cargo test` captures it
    pub test_writer: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "vault-session".to_string(),
            log_level: "info".to_string(),
            json_output: false,
            test_writer: false,
        }
    }
}

impl TracingConfig {
    /// Create config with custom service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Create config with custom log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Capture output through libtest.
    #[must_use]
    pub const fn with_test_writer(mut self) -> Self {
        self.test_writer = true;
        self
    }
}

fn filter(config: &TracingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Initialize tracing with the given configuration.
///
/// Sets up the global tracing subscriber. Returns `false` when a global
/// subscriber was already installed, which makes it safe to call from
/// every test.
pub fn try_init_tracing(config: &TracingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(filter(config));

    let result = match (config.json_output, config.test_writer) {
        (true, true) => registry
            .with(tracing_subscriber::fmt::layer().json().with_test_writer())
            .try_init(),
        (true, false) => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        (false, true) => registry
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init(),
        (false, false) => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if result.is_ok() {
        tracing::debug!(service = %config.service_name, "Tracing initialized");
    }
    result.is_ok()
}

/// Initialize tracing with the given configuration.
///
/// Should be called once at application startup; later calls are ignored.
pub fn init_tracing(config: &TracingConfig) {
    let _ = try_init_tracing(config);
}
