//! Shared proptest generators for Vault bootstrap types.

use proptest::prelude::*;
use std::time::Duration;

/// Generate AppRole role-ids (UUID shaped).
pub fn role_id_strategy() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
}

/// Generate AppRole secret-ids.
pub fn secret_id_strategy() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
}

/// Generate Vault service tokens.
pub fn vault_token_strategy() -> impl Strategy<Value = String> {
    "hvs\\.[A-Za-z0-9]{24}"
}

/// Generate lease durations in whole seconds, as Vault grants them.
pub fn lease_strategy() -> impl Strategy<Value = Duration> {
    (1u64..=7 * 24 * 3600).prop_map(Duration::from_secs)
}

/// Generate renewal fractions inside the accepted range.
pub fn renewal_fraction_strategy() -> impl Strategy<Value = f64> {
    0.1f64..=0.95
}

/// Generate Vault addresses.
pub fn vault_url_strategy() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("http"), Just("https")],
        "[a-z]{3,12}",
        prop::option::of(1024u16..65535),
    )
        .prop_map(|(scheme, host, port)| match port {
            Some(port) => format!("{scheme}://{host}.internal:{port}"),
            None => format!("{scheme}://{host}.internal"),
        })
}

/// Generate empty or whitespace-only strings.
pub fn blank_string_strategy() -> impl Strategy<Value = String> {
    "[ \t]{0,4}"
}
