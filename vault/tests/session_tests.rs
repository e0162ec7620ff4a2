//! End-to-end tests against a mock Vault server.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::{Duration, Instant};
use test_utils::fixtures::{auth_response, plain_login_response};
use test_utils::{Endpoint, MockVaultServer, RenewBehavior, init_test_tracing};
use tokio_test::{assert_err, assert_ok};
use vault_wrapped_session::{
    CubbyholeAuthentication, ErrorKind, FeatureSettings, SessionEvent, SessionManager,
    SessionState, VaultClient, VaultConfig, VaultConnector, VaultError, request_wrapped_token,
    unwrap::unwrap,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASE_LEASE: u64 = 1200;

fn settings(server: &MockVaultServer) -> FeatureSettings {
    FeatureSettings::wrapped(server.uri(), server.role_id(), server.secret_id())
}

fn config() -> VaultConfig {
    VaultConfig::default()
        .with_timeout(Duration::from_secs(5))
        .with_check_interval(Duration::from_millis(20))
}

async fn connected_manager(server: &MockVaultServer) -> SessionManager {
    let manager = VaultConnector::new(settings(server), config())
        .session_manager()
        .unwrap();
    manager.bootstrap().await.unwrap();
    manager
}

async fn next_renewal(events: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> SessionEvent {
    loop {
        match events.recv().await.unwrap() {
            event @ (SessionEvent::Renewed { .. } | SessionEvent::RenewalFailed(_)) => return event,
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_wrapped_login_returns_wrap_token() {
    init_test_tracing();
    let server = MockVaultServer::start().await;

    let wrap = request_wrapped_token(&settings(&server), &config())
        .await
        .unwrap();

    assert!(!wrap.wrap_token().expose_secret().is_empty());
    assert_eq!(wrap.wrap_info().ttl, Duration::from_secs(60));
    assert_eq!(wrap.wrap_info().creation_path.as_deref(), Some("auth/approle/login"));
    assert!(wrap.wrap_info().creation_time.is_some());
    assert_eq!(server.outstanding_wraps(), 1);
}

#[tokio::test]
async fn test_wrap_ttl_is_sent() {
    let server = MockVaultServer::start().await;
    let config = config().with_wrap_ttl(Duration::from_secs(300));

    let wrap = request_wrapped_token(&settings(&server), &config).await.unwrap();
    assert_eq!(wrap.wrap_info().ttl, Duration::from_secs(300));
}

#[tokio::test]
async fn test_wrong_credentials_are_rejected() {
    let server = MockVaultServer::start().await;
    let settings = FeatureSettings::wrapped(server.uri(), server.role_id(), "wrong-secret");

    let err = request_wrapped_token(&settings, &config()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert!(err.to_string().contains("invalid role or secret ID"));
}

#[tokio::test]
async fn test_disabled_bootstrap_fails_before_network() {
    let server = MockVaultServer::start().await;
    let settings = FeatureSettings::new(server.uri(), false, "", "");

    let err = request_wrapped_token(&settings, &config()).await.unwrap_err();
    assert!(matches!(err, VaultError::Configuration(_)));

    let err = VaultConnector::new(settings, config()).connect().await.unwrap_err();
    assert!(matches!(err, VaultError::Configuration(_)));
    assert_eq!(server.calls(Endpoint::Login), 0);
}

#[tokio::test]
async fn test_missing_secret_fails_before_network() {
    let server = MockVaultServer::start().await;
    let settings = FeatureSettings::wrapped(server.uri(), server.role_id(), "");

    let err = request_wrapped_token(&settings, &config()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(server.calls(Endpoint::Login), 0);
}

#[tokio::test]
async fn test_unwrapped_login_response_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .and(header("x-vault-wrap-ttl", "60s"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(plain_login_response("hvs.plain", 60, true)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let settings = FeatureSettings::wrapped(server.uri(), "role", "secret");
    let err = request_wrapped_token(&settings, &config()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[tokio::test]
async fn test_unwrap_succeeds_exactly_once() {
    let server = MockVaultServer::start().await;
    let wrap = request_wrapped_token(&settings(&server), &config()).await.unwrap();
    let client = VaultClient::new(server.uri(), &config()).unwrap();

    let before = Instant::now();
    let token = unwrap(&client, wrap.wrap_token()).await.unwrap();
    assert!(!token.expose().is_empty());
    assert_eq!(token.lease(), Duration::from_secs(BASE_LEASE));
    assert!(token.is_renewable());
    assert!(token.expires_at().unwrap() > before);

    let err = unwrap(&client, wrap.wrap_token()).await.unwrap_err();
    assert!(matches!(err, VaultError::AuthRejected(_)));
    assert_eq!(server.calls(Endpoint::Unwrap), 2);
}

#[tokio::test]
async fn test_unknown_wrap_token_is_rejected() {
    let server = MockVaultServer::start().await;
    let client = VaultClient::new(server.uri(), &config()).unwrap();

    let err = unwrap(&client, &SecretString::from("hvs.never-issued"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);
}

#[tokio::test]
async fn test_cubbyhole_session_cannot_reuse_wrap_token() {
    let server = MockVaultServer::start().await;
    let wrap = request_wrapped_token(&settings(&server), &config()).await.unwrap();
    let client = VaultClient::new(server.uri(), &config()).unwrap();

    let first = SessionManager::start(
        Arc::new(CubbyholeAuthentication::new(client.clone(), wrap.wrap_token().clone())),
        client.clone(),
        config(),
    )
    .await;
    assert!(first.current_token().is_ok());

    let second = SessionManager::start(
        Arc::new(CubbyholeAuthentication::new(client.clone(), wrap.wrap_token().clone())),
        client,
        config(),
    )
    .await;
    match &*second.state() {
        SessionState::Unauthenticated { last_error: Some(failure) } => {
            assert_eq!(failure.kind, ErrorKind::Rejected);
        }
        other => panic!("unexpected state {other:?}"),
    }
}

#[tokio::test]
async fn test_current_token_expires_in_future() {
    let server = MockVaultServer::start().await;
    let manager = connected_manager(&server).await;

    let token = manager.current_token().unwrap();
    assert!(token.expires_at().unwrap() > Instant::now());
    assert_eq!(server.calls(Endpoint::Login), 1);
    assert_eq!(server.calls(Endpoint::Unwrap), 1);
}

#[tokio::test]
async fn test_renewal_extends_expiry() {
    let server = MockVaultServer::start().await;
    let manager = connected_manager(&server).await;
    let before = manager.current_token().unwrap().expires_at().unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let renewed = manager.renew().await.unwrap();

    assert!(renewed > before);
    assert_eq!(manager.current_token().unwrap().expires_at(), Some(renewed));
    assert_eq!(server.calls(Endpoint::RenewSelf), 1);
}

#[tokio::test]
async fn test_rejected_renewal_fails_session() {
    let server = MockVaultServer::builder()
        .renew_behavior(RenewBehavior::Reject)
        .start()
        .await;
    let manager = connected_manager(&server).await;
    let mut events = manager.subscribe();

    let err = manager.renew().await.unwrap_err();
    assert!(matches!(err, VaultError::AuthRejected(_)));
    assert!(manager.state().is_failed());
    assert!(matches!(next_renewal(&mut events).await, SessionEvent::RenewalFailed(_)));
    assert!(matches!(manager.current_token(), Err(VaultError::SessionFailed(_))));

    let calls = server.calls(Endpoint::RenewSelf);
    assert!(matches!(manager.renew().await, Err(VaultError::SessionFailed(_))));
    assert!(!manager.renew_token().await);
    assert_eq!(server.calls(Endpoint::RenewSelf), calls);
}

#[tokio::test]
async fn test_unavailable_renewal_is_deferred() {
    let server = MockVaultServer::builder()
        .renew_behavior(RenewBehavior::Unavailable)
        .start()
        .await;
    let manager = connected_manager(&server).await;

    let err = assert_err!(manager.renew().await);
    assert_eq!(err.kind(), ErrorKind::Unreachable);
    assert!(manager.state().is_authenticated());

    server.set_renew_behavior(RenewBehavior::Extend);
    assert!(manager.renew_token().await);
}

#[tokio::test]
async fn test_non_renewable_token_fails_session() {
    let server = MockVaultServer::builder().renewable(false).start().await;
    let manager = connected_manager(&server).await;

    let err = manager.renew().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert!(manager.state().is_failed());
    assert!(matches!(manager.current_token(), Err(VaultError::SessionFailed(_))));

    assert!(!manager.renew_token().await);
    assert_eq!(server.calls(Endpoint::RenewSelf), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_torn_token() {
    let server = MockVaultServer::builder()
        .renew_behavior(RenewBehavior::Rotate)
        .renew_delay(Duration::from_millis(2))
        .start()
        .await;
    let manager = connected_manager(&server).await;
    let initial = manager.current_token().unwrap().expose().to_string();

    let renewer = {
        let manager = manager.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                manager.renew().await.unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            let initial = initial.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    let token = manager.current_token().unwrap();
                    let rotation = token
                        .expose()
                        .strip_prefix(&initial)
                        .map(|rest| rest.trim_start_matches("-r"))
                        .filter(|rest| !rest.is_empty())
                        .map_or(0, |n| n.parse::<u64>().unwrap());
                    assert_eq!(token.lease(), Duration::from_secs(BASE_LEASE + rotation));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    renewer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(
        manager.current_token().unwrap().expose(),
        format!("{initial}-r20")
    );
}

#[tokio::test]
async fn test_concurrent_renewals_are_serialised() {
    let server = MockVaultServer::builder()
        .renew_behavior(RenewBehavior::Rotate)
        .renew_delay(Duration::from_millis(20))
        .start()
        .await;
    let manager = connected_manager(&server).await;

    let (a, b) = tokio::join!(manager.renew(), manager.renew());
    assert!(a.is_ok() && b.is_ok());
    // Each renewal presents the token the previous one issued.
    assert!(manager.current_token().unwrap().expose().ends_with("-r2"));
}

#[tokio::test]
async fn test_background_renewal_emits_renewed() {
    let server = MockVaultServer::builder()
        .lease(Duration::from_secs(2))
        .start()
        .await;
    let manager = VaultConnector::new(settings(&server), config().with_renewal_fraction(0.1))
        .session_manager()
        .unwrap();
    manager.bootstrap().await.unwrap();
    let mut events = manager.subscribe();

    let handle = manager.spawn_renewal();
    let event = tokio::time::timeout(Duration::from_secs(5), next_renewal(&mut events))
        .await
        .unwrap();
    assert!(matches!(event, SessionEvent::Renewed { rotated: false, .. }));
    assert!(server.calls(Endpoint::RenewSelf) >= 1);
    handle.cancel().await;
}

#[tokio::test]
async fn test_no_renewals_after_cancel() {
    let server = MockVaultServer::builder()
        .lease(Duration::from_secs(1))
        .start()
        .await;
    let manager = VaultConnector::new(settings(&server), config().with_renewal_fraction(0.1))
        .session_manager()
        .unwrap();
    manager.bootstrap().await.unwrap();
    let mut events = manager.subscribe();

    let handle = manager.spawn_renewal();
    tokio::time::timeout(Duration::from_secs(5), next_renewal(&mut events))
        .await
        .unwrap();
    handle.cancel().await;
    // A request abandoned by cancel may still land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls = server.calls(Endpoint::RenewSelf);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.calls(Endpoint::RenewSelf), calls);
}

#[tokio::test]
async fn test_connect_and_close_revokes() {
    let server = MockVaultServer::start().await;
    let session = VaultConnector::new(settings(&server), config())
        .connect()
        .await
        .unwrap();

    let token = session.token().unwrap();
    assert!(server.is_live(token.expose()));

    session.close().await.unwrap();
    assert!(!server.is_live(token.expose()));
    assert_eq!(server.calls(Endpoint::RevokeSelf), 1);
}

#[tokio::test]
async fn test_close_without_revoke_keeps_token() {
    let server = MockVaultServer::start().await;
    let session = VaultConnector::new(settings(&server), config().without_revoke_on_close())
        .connect()
        .await
        .unwrap();

    let token = session.token().unwrap();
    assert_ok!(session.close().await);
    assert!(server.is_live(token.expose()));
    assert_eq!(server.calls(Endpoint::RevokeSelf), 0);
}

#[tokio::test]
async fn test_revoke_returns_to_unauthenticated() {
    let server = MockVaultServer::start().await;
    let manager = connected_manager(&server).await;
    let mut events = manager.subscribe();

    assert_ok!(manager.revoke().await);
    assert!(matches!(manager.current_token(), Err(VaultError::NotAuthenticated)));
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Revoked));
}

#[tokio::test]
async fn test_pre_provisioned_token_uses_lookup_self() {
    let server = MockVaultServer::start().await;
    server.insert_token("hvs.provided", true);

    let session = VaultConnector::new(FeatureSettings::direct(server.uri(), "hvs.provided"), config())
        .connect()
        .await
        .unwrap();

    let token = session.token().unwrap();
    assert_eq!(token.expose(), "hvs.provided");
    assert_eq!(token.lease(), Duration::from_secs(BASE_LEASE));
    assert!(token.is_renewable());
    assert_eq!(server.calls(Endpoint::LookupSelf), 1);
    assert_eq!(server.calls(Endpoint::Login), 0);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_unknown_pre_provisioned_token_is_rejected() {
    let server = MockVaultServer::start().await;

    let err = VaultConnector::new(FeatureSettings::direct(server.uri(), "hvs.unknown"), config())
        .connect()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);
}

#[tokio::test]
async fn test_custom_approle_mount() {
    let server = MockVaultServer::builder()
        .approle_mount("ci-approle")
        .start()
        .await;
    let config = config().with_approle_mount("ci-approle");

    let wrap = request_wrapped_token(&settings(&server), &config).await.unwrap();
    assert_eq!(
        wrap.wrap_info().creation_path.as_deref(),
        Some("auth/ci-approle/login")
    );
}

#[tokio::test]
async fn test_renewal_sends_increment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/wrapping/unwrap"))
        .and(header("x-vault-token", "hvs.wrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_response("hvs.s", 600, true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .and(header("x-vault-token", "hvs.s"))
        .and(body_json(serde_json::json!({ "increment": "3600s" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_response("hvs.s", 3600, true)))
        .expect(1)
        .mount(&server)
        .await;

    let config = config().with_renewal_increment(Duration::from_secs(3600));
    let client = VaultClient::new(server.uri(), &config).unwrap();
    let manager = SessionManager::start(
        Arc::new(CubbyholeAuthentication::new(client.clone(), SecretString::from("hvs.wrap"))),
        client,
        config,
    )
    .await;

    assert_ok!(manager.renew().await);
    assert_eq!(
        manager.current_token().unwrap().lease(),
        Duration::from_secs(3600)
    );
}

#[tokio::test]
async fn test_oversized_lease_fails_bootstrap() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/wrapping/unwrap"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(auth_response("hvs.s", u64::MAX, true)),
        )
        .mount(&server)
        .await;

    let client = VaultClient::new(server.uri(), &config()).unwrap();
    let manager = SessionManager::new(
        Arc::new(CubbyholeAuthentication::new(client.clone(), SecretString::from("hvs.wrap"))),
        client,
        config(),
    );

    let err = assert_err!(manager.bootstrap().await);
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(matches!(manager.current_token(), Err(VaultError::NotAuthenticated)));
}

#[tokio::test]
async fn test_oversized_renewal_lease_fails_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/wrapping/unwrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_response("hvs.s", 2, true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(auth_response("hvs.s", u64::MAX, true)),
        )
        .mount(&server)
        .await;

    let config = config().with_renewal_fraction(0.1);
    let client = VaultClient::new(server.uri(), &config).unwrap();
    let manager = SessionManager::start(
        Arc::new(CubbyholeAuthentication::new(client.clone(), SecretString::from("hvs.wrap"))),
        client,
        config,
    )
    .await;
    let mut events = manager.subscribe();

    let handle = manager.spawn_renewal();
    let event = tokio::time::timeout(Duration::from_secs(5), next_renewal(&mut events))
        .await
        .unwrap();
    match event {
        SessionEvent::RenewalFailed(failure) => assert_eq!(failure.kind, ErrorKind::Protocol),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(manager.state().is_failed());
    tokio::time::timeout(Duration::from_secs(1), handle.cancel())
        .await
        .unwrap();
}
