use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use msafiri_session::{
    Credential, CredentialStore, HttpSessionProbe, HttpTokenEndpoint, LocalSession, ProbeOutcome,
    RenewalExecutor, SessionError, SessionEvent, SessionFramework, SessionProbe, SessionUser,
    SystemClock,
};

fn user(access_token: &str) -> SessionUser {
    SessionUser {
        id: "7".to_string(),
        email: "coordinator@msf.org".to_string(),
        name: Some("Field Coordinator".to_string()),
        role: Some("MT_ADMIN".to_string()),
        tenant_id: Some("msf-oca".to_string()),
        access_token: access_token.to_string(),
        first_login: false,
        must_change_password: false,
    }
}

fn expiring_token(seconds: i64) -> String {
    let claims = json!({
        "sub": "coordinator@msf.org",
        "exp": chrono::Utc::now().timestamp() + seconds,
    });
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap()
}

struct Harness {
    store: CredentialStore,
    framework: Arc<LocalSession>,
    events: broadcast::Receiver<SessionEvent>,
    executor: Arc<RenewalExecutor>,
}

fn harness(server: &MockServer, token: &str, timeout: Option<Duration>) -> Harness {
    let store = CredentialStore::new();
    store.set(Credential::new(token));
    let framework = Arc::new(LocalSession::authenticated(LocalSession::session_for(user(
        token,
    ))));
    let (sender, events) = broadcast::channel(16);

    let executor = Arc::new(RenewalExecutor::new(
        Arc::new(HttpTokenEndpoint::new(&server.uri(), Client::new())),
        store.clone(),
        framework.clone(),
        sender,
        Arc::new(SystemClock),
        timeout,
        Duration::from_secs(300),
    ));

    Harness {
        store,
        framework,
        events,
        executor,
    }
}

#[test]
fn test_endpoint_url() {
    let endpoint = HttpTokenEndpoint::new("http://localhost:8000/api/v1/", Client::new());
    assert_eq!(endpoint.url(), "http://localhost:8000/api/v1/auth/refresh");
}

#[tokio::test]
async fn test_renewal_replaces_credential_everywhere() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(header("Authorization", "Bearer old-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-token",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut h = harness(&mock_server, "old-token", Some(Duration::from_secs(5)));
    let current = h.store.get().unwrap();

    let renewed = h.executor.renew(&current).await.unwrap();
    assert_eq!(renewed.value(), "new-token");

    // the networking layer reads the new credential on its next request
    assert_eq!(h.store.token().as_deref(), Some("new-token"));
    assert_eq!(
        h.framework.get_session().unwrap().user.access_token,
        "new-token"
    );
    assert_eq!(h.framework.update_calls(), 1);
    assert_eq!(h.events.try_recv().unwrap(), SessionEvent::Renewed);
}

#[tokio::test]
async fn test_rejected_renewal_keeps_current_credential() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let mut h = harness(&mock_server, "old-token", Some(Duration::from_secs(5)));
    let current = h.store.get().unwrap();

    let result = h.executor.renew(&current).await;
    match result {
        Err(SessionError::RenewalRejected { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "Internal Server Error");
        }
        other => panic!("Expected RenewalRejected, got {:?}", other),
    }

    assert_eq!(h.store.token().as_deref(), Some("old-token"));
    assert!(h.framework.sign_out_calls().is_empty());
    assert_eq!(h.framework.update_calls(), 0);
    assert!(h.framework.status().borrow().is_authenticated());

    assert!(matches!(
        h.events.try_recv().unwrap(),
        SessionEvent::RenewalFailed { .. }
    ));
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn test_malformed_body_is_a_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&mock_server)
        .await;

    let h = harness(&mock_server, "old-token", None);
    let current = h.store.get().unwrap();

    let result = h.executor.renew(&current).await;
    assert!(matches!(result, Err(SessionError::SerializationError(_))));
    assert_eq!(h.store.token().as_deref(), Some("old-token"));
}

#[tokio::test]
async fn test_empty_access_token_is_a_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "" })))
        .mount(&mock_server)
        .await;

    let h = harness(&mock_server, "old-token", None);
    let current = h.store.get().unwrap();

    let result = h.executor.renew(&current).await;
    assert!(matches!(result, Err(SessionError::MalformedResponse(_))));
    assert_eq!(h.store.token().as_deref(), Some("old-token"));
}

#[tokio::test]
async fn test_slow_renewal_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "late-token" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let h = harness(&mock_server, "old-token", Some(Duration::from_millis(100)));
    let current = h.store.get().unwrap();

    let result = h.executor.renew(&current).await;
    assert!(matches!(result, Err(SessionError::Timeout(_))));
    assert_eq!(h.store.token().as_deref(), Some("old-token"));
}

#[tokio::test]
async fn test_concurrent_renewals_share_one_exchange() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "new-token" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(&mock_server, "old-token", Some(Duration::from_secs(5)));
    let current = h.store.get().unwrap();

    let (first, second) = tokio::join!(h.executor.renew(&current), h.executor.renew(&current));
    assert_eq!(first.unwrap().value(), "new-token");
    assert_eq!(second.unwrap().value(), "new-token");
    assert_eq!(h.framework.update_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_failed_renewals_share_one_exchange() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string("Internal Server Error")
                .set_delay(Duration::from_millis(50)),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut h = harness(&mock_server, "old-token", Some(Duration::from_secs(5)));
    let current = h.store.get().unwrap();

    let (first, second, third) = tokio::join!(
        h.executor.renew(&current),
        h.executor.renew(&current),
        h.executor.renew(&current)
    );
    let results = [first, second, third];
    assert!(results.iter().all(Result::is_err));
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(SessionError::RenewalRejected { status: 500, .. })))
        .count();
    let joined = results
        .iter()
        .filter(|r| matches!(r, Err(SessionError::RenewalFailed(_))))
        .count();
    assert_eq!(rejected, 1);
    assert_eq!(joined, 2);

    assert_eq!(h.store.token().as_deref(), Some("old-token"));
    assert_eq!(h.framework.update_calls(), 0);

    let mut failures = 0;
    while let Ok(event) = h.events.try_recv() {
        if matches!(event, SessionEvent::RenewalFailed { .. }) {
            failures += 1;
        }
    }
    assert_eq!(failures, 1);

    // a later attempt exchanges again instead of reusing the old failure
    let retry = h.executor.renew(&current).await;
    assert!(matches!(retry, Err(SessionError::RenewalRejected { .. })));
}

#[tokio::test]
async fn test_renewal_without_credential() {
    let mock_server = MockServer::start().await;
    let h = harness(&mock_server, "old-token", None);
    let current = h.store.get().unwrap();
    h.store.clear();

    let result = h.executor.renew(&current).await;
    assert!(matches!(result, Err(SessionError::MissingCredential)));
}

#[tokio::test]
async fn test_valid_token_renews_inside_warning_window() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "new-token" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(&mock_server, &expiring_token(60), None);
    assert_eq!(h.executor.valid_token().await.as_deref(), Some("new-token"));
}

#[tokio::test]
async fn test_valid_token_skips_renewal_for_fresh_credential() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "new-token" })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let token = expiring_token(4 * 3600);
    let h = harness(&mock_server, &token, None);
    assert_eq!(h.executor.valid_token().await, Some(token));
}

#[tokio::test]
async fn test_valid_token_falls_back_when_renewal_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let token = expiring_token(60);
    let h = harness(&mock_server, &token, None);
    assert_eq!(h.executor.valid_token().await, Some(token));
}

#[tokio::test]
async fn test_credential_check_outcomes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("Authorization", "Bearer good-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7 })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("Authorization", "Bearer revoked-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Could not validate credentials"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/me"))
        .and(header("Authorization", "Bearer flaky-token"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let probe = HttpSessionProbe::new(&mock_server.uri(), Client::new());

    assert_eq!(
        probe.probe(&Credential::new("good-token")).await,
        ProbeOutcome::Valid
    );
    assert_eq!(
        probe.probe(&Credential::new("revoked-token")).await,
        ProbeOutcome::Rejected
    );
    assert!(matches!(
        probe.probe(&Credential::new("flaky-token")).await,
        ProbeOutcome::Unreachable(_)
    ));
}

#[tokio::test]
async fn test_credential_check_unreachable_backend() {
    let probe = HttpSessionProbe::new("http://127.0.0.1:9", Client::new());
    assert!(matches!(
        probe.probe(&Credential::new("any-token")).await,
        ProbeOutcome::Unreachable(_)
    ));
}
