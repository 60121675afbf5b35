use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use im_credentials::exchange::{AUTHENTICATED_TOKEN_PATH, UNAUTHENTICATED_TOKEN_PATH};
use im_credentials::issuer::issue_unauthenticated;
use im_credentials::{
    AssertionBuilder, AssertionReport, HttpTokenExchange, JwtAssertion, SessionState, SigningKey,
    TokenExchange, TokenIssuer, TokenLookup,
};
use im_domain::config::{Config, KeyFormat};
use im_domain::{AccessToken, Error, Result};

fn config(base_url: &str) -> Config {
    let mut cfg = Config::default();
    cfg.service.base_url = base_url.to_string();
    cfg.service.org_id = "00D000000000001".into();
    cfg.service.es_developer_name = "Web_Chat".into();
    cfg.credentials.key_path = format!(
        "{}/tests/fixtures/rsa_private.jwk.json",
        env!("CARGO_MANIFEST_DIR")
    );
    cfg.credentials.key_format = KeyFormat::Jwk;
    cfg
}

fn expired_body() -> serde_json::Value {
    json!({ "error": "invalid_grant", "error_description": "JWT expired" })
}

fn token_body(token: &str) -> serde_json::Value {
    json!({ "accessToken": token, "lastEventId": "0", "expires_in": 3600 })
}

/// Clock that advances five seconds per reading.
fn ticking_clock() -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
    let start = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap().timestamp();
    let ticks = AtomicI64::new(0);
    move || {
        let n = ticks.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(start + n * 5, 0).unwrap()
    }
}

fn sent_assertions(requests: &[wiremock::Request]) -> Vec<String> {
    requests
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["customerIdentityToken"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn expired_rejection_is_retried_once_with_fresh_assertion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTHENTICATED_TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(expired_body()))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(AUTHENTICATED_TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("second-try")))
        .with_priority(2)
        .mount(&server)
        .await;

    let session = Arc::new(SessionState::new(30));
    let issuer = TokenIssuer::from_config(&config(&server.uri()), session.clone())
        .unwrap()
        .with_clock(ticking_clock());

    let token = issuer.refresh().await.unwrap();
    assert_eq!(token.token, "second-try");
    assert_eq!(session.current_token().unwrap().token, "second-try");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let assertions = sent_assertions(&requests);
    assert_ne!(assertions[0], assertions[1]);
    let first = AssertionReport::inspect(&assertions[0], Utc::now()).unwrap();
    let second = AssertionReport::inspect(&assertions[1], Utc::now()).unwrap();
    assert!(second.claims.iat > first.claims.iat);
}

#[tokio::test]
async fn second_expired_rejection_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTHENTICATED_TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(expired_body()))
        .expect(2)
        .mount(&server)
        .await;

    let session = Arc::new(SessionState::new(30));
    let issuer = TokenIssuer::from_config(&config(&server.uri()), session.clone()).unwrap();

    let err = issuer.refresh().await.unwrap_err();
    assert!(matches!(err, Error::TokenExpired(_)), "{err}");
    assert!(session.current_token().is_none());
}

#[tokio::test]
async fn key_mismatch_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTHENTICATED_TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "signature verification failed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let issuer = TokenIssuer::from_config(&config(&server.uri()), Arc::new(SessionState::new(30)))
        .unwrap();
    let err = issuer.refresh().await.unwrap_err();
    assert!(matches!(err, Error::KeyMismatch(_)), "{err}");
}

#[tokio::test]
async fn remote_error_is_surfaced_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTHENTICATED_TOKEN_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let issuer = TokenIssuer::from_config(&config(&server.uri()), Arc::new(SessionState::new(30)))
        .unwrap();
    match issuer.valid_token().await.unwrap_err() {
        Error::Remote { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_callers_share_one_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTHENTICATED_TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("shared"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let issuer = Arc::new(
        TokenIssuer::from_config(&config(&server.uri()), Arc::new(SessionState::new(30))).unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let issuer = issuer.clone();
        handles.push(tokio::spawn(async move { issuer.valid_token().await }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap().unwrap().token, "shared");
    }
}

#[tokio::test]
async fn missing_key_aborts_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("never")))
        .expect(0)
        .mount(&server)
        .await;

    let mut cfg = config(&server.uri());
    cfg.credentials.key_path = "/nonexistent/key.pem".into();
    let err = TokenIssuer::from_config(&cfg, Arc::new(SessionState::new(30))).unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { .. }));
}

// ── In-process exchange ─────────────────────────────────────────────

struct CountingExchange {
    calls: AtomicU32,
}

impl CountingExchange {
    fn next(&self, prefix: &str, last_event_id: Option<&str>) -> AccessToken {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        AccessToken {
            token: format!("{prefix}-{n}"),
            last_event_id: last_event_id.map(String::from),
            expires_at: Utc::now() + chrono::Duration::seconds(3600),
        }
    }
}

#[async_trait]
impl TokenExchange for CountingExchange {
    async fn exchange(&self, _assertion: &JwtAssertion) -> Result<AccessToken> {
        Ok(self.next("tok", None))
    }

    async fn exchange_unauthenticated(&self) -> Result<AccessToken> {
        Ok(self.next("guest", Some("0")))
    }
}

/// Exchange that only knows the assertion flow.
struct AssertionOnlyExchange;

#[async_trait]
impl TokenExchange for AssertionOnlyExchange {
    async fn exchange(&self, _assertion: &JwtAssertion) -> Result<AccessToken> {
        Err(Error::Config("unused".into()))
    }
}

fn in_process_issuer() -> (TokenIssuer, Arc<CountingExchange>, Arc<SessionState>) {
    let json = std::fs::read_to_string(format!(
        "{}/tests/fixtures/rsa_private.jwk.json",
        env!("CARGO_MANIFEST_DIR")
    ))
    .unwrap();
    let key = SigningKey::from_jwk_str(&json, None).unwrap();
    let builder = AssertionBuilder::new(key.kid(), "user123", "https://scrt.example.com");
    let exchange = Arc::new(CountingExchange {
        calls: AtomicU32::new(0),
    });
    let session = Arc::new(SessionState::new(30));
    let issuer = TokenIssuer::new(key, builder, exchange.clone(), session.clone());
    (issuer, exchange, session)
}

#[tokio::test]
async fn cached_token_is_reused() {
    let (issuer, exchange, _session) = in_process_issuer();
    let a = issuer.valid_token().await.unwrap();
    let b = issuer.valid_token().await.unwrap();
    assert_eq!(a, b);
    assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_token_triggers_refresh() {
    let (issuer, exchange, session) = in_process_issuer();
    session.store_token(AccessToken {
        token: "stale".into(),
        last_event_id: None,
        expires_at: Utc::now() + chrono::Duration::seconds(10),
    });
    assert_eq!(session.get_valid_token(Utc::now()), TokenLookup::NeedsRefresh);

    let token = issuer.valid_token().await.unwrap();
    assert_eq!(token.token, "tok-1");
    assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn forced_refresh_always_exchanges() {
    let (issuer, exchange, _session) = in_process_issuer();
    issuer.valid_token().await.unwrap();
    let token = issuer.refresh().await.unwrap();
    assert_eq!(token.token, "tok-2");
    assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn issue_ignores_a_valid_cache() {
    let (issuer, exchange, session) = in_process_issuer();
    issuer.valid_token().await.unwrap();
    let fresh = issuer.issue().await.unwrap();
    assert_eq!(fresh.token, "tok-2");
    assert_eq!(session.current_token(), Some(fresh));
    assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn guest_token_becomes_the_session_token() {
    let (issuer, exchange, session) = in_process_issuer();
    let guest = issuer.issue_unauthenticated().await.unwrap();
    assert_eq!(guest.token, "guest-1");
    assert_eq!(session.current_token(), Some(guest.clone()));
    assert_eq!(session.last_event_id().as_deref(), Some("0"));

    // Served from the session cache afterwards.
    assert_eq!(issuer.valid_token().await.unwrap(), guest);
    assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn guest_flow_needs_no_signing_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UNAUTHENTICATED_TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "guest",
            "lastEventId": "12",
            "expires_in": 600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = config(&server.uri());
    cfg.credentials.key_path = "/nonexistent/key.pem".into();
    let exchange = HttpTokenExchange::from_config(&cfg).unwrap();
    let session = SessionState::new(30);

    let token = issue_unauthenticated(&exchange, &session).await.unwrap();
    assert_eq!(token.token, "guest");
    assert_eq!(session.get_valid_token(Utc::now()), TokenLookup::Valid(token));
    assert_eq!(session.last_event_id().as_deref(), Some("12"));
}

#[tokio::test]
async fn exchange_without_guest_flow_leaves_session_untouched() {
    let session = SessionState::new(30);
    let err = issue_unauthenticated(&AssertionOnlyExchange, &session)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(session.current_token().is_none());
}
