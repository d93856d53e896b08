#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use herald_crypto::{SecretSealer, WebhookVerifier, random_hex};
use herald_server::auth::{
    AuthGate, AuthService, CredentialStore, IdentityError, IdentityProvider, TokenCodec,
};
use herald_server::eventsub::{DedupLedger, StreamLifecycleTracker, StreamSource, UpstreamError, UpstreamStream};
use herald_server::fanout::FanoutPublisher;
use herald_server::pipeline::EventPipeline;
use herald_server::server::{AppState, build_router};
use herald_server::storage::HeraldDatabase;

const WEBHOOK_SECRET: &str = "integration-secret";
const REFERER: &str = "https://herald.example/login";

struct FakeIdentity;

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<String, IdentityError> {
        code.strip_prefix("good-")
            .map(str::to_string)
            .ok_or_else(|| IdentityError::Rejected("bad code".to_string()))
    }

    async fn scopes_for(&self, _subject_id: &str) -> Result<Vec<String>, IdentityError> {
        Ok(vec!["login".to_string(), "admin".to_string()])
    }
}

struct OfflineSource;

#[async_trait]
impl StreamSource for OfflineSource {
    async fn current_stream(
        &self,
        _broadcaster_id: &str,
    ) -> Result<Option<UpstreamStream>, UpstreamError> {
        Ok(None)
    }
}

async fn app() -> axum::Router {
    let db = HeraldDatabase::open_in_memory().await.unwrap();
    let sealer = SecretSealer::from_hex_key(&random_hex(32)).unwrap();
    let store = CredentialStore::new(db.clone(), Arc::new(sealer));
    let codec = TokenCodec::new("herald", 600, 1_209_600, store);
    let gate = AuthGate::new(codec, Some("operator-secret".to_string()));
    let auth = Arc::new(AuthService::new(gate, Arc::new(FakeIdentity), 3_600));

    let tracker = StreamLifecycleTracker::new(
        db.clone(),
        300,
        Arc::new(OfflineSource),
        FanoutPublisher::default(),
    );
    let pipeline = EventPipeline::new(
        Arc::new(WebhookVerifier::new(WEBHOOK_SECRET)),
        DedupLedger::new(db),
        tracker,
    );

    build_router(AppState { pipeline, auth }, &[])
}

struct Reply {
    status: StatusCode,
    content_type: Option<String>,
    set_cookie: Option<String>,
    body: String,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Send a request to the app and collect the parts the tests look at.
async fn send_request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    for &(name, value) in headers {
        builder = builder.header(name, value);
    }
    let resp = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    };
    let status = resp.status();
    let content_type = header("content-type");
    let set_cookie = header("set-cookie");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    Reply {
        status,
        content_type,
        set_cookie,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

async fn send_webhook(app: &axum::Router, id: &str, message_type: &str, body: &str) -> Reply {
    let timestamp = "2024-05-01T12:00:00Z";
    let signature = WebhookVerifier::new(WEBHOOK_SECRET)
        .sign(id, timestamp, body.as_bytes())
        .unwrap();
    send_request(
        app,
        "POST",
        "/webhook",
        &[
            ("Twitch-Eventsub-Message-Id", id),
            ("Twitch-Eventsub-Message-Timestamp", timestamp),
            ("Twitch-Eventsub-Message-Signature", &signature),
            ("Twitch-Eventsub-Message-Type", message_type),
            ("Twitch-Eventsub-Message-Retry", "0"),
            ("content-type", "application/json"),
        ],
        body,
    )
    .await
}

/// `RefreshToken=<jwt>` from a `Set-Cookie` value.
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

async fn login(app: &axum::Router) -> (String, String) {
    let reply = send_request(
        app,
        "POST",
        "/auth/validate",
        &[("referer", REFERER), ("content-type", "application/json")],
        r#"{"code": "good-1001"}"#,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "body: {}", reply.body);
    let access = reply.json()["access"].as_str().unwrap().to_string();
    (access, cookie_pair(&reply.set_cookie.unwrap()))
}

#[tokio::test]
async fn health_is_ok() {
    let app = app().await;
    let reply = send_request(&app, "GET", "/health", &[], "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["status"], "ok");
}

#[tokio::test]
async fn webhook_challenge_is_echoed() {
    let app = app().await;
    let body = r#"{"challenge": "pogchamp-kappa", "subscription": {"id": "sub-1", "type": "stream.online"}}"#;

    let reply = send_webhook(&app, "m-1", "webhook_callback_verification", body).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.content_type.unwrap().starts_with("text/plain"));
    assert_eq!(reply.body, "pogchamp-kappa");
}

#[tokio::test]
async fn webhook_with_bad_signature_is_forbidden() {
    let app = app().await;
    let reply = send_request(
        &app,
        "POST",
        "/webhook",
        &[
            ("Twitch-Eventsub-Message-Id", "m-1"),
            ("Twitch-Eventsub-Message-Timestamp", "2024-05-01T12:00:00Z"),
            ("Twitch-Eventsub-Message-Signature", "sha256=00"),
            ("Twitch-Eventsub-Message-Type", "notification"),
        ],
        r#"{"subscription": {"type": "stream.online"}}"#,
    )
    .await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body, "Authentication failed.");
}

#[tokio::test]
async fn webhook_notification_is_accepted() {
    let app = app().await;
    let body = r#"{
        "subscription": {"id": "sub-1", "status": "enabled", "type": "stream.online", "version": "1"},
        "event": {"id": "9001", "broadcaster_user_id": "1337", "broadcaster_user_login": "cool_user",
                  "broadcaster_user_name": "Cool_User", "type": "live", "started_at": "2024-05-01T12:00:00Z"}
    }"#;

    let reply = send_webhook(&app, "m-1", "notification", body).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(reply.body.is_empty());

    let again = send_webhook(&app, "m-1", "notification", body).await;
    assert_eq!(again.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn webhook_with_unknown_type_is_bad_request() {
    let app = app().await;
    let reply = send_webhook(&app, "m-1", "surprise", r#"{"subscription": {}}"#).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_requires_referer_and_valid_code() {
    let app = app().await;
    let json = [("content-type", "application/json")];

    let reply = send_request(&app, "POST", "/auth/validate", &json, r#"{"code": "good-1"}"#).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = send_request(
        &app,
        "POST",
        "/auth/validate",
        &[("referer", REFERER), ("content-type", "application/json")],
        r#"{"code": "stolen"}"#,
    )
    .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_refresh_logout_flow() {
    let app = app().await;
    let (access, cookie) = login(&app).await;
    assert!(cookie.starts_with("RefreshToken="));

    let bearer = format!("Bearer {access}");
    let me = send_request(&app, "GET", "/auth/self", &[("authorization", &bearer)], "").await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json()["subject_id"], "1001");
    assert_eq!(me.json()["audience"], "access");

    let refreshed = send_request(&app, "POST", "/auth/refresh", &[("cookie", &cookie)], "").await;
    assert_eq!(refreshed.status, StatusCode::OK);
    let new_cookie = cookie_pair(&refreshed.set_cookie.clone().unwrap());
    assert_ne!(new_cookie, cookie);

    let stale = send_request(&app, "POST", "/auth/refresh", &[("cookie", &cookie)], "").await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);

    let touch = send_request(&app, "GET", "/auth/touch", &[("authorization", &bearer)], "").await;
    assert_eq!(touch.status, StatusCode::OK);
    assert_eq!(touch.json()["status"], "ok");

    let logout = send_request(&app, "POST", "/auth/logout", &[("cookie", &new_cookie)], "").await;
    assert_eq!(logout.status, StatusCode::OK);
    let cleared = logout.set_cookie.unwrap();
    assert!(cleared.starts_with("RefreshToken=REVOKED"));
    assert!(cleared.contains("Max-Age=0"));

    let touch = send_request(&app, "GET", "/auth/touch", &[("authorization", &bearer)], "").await;
    assert_eq!(touch.status, StatusCode::UNAUTHORIZED);
    assert_eq!(touch.json()["status"], "logged out");

    let again = send_request(&app, "POST", "/auth/refresh", &[("cookie", &new_cookie)], "").await;
    assert_eq!(again.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn touch_without_token_reports_expired() {
    let app = app().await;
    let reply = send_request(&app, "GET", "/auth/touch", &[], "").await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json()["status"], "expired");
}

#[tokio::test]
async fn static_token_lifecycle() {
    let app = app().await;
    let (access, _) = login(&app).await;
    let bearer = format!("Bearer {access}");

    let issued = send_request(
        &app,
        "POST",
        "/admin/token",
        &[("authorization", &bearer), ("content-type", "application/json")],
        r#"{"scopes": ["admin:stream", "root"], "purpose": "scheduler"}"#,
    )
    .await;
    assert_eq!(issued.status, StatusCode::CREATED, "body: {}", issued.body);
    let issued = issued.json();
    assert_eq!(issued["scopes"], serde_json::json!(["admin:stream"]));
    let token_id = issued["id"].as_str().unwrap().to_string();
    let static_bearer = format!("Bearer {}", issued["token"].as_str().unwrap());

    let me = send_request(&app, "GET", "/auth/self", &[("authorization", &static_bearer)], "").await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json()["audience"], "static");

    let escalate = send_request(
        &app,
        "POST",
        "/admin/token",
        &[("authorization", &static_bearer), ("content-type", "application/json")],
        r#"{"scopes": ["admin:stream"]}"#,
    )
    .await;
    assert_eq!(escalate.status, StatusCode::UNAUTHORIZED);

    let uri = format!("/admin/token/{token_id}");
    let revoked = send_request(&app, "DELETE", &uri, &[("authorization", &bearer)], "").await;
    assert_eq!(revoked.status, StatusCode::NO_CONTENT);

    let me = send_request(&app, "GET", "/auth/self", &[("authorization", &static_bearer)], "").await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);

    let missing = send_request(
        &app,
        "DELETE",
        "/admin/token/does-not-exist",
        &[("authorization", &bearer)],
        "",
    )
    .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn operator_bearer_is_limited_to_standard_endpoints() {
    let app = app().await;
    let operator = [("authorization", "Bearer operator-secret")];

    let me = send_request(&app, "GET", "/auth/self", &operator, "").await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json()["audience"], "operator");

    let issued = send_request(
        &app,
        "POST",
        "/admin/token",
        &[
            ("authorization", "Bearer operator-secret"),
            ("content-type", "application/json"),
        ],
        r#"{"scopes": ["login"]}"#,
    )
    .await;
    assert_eq!(issued.status, StatusCode::UNAUTHORIZED);
}
