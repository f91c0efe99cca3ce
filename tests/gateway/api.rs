use std::sync::Arc;
use std::time::Duration;

use authn::api::{build_router, ApiState, HealthFlag};
use authn::kubeconfig::MemoryAuthInfoStore;
use authn::observability::MetricsRecorder;
use authn::resolvers::{LdapConfigSpec, MemoryResolver, SecretKeySelector, UserSpec};
use authn::session::SessionIssuer;
use authn::strategies::{StrategyContext, StrategyRegistry};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::support::{generator, ldap_entry, FakeCsrSigner, FakeDirectory, SERVER_URL, SERVICE_DN};

const SESSION_KEY: &[u8] = b"session-signing-key";

struct TestApp {
    router: Router,
    health: HealthFlag,
}

fn app() -> TestApp {
    let resolver = Arc::new(
        MemoryResolver::new("krateo-system")
            .with_user(
                "alice",
                UserSpec {
                    password_ref: Some(SecretKeySelector {
                        name: "alice-password".into(),
                        namespace: String::new(),
                        key: "password".into(),
                    }),
                    display_name: "Alice".into(),
                    groups: vec!["devs".into()],
                    ..Default::default()
                },
            )
            .with_ldap(
                "forumsys",
                LdapConfigSpec {
                    dial_url: "ldap://ldap.test:389".into(),
                    bind_dn: Some(SERVICE_DN.into()),
                    base_dn: "dc=example,dc=com".into(),
                    ..Default::default()
                },
            )
            .with_secret("", "alice-password", "password", "s3cret"),
    );

    let session = SessionIssuer::new(SESSION_KEY, Duration::from_secs(3600));
    let rest_actions =
        Arc::new(authn::resolvers::SnowplowResolver::new("http://snowplow.invalid", "authn", Some(session.clone())));
    let context = StrategyContext::new(resolver.clone(), resolver, rest_actions);

    let directory = Arc::new(FakeDirectory::new(
        vec![ldap_entry("euler", "Leonhard Euler", &[]), ldap_entry("euler", "Leonhard Euler (copy)", &[])],
        "password",
    ));
    let registry = StrategyRegistry::new(&context, directory);

    let signer = Arc::new(FakeCsrSigner::new());
    let store = Arc::new(MemoryAuthInfoStore::new());
    let health = HealthFlag::new(true);

    let state = ApiState {
        registry,
        context,
        generator: Arc::new(generator(signer, store)),
        session: Some(session),
        health: health.clone(),
        metrics: MetricsRecorder::new(),
        service_name: "authn".to_string(),
    };

    TestApp { router: build_router(state, true), health }
}

fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn basic_login_with_wrong_password_is_forbidden() {
    let app = app();
    let request = get("/basic/login").header(header::AUTHORIZATION, basic_auth("alice", "wrong")).body(Body::empty()).unwrap();

    let (status, _, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_body(&body), json!({"code": 403, "error": "invalid credentials"}));
}

#[tokio::test]
async fn basic_login_without_credentials_is_challenged() {
    let app = app();

    let (status, headers, _) = send(&app.router, get("/basic/login").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::WWW_AUTHENTICATE], r#"Basic realm="krateo", charset="UTF-8""#);
}

#[tokio::test]
async fn basic_login_returns_envelope_with_kubeconfig_and_token() {
    let app = app();
    let request = get("/basic/login").header(header::AUTHORIZATION, basic_auth("alice", "s3cret")).body(Body::empty()).unwrap();

    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let body = json_body(&body);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["displayName"], "Alice");
    assert_eq!(body["groups"], json!(["devs"]));
    assert_eq!(body["data"]["kind"], "Config");
    assert_eq!(body["data"]["clusters"][0]["cluster"]["server"], SERVER_URL);

    let token = body["accessToken"].as_str().unwrap();
    let claims = SessionIssuer::new(SESSION_KEY, Duration::from_secs(3600)).verify(token).unwrap();
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.groups, vec!["devs"]);
}

#[tokio::test]
async fn basic_login_download_sends_attachment() {
    let app = app();
    let request =
        get("/basic/login?d").header(header::AUTHORIZATION, basic_auth("alice", "s3cret")).body(Body::empty()).unwrap();

    let (status, headers, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_DISPOSITION], "attachment; filename=alice.json");
    assert_eq!(json_body(&body)["current-context"], "krateo");
}

#[tokio::test]
async fn ldap_login_with_ambiguous_match_is_multiple_choices() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/ldap/login?name=forumsys")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"username":"euler","password":"password"}"#))
        .unwrap();

    let (status, _, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::MULTIPLE_CHOICES);
    assert_eq!(json_body(&body)["code"], 300);
}

#[tokio::test]
async fn code_logins_require_name_and_code() {
    let app = app();

    let (status, _, _) =
        send(&app.router, get("/oidc/login").header("X-Auth-Code", "abc").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = send(&app.router, get("/github/login?name=github").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "missing authorization code");
}

#[tokio::test]
async fn info_returns_stored_auth_info() {
    let app = app();
    let login = get("/basic/login").header(header::AUTHORIZATION, basic_auth("alice", "s3cret")).body(Body::empty()).unwrap();
    let (status, _, _) = send(&app.router, login).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&app.router, get("/info?name=alice").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let body = json_body(&body);
    assert_eq!(body["data"]["server"], SERVER_URL);
    assert!(body["data"]["client-certificate-data"].as_str().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn info_errors() {
    let app = app();

    let (status, _, _) = send(&app.router, get("/info").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app.router, get("/info?name=nobody").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_follows_the_serving_flag() {
    let app = app();

    let (status, _, body) = send(&app.router, get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["name"], "authn");

    app.health.set(false);
    let (status, _, _) = send(&app.router, get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn strategies_lists_configured_kinds() {
    let app = app();

    let (status, _, body) = send(&app.router, get("/strategies").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let entries = json_body(&body);
    let kinds: Vec<&str> = entries.as_array().unwrap().iter().map(|e| e["kind"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["basic", "ldap"]);
    assert_eq!(entries[1]["name"], "forumsys");
    assert_eq!(entries[1]["path"], "/ldap/login");
}

#[tokio::test]
async fn cors_preflight_allows_auth_code_header() {
    let app = app();
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/oidc/login")
        .header(header::ORIGIN, "https://krateo.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-auth-code")
        .body(Body::empty())
        .unwrap();

    let (_, headers, _) = send(&app.router, request).await;

    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS].to_str().unwrap().contains("x-auth-code"));
}
