use std::sync::Arc;
use std::time::Duration;

use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use flowcheck_driver::browser::{ScriptedLauncher, ScriptedSite};
use flowcheck_driver::config::Credentials;
use flowcheck_driver::health::wait_until_ready;
use flowcheck_driver::http::ApiClient;
use flowcheck_driver::scenario::{LoginSpec, RequestSpec};
use flowcheck_driver::{
    EvidenceStore, FailureKind, Scenario, SessionConfig, Step, StepStatus, UiVerificationDriver,
};

const TOKEN: &str = "tok-customer";

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["email"] == "customer@example.com" && body["password"] == "customer123" {
        (
            StatusCode::OK,
            Json(json!({
                "accessToken": TOKEN,
                "refreshToken": "refresh",
                "user": { "id": 2, "email": "customer@example.com", "role": "customer" }
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid email or password" })),
        )
    }
}

async fn products() -> Json<Value> {
    Json(json!({ "products": [{ "id": 1 }, { "id": 2 }, { "id": 3 }], "total": 3 }))
}

async fn add_to_cart(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let bearer = format!("Bearer {}", TOKEN);
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) if value == bearer => (
            StatusCode::CREATED,
            Json(json!({ "items": [{ "productId": 1, "quantity": 2 }] })),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Access token required" })),
        ),
    }
}

/// Serve a stub shop API on an ephemeral port
async fn spawn_api() -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/products", get(products))
        .route("/api/cart", post(add_to_cart));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn session(api: &str) -> SessionConfig {
    SessionConfig {
        base_url: "http://shop.test".to_string(),
        api_url: Some(api.to_string()),
        credentials: Some(Credentials {
            email: "customer@example.com".into(),
            password: "customer123".into(),
        }),
        ..SessionConfig::default()
    }
}

fn request(method: &str, path: &str) -> RequestSpec {
    RequestSpec {
        method: method.to_string(),
        path: path.to_string(),
        body: None,
        status: None,
        count: None,
        items: None,
        auth: false,
    }
}

fn api_driver(launcher: &Arc<ScriptedLauncher>, dir: &std::path::Path) -> UiVerificationDriver {
    UiVerificationDriver::new(launcher.clone(), EvidenceStore::new(dir))
}

#[tokio::test]
async fn login_then_authenticated_request() {
    let api = spawn_api().await;
    wait_until_ready(&api, Duration::from_secs(5)).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(ScriptedSite::new("http://shop.test")));

    let add = RequestSpec {
        body: Some(json!({ "productId": 1, "quantity": 2 })),
        status: Some(201),
        count: Some(">=1".parse().unwrap()),
        auth: true,
        ..request("POST", "/api/cart")
    };
    let scenario = Scenario::new(
        "api-cart",
        vec![
            Step::login(LoginSpec::default()),
            Step::request(&RequestSpec {
                count: Some("==3".parse().unwrap()),
                ..request("GET", "/api/products")
            }),
            Step::request(&add),
            Step::request(&RequestSpec {
                count: Some("==3".parse().unwrap()),
                items: Some("products".into()),
                ..request("GET", "/api/products")
            }),
        ],
    );

    let report = api_driver(&launcher, dir.path()).run(&scenario, &session(&api)).await.unwrap();

    assert!(report.passed(), "{:?}", report.first_failure());
    assert_eq!(report.steps[0].message, "logged in as customer@example.com");
    assert_eq!(report.steps[2].message, "POST /api/cart -> 201 (1 items)");
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn rejected_login_is_critical() {
    let api = spawn_api().await;
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(ScriptedSite::new("http://shop.test")));
    let scenario = Scenario::new(
        "bad-password",
        vec![
            Step::login(LoginSpec {
                email: None,
                password: Some("wrong".into()),
            }),
            Step::request(&request("GET", "/api/products")),
        ],
    );

    let report = api_driver(&launcher, dir.path()).run(&scenario, &session(&api)).await.unwrap();

    assert_eq!(report.steps[0].failure, Some(FailureKind::NetworkError));
    assert!(report.steps[0].message.contains("Invalid email or password"));
    assert_eq!(report.steps[1].status, StepStatus::Skipped);
}

#[tokio::test]
async fn request_expectations_are_assertions() {
    let api = spawn_api().await;
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(ScriptedSite::new("http://shop.test")));
    let scenario = Scenario::new(
        "api-expectations",
        vec![
            Step::request(&RequestSpec {
                status: Some(201),
                ..request("GET", "/api/products")
            }),
            Step::request(&RequestSpec {
                count: Some("==5".parse().unwrap()),
                ..request("GET", "/api/products")
            }),
            Step::request(&request("POST", "/api/cart")),
            Step::request(&RequestSpec {
                auth: true,
                ..request("POST", "/api/cart")
            }),
            Step::request(&RequestSpec {
                status: Some(401),
                ..request("POST", "/api/cart")
            }),
        ],
    );

    let report = api_driver(&launcher, dir.path()).run(&scenario, &session(&api)).await.unwrap();

    let failures: Vec<_> = report.steps.iter().map(|s| s.failure).collect();
    assert_eq!(
        failures,
        vec![
            Some(FailureKind::AssertionFailure),
            Some(FailureKind::AssertionFailure),
            Some(FailureKind::NetworkError),
            Some(FailureKind::NetworkError),
            None,
        ]
    );
    assert_eq!(report.counts().failed, 4);
}

#[tokio::test]
async fn unreachable_api_is_a_network_error() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(ScriptedSite::new("http://shop.test")));
    let scenario = Scenario::new(
        "api-down",
        vec![Step::request(&request("GET", "/api/products")).with_timeout_ms(1000)],
    );

    let report = api_driver(&launcher, dir.path())
        .run(&scenario, &session("http://127.0.0.1:9"))
        .await
        .unwrap();

    assert_eq!(report.steps[0].failure, Some(FailureKind::NetworkError));
}

#[tokio::test]
async fn client_keeps_token_after_login() {
    let api = spawn_api().await;
    let mut client = ApiClient::new(api).unwrap();
    assert!(client.token().is_none());

    let creds = Credentials {
        email: "customer@example.com".into(),
        password: "customer123".into(),
    };
    client.login(&creds, Duration::from_secs(2)).await.unwrap();
    assert_eq!(client.token(), Some(TOKEN));

    let response = client
        .send("POST", "/api/cart", None, true, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(response.status, 201);
}
