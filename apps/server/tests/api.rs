use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;
use tufe_server::{api::app_router, build_providers, build_state_with, config::Config};

/// Router over a fresh database. The mirror points at a closed local port so
/// every fetch fails fast without leaving the machine.
async fn build_test_router() -> (Router, TempDir) {
    let tmp = tempdir().unwrap();
    let config = Config {
        db_path: tmp.path().join("test.db").to_string_lossy().to_string(),
        attempt_timeout: Duration::from_secs(2),
        mirror_url: Some("http://127.0.0.1:9/tufe/{series}/{period}".to_string()),
        ..Config::default()
    };
    let providers = build_providers(&config).unwrap();
    let state = build_state_with(&config, providers).await.unwrap();
    (app_router(state, &config), tmp)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn mirror_source() -> Value {
    json!({
        "id": "json_mirror",
        "providerId": "JSON_MIRROR",
        "name": "JSON Mirror",
        "seriesCode": "TUFE",
        "priority": 1
    })
}

#[tokio::test]
async fn healthz_reports_registry_size() {
    let (app, _tmp) = build_test_router().await;

    let (status, body) = send(&app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sources"], 0);
}

#[tokio::test]
async fn register_and_manage_source() {
    let (app, _tmp) = build_test_router().await;

    let (status, body) = send(&app, Method::POST, "/api/v1/sources", Some(mirror_source())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "json_mirror");
    assert_eq!(body["healthStatus"], "unknown");

    let (status, body) = send(&app, Method::GET, "/api/v1/sources", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/sources/json_mirror/priority",
        Some(json!({ "priority": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["priority"], 4);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/sources/json_mirror/priority",
        Some(json!({ "priority": 11 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");

    let (status, body) = send(&app, Method::POST, "/api/v1/sources/json_mirror/deactivate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (status, body) = send(&app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activeSources"], 0);

    let (status, body) = send(&app, Method::POST, "/api/v1/sources/missing/rotate", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "source_not_found");
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let (app, _tmp) = build_test_router().await;

    let mut source = mirror_source();
    source["providerId"] = json!("NOPE");
    let (status, _) = send(&app, Method::POST, "/api/v1/sources", Some(source)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_fetch_is_recorded_and_retryable() {
    let (app, _tmp) = build_test_router().await;
    send(&app, Method::POST, "/api/v1/sources", Some(mirror_source())).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inflation/fetch",
        Some(json!({ "period": "2024-03" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "all_sources_failed");
    let attempts = body["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["sourceId"], "json_mirror");
    assert_eq!(attempts[0]["success"], false);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/inflation/sessions?period=2024-03",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["status"], "failed");
    let id = sessions[0]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/inflation/sessions/{}/retry", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/inflation/sessions/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["retryCount"], 1);
    assert_eq!(body["attempts"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/inflation/sessions/{}/cancel", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "state_conflict");

    let (status, body) = send(&app, Method::GET, "/api/v1/sources/json_mirror", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failureCount"], 2);
}

#[tokio::test]
async fn unknown_session_and_bad_period() {
    let (app, _tmp) = build_test_router().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/inflation/sessions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "session_not_found");

    let (status, body) = send(&app, Method::DELETE, "/api/v1/inflation/cache/2024-13", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");

    let (status, body) = send(&app, Method::DELETE, "/api/v1/inflation/cache/2024-03", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], false);
}

#[tokio::test]
async fn auto_config_lifecycle() {
    let (app, _tmp) = build_test_router().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/auto-config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, body) = send(&app, Method::POST, "/api/v1/auto-config/setup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "default");
    assert_eq!(body["discoveryEnabled"], true);
    assert_eq!(body["cacheTtlHours"], 24);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/auto-config",
        Some(json!({ "cacheTtlHours": 6, "validationEnabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cacheTtlHours"], 6);
    assert_eq!(body["validationEnabled"], false);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/auto-config",
        Some(json!({ "cacheTtlHours": 169 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::POST, "/api/v1/auto-config/disable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["discoveryEnabled"], false);

    let (status, body) = send(&app, Method::GET, "/api/v1/auto-config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cacheTtlHours"], 6);
    assert_eq!(body["discoveryEnabled"], false);
}
