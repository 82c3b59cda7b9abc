//! Status/config API contract tests against an in-process router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use duet::adapters::SimulatedExchange;
use duet::api::{create_router, AppState};
use duet::config::AppConfig;
use duet::strategy::Engine;

fn app(configured: bool) -> axum::Router {
    let mut config = AppConfig::default_config(true, "BTCUSDT");
    if configured {
        config.market.yes_token_id = Some("tok-yes".into());
        config.market.no_token_id = Some("tok-no".into());
    }
    let engine = Arc::new(Engine::new(config, Arc::new(SimulatedExchange::new())));
    create_router(AppState::new(engine))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app(true)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn status_snapshot_shape() {
    let response = app(true)
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["running"], false);
    assert_eq!(body["active_cycles"], 0);
    assert!(body["next_window_start"].is_string());
    assert!(body["volatility"]["in_range"].is_boolean());
    assert_eq!(body["analytics"]["total_cycles"], 0);
}

#[tokio::test]
async fn unknown_cycle_is_404() {
    let response = app(true)
        .oneshot(Request::get("/api/cycles/42").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn start_without_tokens_is_409() {
    let response = app(false)
        .oneshot(
            Request::post("/api/system/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn start_stop_roundtrip() {
    let router = app(true);

    let response = router
        .clone()
        .oneshot(
            Request::post("/api/system/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["running"], true);

    let response = router
        .oneshot(
            Request::post("/api/system/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await["running"], false);
}

#[tokio::test]
async fn config_patch_merges_valid_fields() {
    let router = app(true);

    let response = router
        .clone()
        .oneshot(
            Request::patch("/api/config")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "exit_ttl_secs": 90 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["exit_ttl_secs"], 90);

    // The merge is visible on a subsequent read
    let response = router
        .oneshot(Request::get("/api/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await["exit_ttl_secs"], 90);
}

#[tokio::test]
async fn config_patch_rejects_out_of_bounds_atomically() {
    let router = app(true);

    // One valid field and one out-of-bounds field: nothing merges
    let response = router
        .clone()
        .oneshot(
            Request::patch("/api/config")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "exit_ttl_secs": 90, "tp_price": "1.5" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["violations"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v.as_str().unwrap().contains("tp_price")));

    let response = router
        .oneshot(Request::get("/api/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["exit_ttl_secs"], 120);
}

#[tokio::test]
async fn config_patch_rejects_unknown_fields() {
    let response = app(true)
        .oneshot(
            Request::patch("/api/config")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "no_such_knob": 1 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
