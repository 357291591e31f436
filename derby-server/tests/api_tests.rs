//! Integration tests for the derby-server HTTP API
//!
//! Uses tower::ServiceExt::oneshot to test routes directly without binding a port.

use axum::body::Body;
use derby_backends::{EngineScript, InMemoryBackend};
use derby_core::model::{Car, Winner};
use derby_server::{api::create_router, state::AppState};
use http_body_util::BodyExt;
use hyper::Request;
use std::time::Duration;
use tower::ServiceExt;

/// Helper: router over the four sample cars
fn app() -> axum::Router {
    create_router(AppState::default())
}

/// Helper: router with its state returned for inspection
fn app_with(backend: InMemoryBackend) -> (axum::Router, AppState) {
    let state = AppState::new(backend);
    (create_router(state.clone()), state)
}

async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ==================== /garage ====================

#[tokio::test]
async fn test_list_garage_with_total_count() {
    let response = app()
        .oneshot(request("GET", "/garage?_page=1&_limit=3"))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let total = response.headers().get("x-total-count").unwrap().to_str().unwrap();
    assert_eq!(total, "4");

    let cars: Vec<Car> = serde_json::from_value(body_json(response.into_body()).await).unwrap();
    assert_eq!(cars.len(), 3);
    assert_eq!(cars[0].name, "Tesla");
}

#[tokio::test]
async fn test_list_garage_sorted() {
    let response = app()
        .oneshot(request("GET", "/garage?_sort=name&_order=DESC"))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let cars: Vec<Car> = serde_json::from_value(body_json(response.into_body()).await).unwrap();
    let names: Vec<_> = cars.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Tesla", "Mercedes", "Ford", "BMW"]);
}

#[tokio::test]
async fn test_list_garage_rejects_unknown_sort() {
    let response = app()
        .oneshot(request("GET", "/garage?_sort=speed"))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_get_car() {
    let app = app();
    let response = app.clone().oneshot(request("GET", "/garage/2")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["name"], "BMW");
    assert_eq!(body["color"], "#fede00");

    let response = app.oneshot(request("GET", "/garage/99")).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_create_update_delete_car() {
    let (app, state) = app_with(InMemoryBackend::seeded());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/garage",
            serde_json::json!({"name": "Porsche 911", "color": "#112233"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(body_json(response.into_body()).await["id"], 5);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/garage/5",
            serde_json::json!({"name": "Porsche 718", "color": "#112233"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response.into_body()).await["name"], "Porsche 718");

    let response = app.clone().oneshot(request("DELETE", "/garage/5")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(state.backend.car_count(), 4);

    let response = app.oneshot(request("DELETE", "/garage/5")).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_create_car_with_blank_name_is_rejected() {
    let response = app()
        .oneshot(json_request(
            "POST",
            "/garage",
            serde_json::json!({"name": "", "color": "#112233"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_update_car_with_blank_name_is_rejected() {
    let app = app();
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/garage/1",
            serde_json::json!({"name": "  ", "color": "#112233"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = app.oneshot(request("GET", "/garage/1")).await.unwrap();
    assert_eq!(body_json(response.into_body()).await["name"], "Tesla");
}

// ==================== /winners ====================

#[tokio::test]
async fn test_invalid_winner_is_rejected() {
    let (app, state) = app_with(InMemoryBackend::seeded());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/winners",
            serde_json::json!({"id": 1, "wins": 0, "time": -3}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(state.backend.winner(1), None);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/winners",
            serde_json::json!({"id": 1, "wins": 1, "time": 4.5}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = app
        .oneshot(json_request(
            "PUT",
            "/winners/1",
            serde_json::json!({"wins": 2, "time": -1.0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(state.backend.winner(1), Some(Winner::first(1, 4.5)));
}

#[tokio::test]
async fn test_winner_lifecycle() {
    let (app, state) = app_with(InMemoryBackend::seeded());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/winners",
            serde_json::json!({"id": 1, "wins": 1, "time": 4.5}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/winners",
            serde_json::json!({"id": 1, "wins": 1, "time": 3.0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/winners/1",
            serde_json::json!({"wins": 2, "time": 4.0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        state.backend.winner(1),
        Some(Winner {
            id: 1,
            wins: 2,
            time: 4.0
        })
    );

    let response = app.clone().oneshot(request("GET", "/winners/1")).await.unwrap();
    assert_eq!(body_json(response.into_body()).await["wins"], 2);

    let response = app.clone().oneshot(request("DELETE", "/winners/1")).await.unwrap();
    assert_eq!(response.status(), 200);
    let response = app.oneshot(request("GET", "/winners/1")).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_list_winners_sorted_by_wins() {
    let (app, _) = app_with(InMemoryBackend::seeded().with_winners(vec![
        Winner { id: 1, wins: 2, time: 3.0 },
        Winner { id: 2, wins: 5, time: 4.0 },
    ]));

    let response = app
        .oneshot(request("GET", "/winners?_page=1&_limit=10&_sort=wins&_order=DESC"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("x-total-count").unwrap(), "2");
    let winners: Vec<Winner> =
        serde_json::from_value(body_json(response.into_body()).await).unwrap();
    assert_eq!(winners[0].id, 2);
}

// ==================== /engine ====================

#[tokio::test]
async fn test_engine_start_and_stop() {
    let (app, state) = app_with(
        InMemoryBackend::seeded().with_script(1, EngineScript::finishes(120.0, 500_000.0)),
    );

    let response = app
        .clone()
        .oneshot(request("PATCH", "/engine?id=1&status=started"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["velocity"], 120.0);
    assert_eq!(body["distance"], 500_000.0);
    assert!(state.backend.engine_started(1));

    let response = app
        .oneshot(request("PATCH", "/engine?id=1&status=stopped"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response.into_body()).await["velocity"], 0.0);
    assert!(!state.backend.engine_started(1));
}

#[tokio::test]
async fn test_drive_without_start_is_404() {
    let response = app()
        .oneshot(request("PATCH", "/engine?id=1&status=drive"))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_engine_rejects_unknown_status() {
    let response = app()
        .oneshot(request("PATCH", "/engine?id=1&status=turbo"))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test(start_paused = true)]
async fn test_drive_success_and_breakdown() {
    let (app, _) = app_with(
        InMemoryBackend::seeded()
            .with_script(1, EngineScript::finishes(100.0, 100_000.0))
            .with_script(
                2,
                EngineScript::breaks(100.0, 100_000.0, Duration::from_millis(300)),
            ),
    );

    for id in [1, 2] {
        let uri = format!("/engine?id={}&status=started", id);
        app.clone().oneshot(request("PATCH", &uri)).await.unwrap();
    }

    let response = app
        .clone()
        .oneshot(request("PATCH", "/engine?id=1&status=drive"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response.into_body()).await["success"], true);

    let response = app
        .oneshot(request("PATCH", "/engine?id=2&status=drive"))
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_drive_is_429() {
    let (app, _) = app_with(
        InMemoryBackend::seeded().with_script(3, EngineScript::finishes(100.0, 100_000.0)),
    );
    app.clone()
        .oneshot(request("PATCH", "/engine?id=3&status=started"))
        .await
        .unwrap();

    let first = tokio::spawn(
        app.clone()
            .oneshot(request("PATCH", "/engine?id=3&status=drive")),
    );
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = app
        .oneshot(request("PATCH", "/engine?id=3&status=drive"))
        .await
        .unwrap();
    assert_eq!(second.status(), 429);
    assert_eq!(first.await.unwrap().unwrap().status(), 200);
}

#[tokio::test]
async fn test_cors_exposes_total_count() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/garage")
                .header("origin", "http://localhost:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("access-control-allow-origin"));
    assert!(response.headers().contains_key("access-control-expose-headers"));
}
