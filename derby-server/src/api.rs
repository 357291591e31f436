//! REST API routes
//!
//! json-server compatible: lists accept `_page`, `_limit`, `_sort` and
//! `_order` and report the collection size in `X-Total-Count`.

use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use derby_backends::http::TOTAL_COUNT_HEADER;
use derby_core::backend::{BackendError, RaceBackend};
use derby_core::model::*;
use serde::Deserialize;
use std::str::FromStr;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

/// json-server's page size when `_page` comes without `_limit`
const DEFAULT_LIMIT: u32 = 10;

type ApiError = (StatusCode, String);

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/garage", get(list_cars).post(create_car))
        .route(
            "/garage/:id",
            get(get_car).put(update_car).delete(delete_car),
        )
        .route("/winners", get(list_winners).post(create_winner))
        .route(
            "/winners/:id",
            get(get_winner).put(update_winner).delete(delete_winner),
        )
        .route("/engine", patch(engine))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn backend_error(err: BackendError) -> ApiError {
    let status = match &err {
        BackendError::NotFound { .. } => StatusCode::NOT_FOUND,
        BackendError::Invalid(_) => StatusCode::BAD_REQUEST,
        BackendError::Conflict(_) => StatusCode::CONFLICT,
        BackendError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        BackendError::EngineBroken(_) => StatusCode::INTERNAL_SERVER_ERROR,
        BackendError::Status { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        BackendError::Transport(_) | BackendError::Decode(_) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", err);
    }
    (status, err.to_string())
}

fn not_found(resource: &'static str, id: CarId) -> ApiError {
    backend_error(BackendError::NotFound { resource, id })
}

/// Empty JSON object, json-server's reply to a delete
fn empty_object() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}

// === List Query ===

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(rename = "_page")]
    page: Option<u32>,
    #[serde(rename = "_limit")]
    limit: Option<u32>,
    #[serde(rename = "_sort")]
    sort: Option<String>,
    #[serde(rename = "_order")]
    order: Option<String>,
}

impl ListParams {
    fn into_query<K>(self) -> Result<PageQuery<K>, ApiError>
    where
        K: SortColumn + FromStr,
        K::Err: std::fmt::Display,
    {
        let query = match (self.page, self.limit) {
            (None, None) => PageQuery::all(),
            (page, limit) => PageQuery::new(page.unwrap_or(1), limit.unwrap_or(DEFAULT_LIMIT)),
        };

        let sort = match self.sort {
            Some(by) => {
                let by = K::from_str(&by).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                let order = match self.order {
                    Some(order) => SortOrder::from_str(&order)
                        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
                    None => SortOrder::Asc,
                };
                Some(Sort { by, order })
            }
            None => None,
        };
        Ok(query.sorted(sort))
    }
}

fn page_response<T: serde::Serialize>(page: Page<T>) -> Response {
    (
        [(TOTAL_COUNT_HEADER, page.total.to_string())],
        Json(page.items),
    )
        .into_response()
}

// === Garage Endpoints ===

async fn list_cars(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query::<CarSortBy>()?;
    let page = state.backend.list_cars(&query).await.map_err(backend_error)?;
    Ok(page_response(page))
}

async fn get_car(
    State(state): State<AppState>,
    Path(id): Path<CarId>,
) -> Result<Json<Car>, ApiError> {
    state
        .backend
        .get_car(id)
        .await
        .map_err(backend_error)?
        .map(Json)
        .ok_or_else(|| not_found("car", id))
}

async fn create_car(
    State(state): State<AppState>,
    Json(car): Json<NewCar>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.backend.create_car(&car).await.map_err(backend_error)?;
    debug!("Created car {} via API", created.id);
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_car(
    State(state): State<AppState>,
    Path(id): Path<CarId>,
    Json(car): Json<NewCar>,
) -> Result<Json<Car>, ApiError> {
    let updated = state.backend.update_car(id, &car).await.map_err(backend_error)?;
    Ok(Json(updated))
}

async fn delete_car(
    State(state): State<AppState>,
    Path(id): Path<CarId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.backend.delete_car(id).await.map_err(backend_error)?;
    Ok(empty_object())
}

// === Winners Endpoints ===

async fn list_winners(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query::<WinnersSortBy>()?;
    let page = state.backend.list_winners(&query).await.map_err(backend_error)?;
    Ok(page_response(page))
}

async fn get_winner(
    State(state): State<AppState>,
    Path(id): Path<CarId>,
) -> Result<Json<Winner>, ApiError> {
    state
        .backend
        .get_winner(id)
        .await
        .map_err(backend_error)?
        .map(Json)
        .ok_or_else(|| not_found("winner", id))
}

async fn create_winner(
    State(state): State<AppState>,
    Json(winner): Json<Winner>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.backend.create_winner(&winner).await.map_err(backend_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_winner(
    State(state): State<AppState>,
    Path(id): Path<CarId>,
    Json(update): Json<WinnerUpdate>,
) -> Result<Json<Winner>, ApiError> {
    let updated = state
        .backend
        .update_winner(id, &update)
        .await
        .map_err(backend_error)?;
    Ok(Json(updated))
}

async fn delete_winner(
    State(state): State<AppState>,
    Path(id): Path<CarId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.backend.delete_winner(id).await.map_err(backend_error)?;
    Ok(empty_object())
}

// === Engine Endpoint ===

#[derive(Debug, Deserialize)]
struct EngineParams {
    id: CarId,
    status: EngineStatus,
}

async fn engine(
    State(state): State<AppState>,
    Query(params): Query<EngineParams>,
) -> Result<Response, ApiError> {
    let backend = &state.backend;
    let response = match params.status {
        EngineStatus::Started => Json(backend.start_engine(params.id).await.map_err(backend_error)?)
            .into_response(),
        EngineStatus::Stopped => Json(backend.stop_engine(params.id).await.map_err(backend_error)?)
            .into_response(),
        EngineStatus::Drive => Json(backend.drive(params.id).await.map_err(backend_error)?)
            .into_response(),
    };
    Ok(response)
}
