use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tufe_core::{
    models::{NewSource, SourceHealthSummary},
    registry::HealthCheckOutcome,
    Period, Source,
};

use crate::{error::ApiResult, main_lib::AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriorityRequest {
    priority: u8,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BestSourceQuery {
    period: String,
}

async fn list_sources(State(state): State<Arc<AppState>>) -> Json<Vec<Source>> {
    Json(state.inflation_service.list_sources())
}

async fn register_source(
    State(state): State<Arc<AppState>>,
    Json(new_source): Json<NewSource>,
) -> ApiResult<(StatusCode, Json<Source>)> {
    let source = state.inflation_service.register_source(new_source).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

async fn get_source(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Source>> {
    Ok(Json(state.inflation_service.get_source(&id)?))
}

/// Top candidate for a period, `null` when nothing can serve it.
async fn get_best_source(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BestSourceQuery>,
) -> ApiResult<Json<Option<Source>>> {
    let period: Period = query.period.parse()?;
    Ok(Json(state.inflation_service.get_best_source(&period)))
}

async fn get_health_summary(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<SourceHealthSummary>> {
    Json(state.inflation_service.get_source_health_summary())
}

async fn run_health_checks(State(state): State<Arc<AppState>>) -> Json<Vec<HealthCheckOutcome>> {
    Json(state.inflation_service.run_health_checks().await)
}

async fn activate_source(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Source>> {
    let source = state.inflation_service.set_source_active(&id, true).await?;
    Ok(Json(source))
}

async fn deactivate_source(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Source>> {
    let source = state.inflation_service.set_source_active(&id, false).await?;
    Ok(Json(source))
}

async fn rotate_counters(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Source>> {
    let source = state.inflation_service.rotate_source_counters(&id).await?;
    Ok(Json(source))
}

async fn update_priority(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PriorityRequest>,
) -> ApiResult<Json<Source>> {
    let source = state
        .inflation_service
        .update_source_priority(&id, body.priority)
        .await?;
    Ok(Json(source))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sources", get(list_sources).post(register_source))
        .route("/sources/best", get(get_best_source))
        .route("/sources/health", get(get_health_summary))
        .route("/sources/health-checks", post(run_health_checks))
        .route("/sources/{id}", get(get_source))
        .route("/sources/{id}/activate", post(activate_source))
        .route("/sources/{id}/deactivate", post(deactivate_source))
        .route("/sources/{id}/rotate", post(rotate_counters))
        .route("/sources/{id}/priority", put(update_priority))
}
