use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tufe_core::{fetch::SessionSnapshot, FetchResult, Period};

use crate::{error::ApiResult, main_lib::AppState};

const DEFAULT_SESSION_LIMIT: usize = 20;
const MAX_SESSION_LIMIT: usize = 200;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchRequest {
    period: Period,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionQuery {
    period: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidateResponse {
    period: Period,
    removed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PurgeResponse {
    purged: usize,
}

async fn fetch_inflation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FetchRequest>,
) -> ApiResult<Json<FetchResult>> {
    let result = state.inflation_service.fetch_easy(body.period).await?;
    Ok(Json(result))
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<Json<Vec<SessionSnapshot>>> {
    let period = query.period.as_deref().map(str::parse::<Period>).transpose()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SESSION_LIMIT)
        .clamp(1, MAX_SESSION_LIMIT);
    let sessions = state.inflation_service.list_sessions(period, limit).await?;
    Ok(Json(sessions))
}

async fn get_session(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SessionSnapshot>> {
    let session = state.inflation_service.get_session(&id).await?;
    Ok(Json(session))
}

async fn retry_session(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<FetchResult>> {
    let result = state.inflation_service.retry_session(&id).await?;
    Ok(Json(result))
}

async fn cancel_session(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SessionSnapshot>> {
    let session = state.inflation_service.cancel_session(&id).await?;
    Ok(Json(session))
}

async fn invalidate_cache(
    Path(period): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<InvalidateResponse>> {
    let period: Period = period.parse()?;
    let removed = state.inflation_service.invalidate_cache(period).await?;
    Ok(Json(InvalidateResponse { period, removed }))
}

async fn purge_cache(State(state): State<Arc<AppState>>) -> Json<PurgeResponse> {
    let purged = state.inflation_service.purge_expired_cache();
    Json(PurgeResponse { purged })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/inflation/fetch", post(fetch_inflation))
        .route("/inflation/sessions", get(list_sessions))
        .route("/inflation/sessions/{id}", get(get_session))
        .route("/inflation/sessions/{id}/retry", post(retry_session))
        .route("/inflation/sessions/{id}/cancel", post(cancel_session))
        .route("/inflation/cache/purge", post(purge_cache))
        .route("/inflation/cache/{period}", delete(invalidate_cache))
}
