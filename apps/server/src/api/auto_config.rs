use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tufe_core::{
    autoconfig::DiscoveredSource,
    models::{AutoConfig, AutoConfigUpdate},
    Source,
};

use crate::{error::ApiResult, main_lib::AppState};

async fn get_auto_config(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Option<AutoConfig>>> {
    Ok(Json(state.inflation_service.get_auto_config().await?))
}

async fn update_auto_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<AutoConfigUpdate>,
) -> ApiResult<Json<AutoConfig>> {
    Ok(Json(state.inflation_service.update_auto_config(update).await?))
}

async fn setup_zero_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<AutoConfig>> {
    Ok(Json(state.inflation_service.setup_zero_config().await?))
}

async fn enable_auto_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<AutoConfig>> {
    Ok(Json(state.inflation_service.enable_auto_config().await?))
}

async fn disable_auto_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<AutoConfig>> {
    Ok(Json(state.inflation_service.disable_auto_config().await?))
}

async fn discover_sources(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<DiscoveredSource>>> {
    Ok(Json(state.inflation_service.discover_sources().await?))
}

/// Registers every reachable provider that is not registered yet.
async fn auto_configure_sources(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Source>>> {
    Ok(Json(state.inflation_service.auto_configure_sources().await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/auto-config",
            get(get_auto_config).put(update_auto_config),
        )
        .route("/auto-config/setup", post(setup_zero_config))
        .route("/auto-config/enable", post(enable_auto_config))
        .route("/auto-config/disable", post(disable_auto_config))
        .route("/auto-config/discover", post(discover_sources))
        .route("/auto-config/apply", post(auto_configure_sources))
}
