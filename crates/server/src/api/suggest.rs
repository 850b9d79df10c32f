/// 建议接口
///
/// 客户端向导用的资源清单；单项端点共享同一次打包查询。

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::api::ApiError;
use crate::app_state::AppState;
use crate::middleware::auth_middleware;
use crate::services::suggest::{SuggestPack, SuggestionService};

/// 建议路由，全部需要认证
pub fn suggest_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(suggest_all))
        .route("/datacenters", get(suggest_datacenters))
        .route("/clusters", get(suggest_clusters))
        .route("/datastores", get(suggest_datastores))
        .route("/networks", get(suggest_networks))
        .route("/folders", get(suggest_folders))
        .route("/os", get(suggest_os))
        .route("/tools", get(suggest_tools))
        .route("/load-balancers", get(suggest_load_balancers))
        .layer(from_fn_with_state(state, auth_middleware))
}

async fn pack(state: &AppState) -> Result<SuggestPack, ApiError> {
    Ok(SuggestionService::new(state.clone()).pack().await?)
}

/// GET /suggest
pub async fn suggest_all(State(state): State<AppState>) -> Result<Json<SuggestPack>, ApiError> {
    Ok(Json(pack(&state).await?))
}

/// GET /suggest/datacenters
pub async fn suggest_datacenters(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!({ "items": pack(&state).await?.datacenters })))
}

/// GET /suggest/clusters
pub async fn suggest_clusters(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!({ "items": pack(&state).await?.clusters })))
}

/// GET /suggest/datastores
pub async fn suggest_datastores(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!({ "items": pack(&state).await?.datastores })))
}

/// GET /suggest/networks
pub async fn suggest_networks(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!({ "items": pack(&state).await?.networks })))
}

/// GET /suggest/folders
pub async fn suggest_folders(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!({ "items": pack(&state).await?.folders })))
}

/// GET /suggest/os
pub async fn suggest_os(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!({ "items": pack(&state).await?.os_list })))
}

/// GET /suggest/tools
pub async fn suggest_tools(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!({ "items": pack(&state).await?.tools })))
}

/// GET /suggest/load-balancers
pub async fn suggest_load_balancers(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!({ "items": pack(&state).await?.load_balancers })))
}
