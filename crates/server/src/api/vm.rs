/// 虚拟机接口

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use common::models::{CustomSpec, HardwareSpec};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::api::ApiError;
use crate::app_state::AppState;
use crate::auth::Claims;
use crate::middleware::auth_middleware;
use crate::services::lifecycle::{HealthResponse, LifecycleManager};
use crate::services::orchestrator::{DeployResponse, DeploymentOrchestrator};

/// 部署请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub customer_id: String,
    pub hardware_spec: HardwareSpec,
    pub custom_spec: CustomSpec,
}

/// 生命周期查询参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmQuery {
    pub vm_id: String,
    pub customer_id: String,
}

/// VM 路由，全部需要认证
pub fn vm_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/deploy", post(deploy_vm))
        .route("/start", post(start_vm))
        .route("/reboot", post(reboot_vm))
        .route("/shutdown", post(shutdown_vm))
        .route("/remove", delete(remove_vm))
        .route("/health", get(vm_health))
        .route("/ssh/cert", get(vm_ssh_cert))
        .layer(from_fn_with_state(state, auth_middleware))
}

fn check_tenant(claims: &Claims, customer_id: &str) -> Result<(), ApiError> {
    if claims.user_id != customer_id {
        return Err(common::Error::AuthRequired("令牌与客户不匹配".to_string()).into());
    }
    Ok(())
}

/// 部署虚拟机
///
/// POST /vm/deploy
/// Body: DeployRequest
///
/// 部署在独立任务里执行：客户端断开时撤销令牌触发，流水线在当前
/// 阶段边界停下并补偿，不会留下半成品。
pub async fn deploy_vm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeployRequest>,
) -> Result<(StatusCode, Json<DeployResponse>), ApiError> {
    check_tenant(&claims, &req.customer_id)?;

    let cancel = CancellationToken::new();
    let child = cancel.child_token();
    // 处理器 future 被丢弃（连接断开）时触发取消
    let _cancel_on_drop = cancel.drop_guard();

    let orchestrator = DeploymentOrchestrator::new(state.clone());
    let task = tokio::spawn(async move {
        orchestrator
            .deploy(&req.customer_id, req.hardware_spec, req.custom_spec, child)
            .await
    });

    let response = task
        .await
        .map_err(|e| common::Error::Internal(format!("部署任务中断: {}", e)))??;

    Ok((StatusCode::CREATED, Json(response)))
}

/// 开机
///
/// POST /vm/start?vmId=xxx&customerId=xxx
pub async fn start_vm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<VmQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_tenant(&claims, &query.customer_id)?;

    let outcome = LifecycleManager::new(state.clone())
        .start(&query.customer_id, &query.vm_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "already": outcome.already })))
}

/// 重启
///
/// POST /vm/reboot?vmId=xxx&customerId=xxx
pub async fn reboot_vm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<VmQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_tenant(&claims, &query.customer_id)?;

    let outcome = LifecycleManager::new(state.clone())
        .reboot(&query.customer_id, &query.vm_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "already": outcome.already })))
}

/// 关机
///
/// POST /vm/shutdown?vmId=xxx&customerId=xxx
pub async fn shutdown_vm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<VmQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_tenant(&claims, &query.customer_id)?;

    let outcome = LifecycleManager::new(state.clone())
        .shutdown(&query.customer_id, &query.vm_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "already": outcome.already })))
}

/// 销毁
///
/// DELETE /vm/remove?vmId=xxx&customerId=xxx
pub async fn remove_vm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<VmQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_tenant(&claims, &query.customer_id)?;

    let outcome = LifecycleManager::new(state.clone())
        .destroy(&query.customer_id, &query.vm_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "already": outcome.already })))
}

/// 健康状态
///
/// GET /vm/health?vmId=xxx&customerId=xxx
pub async fn vm_health(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<VmQuery>,
) -> Result<Json<HealthResponse>, ApiError> {
    check_tenant(&claims, &query.customer_id)?;

    let health = LifecycleManager::new(state.clone())
        .health(&query.customer_id, &query.vm_id)
        .await?;
    Ok(Json(health))
}

/// 取 SSH 证书
///
/// GET /vm/ssh/cert?vmId=xxx&customerId=xxx
pub async fn vm_ssh_cert(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<VmQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_tenant(&claims, &query.customer_id)?;

    let pem = LifecycleManager::new(state.clone())
        .ssh_cert(&query.customer_id, &query.vm_id)
        .await?;
    Ok(Json(serde_json::json!({ "pem": pem })))
}
