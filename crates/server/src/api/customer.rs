/// 客户管理接口

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::ApiError;
use crate::app_state::AppState;
use crate::auth::Claims;
use crate::db::models::customer::{CreateCustomerDto, CustomerResponse, LoginDto};
use crate::middleware::auth_middleware;
use crate::services::customer_service::CustomerService;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCustomerQuery {
    pub customer_id: String,
}

/// 客户路由；登录与注册公开，其余需要认证
pub fn customer_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(logout))
        .route("/delete", delete(delete_customer))
        .layer(from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/login", post(login))
        .route("/create", post(create_customer))
        .merge(protected)
}

/// 登录
///
/// POST /customer/login
pub async fn login(
    State(state): State<AppState>,
    Json(dto): Json<LoginDto>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if dto.username.is_empty() || dto.password.is_empty() {
        return Err(common::Error::InvalidSpec("用户名与口令不能为空".to_string()).into());
    }

    let token = CustomerService::new(state.clone()).login(dto).await?;
    Ok(Json(serde_json::json!({ "token": token })))
}

/// 登出（服务端吊销令牌）
///
/// POST /customer/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    CustomerService::new(state.clone()).logout(&claims).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// 注册客户
///
/// POST /customer/create
pub async fn create_customer(
    State(state): State<AppState>,
    Json(dto): Json<CreateCustomerDto>,
) -> Result<(StatusCode, Json<CustomerResponse>), ApiError> {
    let customer = CustomerService::new(state.clone()).register(dto).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

/// 删除客户
///
/// DELETE /customer/delete?customerId=xxx
pub async fn delete_customer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DeleteCustomerQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // 只允许删除令牌对应的客户自身
    if claims.user_id != query.customer_id {
        return Err(common::Error::AuthRequired("令牌与客户不匹配".to_string()).into());
    }

    CustomerService::new(state.clone()).delete(&query.customer_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
