/// 认证中间件

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::ApiError;
use crate::app_state::AppState;
use crate::auth;

/// Bearer 令牌校验；通过后把声明放进请求扩展供处理器读取
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            ApiError::from(common::Error::AuthRequired("缺少 Bearer 令牌".to_string()))
        })?;

    let claims = auth::validate_token(&state.config().jwt_secret_key, token)?;

    // 已登出的令牌在过期前被服务端拒绝
    if state.deny_list.is_revoked(&claims.jti).await {
        return Err(common::Error::AuthRequired("令牌已被吊销".to_string()).into());
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
