/// HTTP 接口层

pub mod customer;
pub mod suggest;
pub mod vm;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use common::Error;
use serde_json::json;

use crate::app_state::AppState;

/// API 错误：分类错误到稳定状态码的唯一映射点
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidSpec(_) => StatusCode::BAD_REQUEST,
            Error::AuthRequired(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::NoCapacity(_)
            | Error::HypervisorUnavailable(_)
            | Error::GuestUnreachable(_)
            | Error::CredentialsInstallFailed(_)
            | Error::BootstrapFailed { .. }
            | Error::EdgeUnavailable(_)
            | Error::Timeout(_) => StatusCode::BAD_GATEWAY,
            Error::Serialization(_) | Error::Internal(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // detail 不携带凭据、令牌或私钥，各组件在源头保证
        let mut body = json!({
            "error": self.0.kind(),
            "detail": self.0.to_string(),
        });
        if let Error::BootstrapFailed { command_index, .. } = &self.0 {
            body["commandIndex"] = json!(command_index);
        }

        (status, Json(body)).into_response()
    }
}

/// 所有 API 路由（统一入口）
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/customer", customer::customer_routes(state.clone()))
        .nest("/vm", vm::vm_routes(state.clone()))
        .nest("/suggest", suggest::suggest_routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: Error) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn test_status_mapping_stable() {
        assert_eq!(status_of(Error::InvalidSpec("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(Error::AuthRequired("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(Error::NoCapacity("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_of(Error::BootstrapFailed { command_index: 2, detail: "x".into() }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_of(Error::Internal("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
