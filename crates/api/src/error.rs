//! # API 统一错误处理
//!
//! 将下层各 crate 的错误类型统一映射到 HTTP 状态码与 JSON 响应体。

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hookrelay_manager::strategy::ManagerError;
use serde_json::json;
use thiserror::Error;

use crate::types::{ApiErrorResponse, ValidationErrorResponse};

/// 机器可读的错误码
pub mod codes {
    pub const UNKNOWN_ERROR: &str = "core#unknown-error";

    pub const UNAUTHORIZED_ACCESS: &str = "auth#unauthorized";
    pub const ACCOUNT_NOT_FOUND: &str = "auth#account-not-found";
    pub const INVALID_PASSWORD: &str = "auth#invalid-password";
    pub const INVALID_PAYLOAD_FORMAT: &str = "parse#invalid-error-format";

    pub const STRATEGY_NOT_FOUND: &str = "error#strategy-not-found";
    pub const INVALID_PAYLOAD_CONTENTS: &str = "error#invalid-payload-content";
}

/// API 层统一错误枚举
#[derive(Error, Debug)]
pub enum ApiError {
    /// 认证失败 (401)
    #[error("Unauthorized ({code}): {message}")]
    Unauthorized { code: &'static str, message: String },

    /// 策略或信号源不存在 (404)
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        detail: serde_json::Value,
    },

    /// 请求参数错误 (400)
    #[error("Bad request ({code}): {message}")]
    BadRequest { code: &'static str, message: String },

    /// 入站信号校验失败 (400)，逐条返回错误原因
    #[error("Invalid signal: {}", .0.join("; "))]
    InvalidSignal(Vec<String>),

    /// 下层业务错误 (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized() -> Self {
        ApiError::Unauthorized {
            code: codes::UNAUTHORIZED_ACCESS,
            message: "You're not authorized to access this resource!".to_string(),
        }
    }

    pub fn invalid_format() -> Self {
        ApiError::BadRequest {
            code: codes::INVALID_PAYLOAD_FORMAT,
            message: "You're request payload is invalid!".to_string(),
        }
    }

    pub fn invalid_contents(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code: codes::INVALID_PAYLOAD_CONTENTS,
            message: message.into(),
        }
    }
}

/// 将 `ApiError` 转换为 axum 的 HTTP 响应
///
/// 带错误码的响应会把 `ApiErrorResponse` 一并放进响应扩展，供 `attach_scope` 补全 `scope`。
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::InvalidSignal(errors) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ValidationErrorResponse { errors }),
                )
                    .into_response();
            }
            ApiError::Internal(msg) => {
                // 内部错误只记录日志，不向客户端透传细节
                tracing::error!(error = %msg, "internal server error");
                let body = ApiErrorResponse {
                    scope: None,
                    code: codes::UNKNOWN_ERROR.to_string(),
                    message: "Unexpected error has been occurred!".to_string(),
                    detail: None,
                };
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
            ApiError::Unauthorized { code, message } => (
                StatusCode::UNAUTHORIZED,
                ApiErrorResponse {
                    scope: None,
                    code: code.to_string(),
                    message,
                    detail: None,
                },
            ),
            ApiError::NotFound { message, detail } => (
                StatusCode::NOT_FOUND,
                ApiErrorResponse {
                    scope: None,
                    code: codes::STRATEGY_NOT_FOUND.to_string(),
                    message,
                    detail: Some(detail),
                },
            ),
            ApiError::BadRequest { code, message } => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse {
                    scope: None,
                    code: code.to_string(),
                    message,
                    detail: None,
                },
            ),
        };

        let mut response = (status, Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

/// 从 `ManagerError` 转换
impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::StrategyNotFound(sid) => ApiError::NotFound {
                message: "Requesting strategy doesn't exist!".to_string(),
                detail: json!({ "sid": sid }),
            },
            ManagerError::SourceNotFound {
                strategy_id,
                source_id,
            } => ApiError::NotFound {
                message: "Requesting strategy source doesn't exist!".to_string(),
                detail: json!({ "sid": strategy_id, "srcid": source_id }),
            },
            ManagerError::InvalidPayload(errors) => ApiError::InvalidSignal(errors),
            ManagerError::InvalidInput(msg) => ApiError::invalid_contents(msg),
            ManagerError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

/// JSON 请求体无法解析
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "malformed json payload");
        ApiError::invalid_format()
    }
}

/// # Summary
/// `axum::Json` 的包装，解析失败时返回统一格式的 400 而不是 axum 的纯文本拒绝。
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// # Summary
/// 路由级中间件：为错误响应体补全 `scope` (命中的路由模板)。
///
/// # Logic
/// 1. 记录请求命中的路由模板，未命中时退回原始路径。
/// 2. 响应扩展中带有 `ApiErrorResponse` 时，写入 `scope` 并按原状态码重新序列化。
pub async fn attach_scope(req: Request, next: Next) -> Response {
    let scope = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut response = next.run(req).await;
    match response.extensions_mut().remove::<ApiErrorResponse>() {
        Some(mut body) => {
            body.scope = Some(scope);
            (response.status(), Json(body)).into_response()
        }
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookrelay_core::store::error::StoreError;

    #[test]
    fn test_manager_errors_map_to_wire_codes() {
        let err: ApiError = ManagerError::SourceNotFound {
            strategy_id: "s1".to_string(),
            source_id: "x".to_string(),
        }
        .into();
        match err {
            ApiError::NotFound { message, detail } => {
                assert_eq!(message, "Requesting strategy source doesn't exist!");
                assert_eq!(detail, json!({"sid": "s1", "srcid": "x"}));
            }
            other => panic!("unexpected {:?}", other),
        }

        let err: ApiError = ManagerError::InvalidInput("symbol must contain USDT".into()).into();
        assert!(matches!(
            err,
            ApiError::BadRequest { code: codes::INVALID_PAYLOAD_CONTENTS, .. }
        ));

        let err: ApiError = ManagerError::Store(StoreError::Io("disk full".into())).into();
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_is_exposed_for_scope() {
        let response = ApiError::unauthorized().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response.extensions().get::<ApiErrorResponse>().unwrap();
        assert_eq!(body.code, codes::UNAUTHORIZED_ACCESS);
        assert!(body.scope.is_none());

        let response = ApiError::InvalidSignal(vec!["invalid side: up".into()]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.extensions().get::<ApiErrorResponse>().is_none());
    }
}
