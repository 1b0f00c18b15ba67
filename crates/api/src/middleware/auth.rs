//! # 鉴权中间件
//!
//! 管理接口使用 `Authorization: Bearer <token>` 携带会话令牌，令牌由 [`crate::token`] 签发与校验。

use std::convert::Infallible;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::server::AppState;
use crate::token;
use crate::types::SessionClaims;

/// # Summary
/// 从请求头解析并校验会话。
///
/// # Returns
/// * `None` - 缺少请求头、不是 Bearer 方案、签名不符或已过期。
pub fn session_from_headers(headers: &HeaderMap, state: &AppState) -> Option<SessionClaims> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, raw) = value.split_once(' ')?;
    if scheme != "Bearer" {
        return None;
    }

    let claims: SessionClaims = token::verify(raw.trim(), state.auth.secret.as_bytes())?;
    (claims.exp > state.clock.now_secs()).then_some(claims)
}

/// 提取并验证 Authorization: Bearer <token>
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(claims) = session_from_headers(req.headers(), &state) else {
        tracing::warn!(path = %req.uri().path(), "rejected request without valid session");
        return Err(ApiError::unauthorized());
    };

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// 公开接口上的可选会话，令牌无效时视为未登录而不是拒绝请求
pub struct OptionalSession(pub Option<SessionClaims>);

impl FromRequestParts<AppState> for OptionalSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(OptionalSession(session_from_headers(&parts.headers, state)))
    }
}
