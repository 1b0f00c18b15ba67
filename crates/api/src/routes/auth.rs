//! # 身份验证路由控制器
//!
//! 实现会话查询、登录与令牌续期接口。令牌无状态，服务端不保存会话。

use axum::extract::State;
use axum::Json;
use sha2::{Digest, Sha256};

use crate::error::{codes, ApiError, ApiJson};
use crate::middleware::auth::OptionalSession;
use crate::server::AppState;
use crate::token;
use crate::types::{
    ApiErrorResponse, LoginRequest, RefreshRequest, SessionClaims, SessionInfo,
    SessionInfoResponse, TokenResponse,
};

/// 剩余有效期不低于该值 (秒) 时，续期直接返回原令牌
const REFRESH_WINDOW_SECS: i64 = 600;

/// 计算账户配置中保存的密码摘要 `hex(sha256(salt || password))`
pub fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn issue_token(state: &AppState, now: i64) -> Result<String, ApiError> {
    let claims = SessionClaims {
        iat: now,
        exp: now + state.auth.token_ttl_secs,
    };
    token::encode(&claims, state.auth.secret.as_bytes())
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// 查询当前会话
///
/// 携带有效令牌时返回签发与过期时间，否则 `info` 为 `null`。
#[utoipa::path(
    get,
    path = "/api/login",
    tag = "鉴权 (Auth)",
    responses(
        (status = 200, description = "会话信息", body = SessionInfoResponse)
    )
)]
pub async fn session_info(OptionalSession(session): OptionalSession) -> Json<SessionInfoResponse> {
    Json(SessionInfoResponse {
        info: session.map(|claims| SessionInfo {
            issue_time: claims.iat,
            expired_time: claims.exp,
        }),
    })
}

/// 账户登录
///
/// # Logic
/// 1. 在配置的账户列表中查找账户。
/// 2. 以 `hex(sha256(salt || password))` 比对密码摘要。
/// 3. 签发有效期为 `token_ttl_secs` 的会话令牌。
#[utoipa::path(
    post,
    path = "/api/login",
    tag = "鉴权 (Auth)",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "登录成功", body = TokenResponse),
        (status = 400, description = "请求体格式错误", body = ApiErrorResponse),
        (status = 401, description = "账户不存在或密码错误", body = ApiErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Some(account) = state.auth.accounts.iter().find(|a| a.account == req.account) else {
        tracing::warn!(account = %req.account, "login with unknown account");
        return Err(ApiError::Unauthorized {
            code: codes::ACCOUNT_NOT_FOUND,
            message: "Requesting account doesn't exist!".to_string(),
        });
    };

    let digest = password_digest(&account.salt, &req.password);
    if !digest.eq_ignore_ascii_case(account.password_sha256.trim()) {
        tracing::warn!(account = %req.account, "login with invalid password");
        return Err(ApiError::Unauthorized {
            code: codes::INVALID_PASSWORD,
            message: "Given password is incorrect!".to_string(),
        });
    }

    let token = issue_token(&state, state.clock.now_secs())?;
    tracing::info!(account = %req.account, "session issued");
    Ok(Json(TokenResponse { token }))
}

/// 续期会话令牌
///
/// 剩余有效期不少于 10 分钟时原样返回，否则签发新令牌；已过期的令牌不能续期。
#[utoipa::path(
    put,
    path = "/api/login",
    tag = "鉴权 (Auth)",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "续期成功", body = TokenResponse),
        (status = 400, description = "令牌无效", body = ApiErrorResponse),
        (status = 401, description = "令牌已过期", body = ApiErrorResponse)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Some(claims) = token::verify::<SessionClaims>(&req.token, state.auth.secret.as_bytes())
    else {
        return Err(ApiError::invalid_contents("Given token is invalid!"));
    };

    let now = state.clock.now_secs();
    if claims.exp <= now {
        return Err(ApiError::unauthorized());
    }
    if claims.exp - now >= REFRESH_WINDOW_SECS {
        return Ok(Json(TokenResponse { token: req.token }));
    }

    let token = issue_token(&state, now)?;
    tracing::info!(previous_exp = claims.exp, "session refreshed");
    Ok(Json(TokenResponse { token }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_digest_prefixes_salt() {
        // sha256("abc")
        assert_eq!(
            password_digest("", "abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(password_digest("a", "bc"), password_digest("", "abc"));
        assert_ne!(password_digest("salt", "abc"), password_digest("", "abc"));
    }
}
