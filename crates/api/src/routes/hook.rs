//! # 入站信号路由
//!
//! 外部信号源以纯文本请求体上报 `exchange,symbol,side,price,direction,amount`。

use axum::extract::{Path, State};
use axum::Json;
use hookrelay_manager::strategy::IngestOutcome;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiErrorResponse, EmptyResponse, ValidationErrorResponse};

/// 接收信号源上报
///
/// 校验通过后立即返回；持仓聚合的结果异步落盘并推送给下游 Webhook。
/// 策略停用、信号源停用、标志未变化或标的不含 `USDT` 时同样返回 `{}`。
#[utoipa::path(
    post,
    path = "/hook/{strategy_id}/{source_id}",
    tag = "信号 (Hook)",
    params(
        ("strategy_id" = String, Path, description = "策略 ID"),
        ("source_id" = String, Path, description = "信号源 ID")
    ),
    request_body(
        content = String,
        content_type = "text/plain",
        example = "binance,BTCUSDT,long,65000,buy,1"
    ),
    responses(
        (status = 200, description = "信号已接收", body = EmptyResponse),
        (status = 400, description = "信号格式或内容不合法", body = ValidationErrorResponse),
        (status = 404, description = "策略或信号源不存在", body = ApiErrorResponse)
    )
)]
pub async fn receive_signal(
    State(state): State<AppState>,
    Path((strategy_id, source_id)): Path<(String, String)>,
    body: String,
) -> Result<Json<EmptyResponse>, ApiError> {
    let outcome = state
        .manager
        .ingest(&strategy_id, &source_id, &body)
        .await
        .inspect_err(|e| warn!(%strategy_id, %source_id, error = %e, "signal rejected"))?;

    if let IngestOutcome::Emitted(transitions) = &outcome {
        debug!(%strategy_id, %source_id, transitions = transitions.len(), "signal accepted");
    }
    Ok(Json(EmptyResponse {}))
}
