//! # DTO (Data Transfer Object) 层
//!
//! 将内部领域模型转化为面向管理端 JSON 输出的轻量结构体。
//! 所有 DTO 必须派生 `utoipa::ToSchema` 以自动进入 Swagger 文档。

use std::collections::BTreeMap;

use hookrelay_core::signal::entity::{DeliveryQueue, Side};
use hookrelay_core::strategy::entity::{PositionFlags, PositionState, Source, Strategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================
//  通用响应 DTO
// ============================================================

/// 成功但无数据时返回的空对象 `{}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EmptyResponse {}

/// 创建类接口返回的新资源 ID
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IdResponse {
    #[schema(example = "0192f1c4a8e27b3c9d5e6f708192a3b4")]
    pub id: String,
}

/// 统一错误响应体
///
/// `scope` 为命中的路由模板，由 `attach_scope` 中间件在响应出站前填入。
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "/api/strategy/{sid}")]
    pub scope: Option<String>,
    /// 机器可读的错误码
    #[schema(example = "error#strategy-not-found")]
    pub code: String,
    /// 人类可读的错误描述
    #[schema(example = "Requesting strategy doesn't exist!")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub detail: Option<serde_json::Value>,
}

/// 入站信号校验失败时返回的错误列表
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidationErrorResponse {
    #[schema(example = json!(["invalid side: up"]))]
    pub errors: Vec<String>,
}

// ============================================================
//  鉴权 DTO
// ============================================================

/// 登录请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin")]
    pub account: String,
    #[schema(example = "password123")]
    pub password: String,
}

/// 续期请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub token: String,
}

/// 登录或续期成功返回的会话令牌
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

/// 会话令牌载荷 (内部使用，不暴露到 Swagger)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// 签发时间 (Unix 秒)
    pub iat: i64,
    /// 过期时间 (Unix 秒)
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionInfo {
    #[schema(example = 1700000000)]
    pub issue_time: i64,
    #[schema(example = 1700216000)]
    pub expired_time: i64,
}

/// 当前会话信息，未登录时 `info` 为 `null`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionInfoResponse {
    pub info: Option<SessionInfo>,
}

// ============================================================
//  策略相关 DTO
// ============================================================

/// 创建策略请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateStrategyRequest {
    #[serde(default)]
    #[schema(example = "btc trend")]
    pub name: String,
    /// 下游 Webhook 地址
    #[serde(default)]
    #[schema(example = "https://bot.example.com/signal")]
    pub hook_url: String,
    #[schema(example = "binance")]
    pub exchange: String,
    /// 交易标的，必须包含 `USDT`
    #[schema(example = "BTCUSDT")]
    pub symbol: String,
    /// 初始信号源名称列表
    #[serde(default)]
    #[schema(example = json!(["ema-cross", "rsi"]))]
    pub sources: Vec<String>,
}

/// 修改策略请求体，缺省字段保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateStrategyRequest {
    pub name: Option<String>,
    pub hook_url: Option<String>,
    pub enabled: Option<bool>,
}

/// 添加信号源请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AddSourceRequest {
    /// 信号源名称，缺省时与生成的 ID 相同
    pub name: Option<String>,
}

/// 修改信号源请求体，缺省字段保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateSourceRequest {
    pub name: Option<String>,
    pub active: Option<bool>,
}

/// 信号源 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SourceResponse {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub update_time: i64,
    pub create_time: i64,
}

/// 策略 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StrategyResponse {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub hook_url: String,
    #[schema(example = "binance")]
    pub exchange: String,
    #[schema(example = "BTCUSDT")]
    pub symbol: String,
    /// 以信号源 ID 为键
    pub sources: BTreeMap<String, SourceResponse>,
    pub update_time: i64,
    pub create_time: i64,
}

/// 单个信号源的多空持仓标志
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct PositionFlagsResponse {
    pub long: bool,
    pub short: bool,
}

/// 策略运行状态 DTO：持仓标志、聚合计数与待投递数量
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StrategyStateResponse {
    pub pos_states: BTreeMap<String, PositionFlagsResponse>,
    pub count_long: usize,
    pub count_short: usize,
    pub pending_long: usize,
    pub pending_short: usize,
    pub update_time: i64,
}

// ============================================================
//  领域模型 → DTO 惯用转换 (impl From<T>)
// ============================================================

impl From<Source> for SourceResponse {
    fn from(s: Source) -> Self {
        Self {
            id: s.id,
            name: s.name,
            active: s.active,
            update_time: s.update_time,
            create_time: s.create_time,
        }
    }
}

impl From<Strategy> for StrategyResponse {
    fn from(s: Strategy) -> Self {
        Self {
            id: s.id,
            name: s.name,
            enabled: s.enabled,
            hook_url: s.hook_url,
            exchange: s.exchange,
            symbol: s.symbol,
            sources: s
                .sources
                .into_iter()
                .map(|(id, source)| (id, source.into()))
                .collect(),
            update_time: s.update_time,
            create_time: s.create_time,
        }
    }
}

impl From<PositionFlags> for PositionFlagsResponse {
    fn from(f: PositionFlags) -> Self {
        Self {
            long: f.long,
            short: f.short,
        }
    }
}

impl StrategyStateResponse {
    pub fn new(state: PositionState, queue: &DeliveryQueue) -> Self {
        Self {
            count_long: state.count(Side::Long),
            count_short: state.count(Side::Short),
            pending_long: queue.side(Side::Long).len(),
            pending_short: queue.side(Side::Short).len(),
            update_time: state.update_time,
            pos_states: state
                .pos_states
                .into_iter()
                .map(|(id, flags)| (id, flags.into()))
                .collect(),
        }
    }
}
