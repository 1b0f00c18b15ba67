//! # `hookrelay-api` - HTTP 接入层
//!
//! 本 crate 是 HookRelay 信号中继的 HTTP 服务入口。
//! 使用 `axum` 构建路由与控制器，通过 `utoipa` 自动生成 OpenAPI 3.0 Swagger 文档。
//!
//! ## 架构职责
//! - 接收信号源的纯文本上报并交给 `StrategyManager` 聚合
//! - 签发与校验会话令牌，保护策略管理接口
//! - 将领域模型转换为 DTO 返回给管理端

pub mod error;
pub mod server;
pub mod token;
pub mod types;

pub mod middleware {
    pub mod auth;
}

pub mod routes {
    pub mod auth;
    pub mod hook;
    pub mod strategy;
}
