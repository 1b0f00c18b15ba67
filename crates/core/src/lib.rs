//! # `hookrelay-core` - 领域模型与端口定义
//!
//! 本 crate 只描述"是什么"，不关心"怎么做"：
//! - 实体：策略 (Strategy)、信号源 (Source)、持仓状态 (PositionState)、投递任务 (DeliveryTask)
//! - 端口：持久化 (`StrategyStore`)、下游推送 (`WebhookSender`)、时钟 (`TimeProvider`)
//!
//! 所有具体实现位于 `hookrelay-store`、`hookrelay-notify` 等适配器 crate 中，
//! 由 `hookrelay-app` 在启动时注入。

pub mod common;
pub mod config;

pub mod strategy {
    pub mod entity;
    pub mod port;
}

pub mod signal {
    pub mod entity;
}

pub mod store {
    pub mod error;
}

pub mod notify {
    pub mod error;
    pub mod port;
}

#[cfg(feature = "test-utils")]
pub mod testing;
