//! # `hookrelay-store` - 文档式持久化适配器
//!
//! 以 JSON 文档的形式实现 `StrategyStore` 端口：
//! - `<root>/strategy.json`：全局策略配置
//! - `<root>/<strategy_id>/state.json`：持仓状态
//! - `<root>/<strategy_id>/queue.json`：待投递队列

pub mod layout;
pub mod strategy;
