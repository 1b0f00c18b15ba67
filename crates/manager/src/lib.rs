//! # `hookrelay-manager` - 信号聚合与可靠投递引擎
//!
//! - [`ingest`]：解析并校验入站的逗号分隔信号
//! - [`aggregate`]：按信号源计数的多空聚合状态机
//! - [`strategy`]：策略存储门面 (Facade)，串行化单个策略的所有变更
//! - [`persist`]：去抖合并的后台持久化队列
//! - [`delivery`]：按 (策略, 方向) 严格有序、确认前无限重试的投递队列

pub mod aggregate;
pub mod delivery;
pub mod ingest;
pub mod persist;
pub mod strategy;
