use crate::signal::entity::DeliveryQueue;
use crate::store::error::StoreError;
use crate::strategy::entity::{PositionState, StrategyConfig};
use async_trait::async_trait;

/// # Summary
/// 策略配置、持仓状态与投递队列的持久化接口。
///
/// # Invariants
/// - 实现类必须保证线程安全 (`Send` + `Sync`)。
/// - 每次保存都是对"当前内存真相"的整体覆盖，重复保存无副作用。
/// - 读取不存在的文档返回 `Ok(None)`，而非错误。
#[async_trait]
pub trait StrategyStore: Send + Sync {
    /// # Summary
    /// 读取全局策略配置文档。
    ///
    /// # Returns
    /// * `Result<Option<StrategyConfig>, StoreError>` - 首次启动时为 `None`。
    async fn load_config(&self) -> Result<Option<StrategyConfig>, StoreError>;

    /// # Summary
    /// 覆盖写入全局策略配置文档。
    ///
    /// # Arguments
    /// * `config` - 当前完整的策略配置。
    async fn save_config(&self, config: &StrategyConfig) -> Result<(), StoreError>;

    /// # Summary
    /// 读取指定策略的持仓状态文档。
    ///
    /// # Arguments
    /// * `strategy_id` - 策略 ID。
    async fn load_position_state(
        &self,
        strategy_id: &str,
    ) -> Result<Option<PositionState>, StoreError>;

    /// # Summary
    /// 覆盖写入指定策略的持仓状态文档。
    ///
    /// # Arguments
    /// * `strategy_id` - 策略 ID。
    /// * `state` - 当前持仓状态。
    async fn save_position_state(
        &self,
        strategy_id: &str,
        state: &PositionState,
    ) -> Result<(), StoreError>;

    /// # Summary
    /// 读取指定策略的待投递队列文档。
    ///
    /// # Arguments
    /// * `strategy_id` - 策略 ID。
    async fn load_delivery_queue(
        &self,
        strategy_id: &str,
    ) -> Result<Option<DeliveryQueue>, StoreError>;

    /// # Summary
    /// 覆盖写入指定策略的待投递队列文档。
    ///
    /// # Arguments
    /// * `strategy_id` - 策略 ID。
    /// * `queue` - 当前多空两条队列。
    async fn save_delivery_queue(
        &self,
        strategy_id: &str,
        queue: &DeliveryQueue,
    ) -> Result<(), StoreError>;

    /// # Summary
    /// 删除指定策略的全部落盘文档 (持仓状态与投递队列)。
    ///
    /// # Logic
    /// 文档不存在视为成功。
    ///
    /// # Arguments
    /// * `strategy_id` - 策略 ID。
    async fn purge(&self, strategy_id: &str) -> Result<(), StoreError>;
}
