//! # 测试替身
//!
//! 仅在 `test-utils` feature 下编译，供下游 crate 的集成测试注入内存实现。

use crate::notify::error::NotifyError;
use crate::notify::port::WebhookSender;
use crate::signal::entity::{DeliveryQueue, Side, SignalPayload};
use crate::store::error::StoreError;
use crate::strategy::entity::{PositionState, StrategyConfig};
use crate::strategy::port::StrategyStore;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};

/// # Summary
/// 基于内存的 `StrategyStore` 实现，可注入写失败。
///
/// # Invariants
/// - `fail_writes` 为真时所有写操作返回 `StoreError::Io`，读操作不受影响。
/// - `writes` 统计成功写入次数，用于验证合并刷盘。
#[derive(Default)]
pub struct MemoryStrategyStore {
    config: RwLock<Option<StrategyConfig>>,
    positions: DashMap<String, PositionState>,
    queues: DashMap<String, DeliveryQueue>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStrategyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开或关闭写失败注入
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 成功写入的累计次数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn config_snapshot(&self) -> Option<StrategyConfig> {
        self.config.read().await.clone()
    }

    pub fn position_snapshot(&self, strategy_id: &str) -> Option<PositionState> {
        self.positions.get(strategy_id).map(|v| v.value().clone())
    }

    pub fn queue_snapshot(&self, strategy_id: &str) -> Option<DeliveryQueue> {
        self.queues.get(strategy_id).map(|v| v.value().clone())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io("injected write failure".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl StrategyStore for MemoryStrategyStore {
    async fn load_config(&self) -> Result<Option<StrategyConfig>, StoreError> {
        Ok(self.config.read().await.clone())
    }

    async fn save_config(&self, config: &StrategyConfig) -> Result<(), StoreError> {
        self.check_write()?;
        *self.config.write().await = Some(config.clone());
        Ok(())
    }

    async fn load_position_state(
        &self,
        strategy_id: &str,
    ) -> Result<Option<PositionState>, StoreError> {
        Ok(self.position_snapshot(strategy_id))
    }

    async fn save_position_state(
        &self,
        strategy_id: &str,
        state: &PositionState,
    ) -> Result<(), StoreError> {
        self.check_write()?;
        self.positions.insert(strategy_id.to_string(), state.clone());
        Ok(())
    }

    async fn load_delivery_queue(
        &self,
        strategy_id: &str,
    ) -> Result<Option<DeliveryQueue>, StoreError> {
        Ok(self.queue_snapshot(strategy_id))
    }

    async fn save_delivery_queue(
        &self,
        strategy_id: &str,
        queue: &DeliveryQueue,
    ) -> Result<(), StoreError> {
        self.check_write()?;
        self.queues.insert(strategy_id.to_string(), queue.clone());
        Ok(())
    }

    async fn purge(&self, strategy_id: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.positions.remove(strategy_id);
        self.queues.remove(strategy_id);
        Ok(())
    }
}

/// # Summary
/// 记录所有推送调用的 `WebhookSender` 替身，可让前 N 次调用失败，
/// 也可让某个 (url, side) 路由持续失败。
#[derive(Default)]
pub struct RecordingWebhookSender {
    delivered: Mutex<Vec<(String, SignalPayload)>>,
    failures_left: AtomicUsize,
    broken_routes: DashSet<(String, Side)>,
    attempts: AtomicUsize,
}

impl RecordingWebhookSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让接下来的 `n` 次调用返回失败
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// 让发往 `url` 且方向为 `side` 的调用一直失败
    pub fn fail_route(&self, url: &str, side: Side) {
        self.broken_routes.insert((url.to_string(), side));
    }

    /// 已确认送达的 (url, payload) 列表，按送达顺序
    pub async fn delivered(&self) -> Vec<(String, SignalPayload)> {
        self.delivered.lock().await.clone()
    }

    /// 包含失败在内的调用总次数
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookSender for RecordingWebhookSender {
    async fn send(&self, url: &str, payload: &SignalPayload) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self.broken_routes.contains(&(url.to_string(), payload.side))
            || self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if failing {
            return Err(NotifyError::Status {
                status: 503,
                body: "injected failure".to_string(),
            });
        }
        self.delivered
            .lock()
            .await
            .push((url.to_string(), payload.clone()));
        Ok(())
    }
}
