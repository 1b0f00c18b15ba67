use hookrelay_core::common::time::TimeProvider;
use hookrelay_core::store::error::StoreError;
use hookrelay_core::strategy::port::StrategyStore;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::strategy::StrategyManager;

/// `tokio::time::interval` 不接受零周期
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// # Summary
/// 持久化任务：只描述"哪一类文档需要重新落盘"，不携带数据。
/// 刷盘时总是重新序列化当前内存中的真实状态，因此重复任务可以无害合并。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistTask {
    /// 全局策略配置文档
    StrategyConfig,
    /// 指定策略的持仓状态文档
    PositionState(String),
    /// 指定策略的投递队列文档
    DeliveryQueue(String),
    /// 删除指定策略的全部落盘文档
    Purge(String),
}

/// # Summary
/// 请求方持有的持久化任务入口，可任意克隆。
///
/// # Invariants
/// - 发送永不阻塞；请求路径只投递任务，不做任何磁盘 I/O。
#[derive(Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<PersistTask>,
}

impl PersistHandle {
    /// 提交一个持久化任务，等待下一次唤醒时处理
    pub fn request(&self, task: PersistTask) {
        if let Err(e) = self.tx.send(task) {
            warn!(task = ?e.0, "persist worker is gone, task dropped");
        }
    }
}

/// 创建持久化任务通道
pub fn channel() -> (PersistHandle, mpsc::UnboundedReceiver<PersistTask>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PersistHandle { tx }, rx)
}

/// # Summary
/// 去抖合并的后台持久化写入器。
///
/// # Invariants
/// - 按固定周期唤醒，任务本身只负责排队。
/// - 队首连续相同的任务合并为一次刷盘。
/// - 写失败时任务放回队首，下次唤醒重试，节奏不变，永不静默丢弃。
pub struct PersistWorker {
    manager: Arc<StrategyManager>,
    store: Arc<dyn StrategyStore>,
    clock: Arc<dyn TimeProvider>,
    rx: mpsc::UnboundedReceiver<PersistTask>,
    pending: VecDeque<PersistTask>,
    interval: Duration,
}

impl PersistWorker {
    pub fn new(
        manager: Arc<StrategyManager>,
        store: Arc<dyn StrategyStore>,
        clock: Arc<dyn TimeProvider>,
        rx: mpsc::UnboundedReceiver<PersistTask>,
        interval: Duration,
    ) -> Self {
        Self {
            manager,
            store,
            clock,
            rx,
            pending: VecDeque::new(),
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// 尚未成功落盘的任务数
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// # Summary
    /// 运行持久化循环，直到收到关闭信号。
    ///
    /// # Logic
    /// 1. 每个周期收取通道中的新任务并尝试刷盘。
    /// 2. 收到关闭信号后，再做一次收取与刷盘，尽量保住最后一次状态迁移。
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "persist worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.flush_pending().await;
                }
            }
        }

        self.flush_pending().await;
        if self.pending.is_empty() {
            info!("persist worker stopped, all documents flushed");
        } else {
            warn!(pending = self.pending.len(), "persist worker stopped with unflushed tasks");
        }
    }

    /// # Summary
    /// 收取新任务并按顺序刷盘，直到队列为空或遇到写失败。
    ///
    /// # Logic
    /// 1. 弹出队首任务，并吞掉紧随其后的相同任务 (合并)。
    /// 2. 刷盘成功则继续处理下一个。
    /// 3. 刷盘失败则把任务放回队首并结束本轮。
    ///
    /// # Returns
    /// * `usize` - 本轮实际执行成功的刷盘次数。
    pub async fn flush_pending(&mut self) -> usize {
        while let Ok(task) = self.rx.try_recv() {
            self.pending.push_back(task);
        }

        let mut flushed = 0;
        while let Some(task) = self.pending.pop_front() {
            let mut merged = 0;
            while self.pending.front() == Some(&task) {
                self.pending.pop_front();
                merged += 1;
            }

            match self.flush(&task).await {
                Ok(()) => {
                    debug!(task = ?task, merged, "persist task flushed");
                    flushed += 1;
                }
                Err(e) => {
                    warn!(task = ?task, error = %e, "persist flush failed, will retry");
                    self.pending.push_front(task);
                    break;
                }
            }
        }
        flushed
    }

    async fn flush(&self, task: &PersistTask) -> Result<(), StoreError> {
        let now = self.clock.now_secs();
        match task {
            PersistTask::StrategyConfig => {
                let config = self.manager.config_snapshot(now).await;
                self.store.save_config(&config).await
            }
            PersistTask::PositionState(id) => {
                // 策略已删除时以 Purge 为准
                match self.manager.position_snapshot(id, now).await {
                    Some(state) => self.store.save_position_state(id, &state).await,
                    None => Ok(()),
                }
            }
            PersistTask::DeliveryQueue(id) => match self.manager.queue_snapshot(id).await {
                Some(queue) => self.store.save_delivery_queue(id, &queue).await,
                None => Ok(()),
            },
            PersistTask::Purge(id) => self.store.purge(id).await,
        }
    }
}
