use hookrelay_core::notify::error::NotifyError;
use hookrelay_core::notify::port::WebhookSender;
use hookrelay_core::signal::entity::Side;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::strategy::StrategyManager;

/// `tokio::time::interval` 不接受零周期
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// 一次正在进行的下游调用
#[derive(Debug, Clone)]
struct InFlight {
    strategy_id: String,
    side: Side,
    task_id: String,
}

type Completion = Result<(task::Id, Result<(), NotifyError>), JoinError>;

/// # Summary
/// 后台投递循环：每个 (策略, 方向) 队列只投递队首，确认前无限重试。
///
/// # Invariants
/// - 同一 (策略, 方向) 任意时刻至多一个在途调用，保证方向内严格有序。
/// - 只有下游返回 200 才会弹出队首；失败的任务留在原位，下个周期重试。
/// - 不同策略、同一策略的两个方向之间互不阻塞。
pub struct DeliveryWorker {
    manager: Arc<StrategyManager>,
    sender: Arc<dyn WebhookSender>,
    interval: Duration,
}

impl DeliveryWorker {
    pub fn new(
        manager: Arc<StrategyManager>,
        sender: Arc<dyn WebhookSender>,
        interval: Duration,
    ) -> Self {
        Self {
            manager,
            sender,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// # Summary
    /// 运行投递循环，直到收到关闭信号。
    ///
    /// # Logic
    /// 1. 每个周期为所有非空且空闲的队列派发一次队首投递。
    /// 2. 调用完成时按结果确认或保留队首，并释放该队列。
    /// 3. 收到关闭信号后不再派发，等待在途调用全部结束。
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut running: JoinSet<Result<(), NotifyError>> = JoinSet::new();
        let mut in_flight: HashMap<task::Id, InFlight> = HashMap::new();
        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "delivery worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.dispatch(&mut running, &mut in_flight).await;
                }
                Some(done) = running.join_next_with_id(), if !running.is_empty() => {
                    self.complete(done, &mut in_flight).await;
                }
            }
        }

        if !running.is_empty() {
            info!(in_flight = running.len(), "waiting for in-flight deliveries");
        }
        while let Some(done) = running.join_next_with_id().await {
            self.complete(done, &mut in_flight).await;
        }
        info!("delivery worker stopped");
    }

    async fn dispatch(
        &self,
        running: &mut JoinSet<Result<(), NotifyError>>,
        in_flight: &mut HashMap<task::Id, InFlight>,
    ) {
        let busy: HashSet<(&str, Side)> = in_flight
            .values()
            .map(|f| (f.strategy_id.as_str(), f.side))
            .collect();

        let mut started = Vec::new();
        for head in self.manager.pending_heads().await {
            if busy.contains(&(head.strategy_id.as_str(), head.side)) {
                continue;
            }

            debug!(
                strategy_id = %head.strategy_id,
                side = %head.side,
                task_id = %head.task.id,
                action = %head.task.payload.action,
                "delivering signal"
            );

            let sender = self.sender.clone();
            let url = head.url;
            let payload = head.task.payload;
            let handle = running.spawn(async move { sender.send(&url, &payload).await });
            started.push((
                handle.id(),
                InFlight {
                    strategy_id: head.strategy_id,
                    side: head.side,
                    task_id: head.task.id,
                },
            ));
        }
        in_flight.extend(started);
    }

    async fn complete(&self, done: Completion, in_flight: &mut HashMap<task::Id, InFlight>) {
        match done {
            Ok((id, result)) => {
                let Some(flight) = in_flight.remove(&id) else {
                    return;
                };
                match result {
                    Ok(()) => {
                        let popped = self
                            .manager
                            .acknowledge(&flight.strategy_id, flight.side, &flight.task_id)
                            .await;
                        info!(
                            strategy_id = %flight.strategy_id,
                            side = %flight.side,
                            task_id = %flight.task_id,
                            popped,
                            "signal delivered"
                        );
                    }
                    Err(e) => {
                        warn!(
                            strategy_id = %flight.strategy_id,
                            side = %flight.side,
                            task_id = %flight.task_id,
                            error = %e,
                            "delivery failed, will retry"
                        );
                    }
                }
            }
            Err(e) => {
                let flight = in_flight.remove(&e.id());
                error!(flight = ?flight, error = %e, "delivery task aborted");
            }
        }
    }
}
