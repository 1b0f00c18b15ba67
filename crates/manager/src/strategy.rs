use dashmap::DashMap;
use hookrelay_core::common::new_id;
use hookrelay_core::common::time::TimeProvider;
use hookrelay_core::signal::entity::{DeliveryQueue, DeliveryTask, FlagUpdate, ReportedSide, Side};
use hookrelay_core::store::error::StoreError;
use hookrelay_core::strategy::entity::{
    CONFIG_VERSION, PositionState, Source, Strategy, StrategyConfig,
};
use hookrelay_core::strategy::port::StrategyStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::aggregate::{self, Transition};
use crate::ingest::{self, SignalRules, extract_symbol};
use crate::persist::{PersistHandle, PersistTask};

/// # Summary
/// Manager 层的统一错误类型。
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Strategy not found: {0}")]
    StrategyNotFound(String),
    #[error("Source not found: {source_id} (strategy {strategy_id})")]
    SourceNotFound {
        strategy_id: String,
        source_id: String,
    },
    #[error("Invalid payload: {}", .0.join("; "))]
    InvalidPayload(Vec<String>),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// # Summary
/// 一次入站信号的处理结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 聚合计数跨越边界，已为每个迁移入队一条投递任务
    Emitted(Vec<Transition>),
    /// 标志未变化，无事发生
    Unchanged,
    /// 标的不含 `USDT`，静默丢弃
    Discarded,
    /// 策略已停用或信号源已停用
    Ignored,
}

/// # Summary
/// 创建策略的请求。
#[derive(Debug, Clone, Default)]
pub struct NewStrategy {
    pub name: String,
    pub hook_url: String,
    pub exchange: String,
    pub symbol: String,
    // 初始信号源名称列表
    pub sources: Vec<String>,
}

/// 策略可修改字段，`None` 表示保持不变
#[derive(Debug, Clone, Default)]
pub struct StrategyPatch {
    pub name: Option<String>,
    pub hook_url: Option<String>,
    pub enabled: Option<bool>,
}

/// 信号源可修改字段，`None` 表示保持不变
#[derive(Debug, Clone, Default)]
pub struct SourcePatch {
    pub name: Option<String>,
    pub active: Option<bool>,
}

/// # Summary
/// 投递循环需要的一条队首任务视图。
#[derive(Debug, Clone)]
pub struct PendingHead {
    pub strategy_id: String,
    pub side: Side,
    pub task: DeliveryTask,
    /// 策略当前的 `hook_url` (可能与入队时不同)
    pub url: String,
}

/// # Summary
/// 单个策略的全部内存状态，作为该策略的临界区。
struct StrategyEntry {
    strategy: Strategy,
    positions: PositionState,
    queue: DeliveryQueue,
    // 已从表中移除；持有旧引用的请求必须视其为不存在
    deleted: bool,
}

/// # Summary
/// 策略管理器，系统的应用服务层门面 (Facade)，也是策略、持仓状态与投递队列的唯一真实来源。
/// 编译期仅依赖 `hookrelay-core` 中的 Trait 定义，所有具体实现通过构造函数注入。
///
/// # Invariants
/// - 每个策略一把 `tokio::sync::Mutex`：同一策略的"快照-修改"序列严格串行，不同策略互不阻塞。
/// - 请求路径上不做磁盘或网络 I/O，只向持久化队列提交任务。
/// - 策略的持仓状态与投递队列随策略一起创建、一起销毁。
pub struct StrategyManager {
    clock: Arc<dyn TimeProvider>,
    rules: SignalRules,
    persist: PersistHandle,
    strategies: DashMap<String, Arc<Mutex<StrategyEntry>>>,
    // 配置文档首次创建的时间
    config_create_time: i64,
}

impl StrategyManager {
    /// # Summary
    /// 从持久化存储恢复全部策略并创建管理器。
    ///
    /// # Logic
    /// 1. 读取策略配置文档；不存在时创建空文档并提交一次落盘。
    /// 2. 逐个策略读取持仓状态与投递队列 (缺失视为空)。
    /// 3. 对齐持仓记录与信号源集合：补齐缺失，丢弃多余。
    /// 4. 持仓文档缺失或被对齐修改过的策略，提交一次持仓落盘。
    ///
    /// # Arguments
    /// * `store` - 持久化接口的具体实现。
    /// * `clock` - 时钟。
    /// * `rules` - 信号校验与载荷规则。
    /// * `persist` - 持久化任务入口。
    ///
    /// # Returns
    /// * `Result<Arc<Self>, ManagerError>` - 任何读取失败都视为启动失败。
    pub async fn load(
        store: Arc<dyn StrategyStore>,
        clock: Arc<dyn TimeProvider>,
        rules: SignalRules,
        persist: PersistHandle,
    ) -> Result<Arc<Self>, ManagerError> {
        let now = clock.now_secs();
        let (config, fresh) = match store.load_config().await? {
            Some(config) => (config, false),
            None => (StrategyConfig::empty(now), true),
        };

        let strategies = DashMap::new();
        let mut pending = 0;
        let mut stale_positions = Vec::new();
        for (id, mut strategy) in config.strategy {
            strategy.id.clone_from(&id);

            let positions = match store.load_position_state(&id).await? {
                Some(mut positions) => {
                    if positions.reconcile(&strategy.sources) {
                        stale_positions.push(id.clone());
                    }
                    positions
                }
                None => {
                    stale_positions.push(id.clone());
                    PositionState::for_sources(strategy.sources.keys(), now)
                }
            };

            let queue = store.load_delivery_queue(&id).await?.unwrap_or_default();
            pending += queue.len();

            strategies.insert(
                id,
                Arc::new(Mutex::new(StrategyEntry {
                    strategy,
                    positions,
                    queue,
                    deleted: false,
                })),
            );
        }

        let config_create_time = if config.create_time > 0 {
            config.create_time
        } else {
            now
        };

        let manager = Arc::new(Self {
            clock,
            rules,
            persist,
            strategies,
            config_create_time,
        });

        if fresh {
            manager.persist.request(PersistTask::StrategyConfig);
        }
        for id in &stale_positions {
            manager.persist.request(PersistTask::PositionState(id.clone()));
        }
        info!(
            strategies = manager.strategies.len(),
            pending_deliveries = pending,
            realigned_positions = stale_positions.len(),
            fresh,
            "strategy store loaded"
        );
        Ok(manager)
    }

    pub fn rules(&self) -> &SignalRules {
        &self.rules
    }

    fn entry(&self, strategy_id: &str) -> Result<Arc<Mutex<StrategyEntry>>, ManagerError> {
        self.strategies
            .get(strategy_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| ManagerError::StrategyNotFound(strategy_id.to_string()))
    }

    fn all_entries(&self) -> Vec<Arc<Mutex<StrategyEntry>>> {
        self.strategies.iter().map(|e| e.value().clone()).collect()
    }

    /// # Summary
    /// 处理一条入站信号：校验、聚合、入队。
    ///
    /// # Logic
    /// 1. 定位策略与信号源，任一不存在返回 NotFound。
    /// 2. 在策略临界区内解析并校验信号。
    /// 3. 策略或信号源已停用时接受请求但不改变状态。
    /// 4. 应用标志更新；对每个计数发生变化的方向入队一条投递任务。
    /// 5. 提交持仓状态与投递队列的落盘任务。
    ///
    /// # Arguments
    /// * `strategy_id` - 目标策略。
    /// * `source_id` - 上报的信号源。
    /// * `raw` - 逗号分隔的请求体原文。
    ///
    /// # Returns
    /// * `Result<IngestOutcome, ManagerError>`
    pub async fn ingest(
        &self,
        strategy_id: &str,
        source_id: &str,
        raw: &str,
    ) -> Result<IngestOutcome, ManagerError> {
        let entry = self.entry(strategy_id)?;
        let mut guard = entry.lock().await;
        let entry = &mut *guard;
        if entry.deleted {
            return Err(ManagerError::StrategyNotFound(strategy_id.to_string()));
        }

        let source_active = entry
            .strategy
            .sources
            .get(source_id)
            .map(|s| s.active)
            .ok_or_else(|| ManagerError::SourceNotFound {
                strategy_id: strategy_id.to_string(),
                source_id: source_id.to_string(),
            })?;

        let Some(signal) = ingest::parse_signal(raw, &entry.strategy, &self.rules)
            .map_err(ManagerError::InvalidPayload)?
        else {
            debug!(strategy_id, source_id, body = raw, "signal without USDT symbol discarded");
            return Ok(IngestOutcome::Discarded);
        };

        if !entry.strategy.enabled || !source_active {
            info!(
                strategy_id,
                source_id,
                strategy_enabled = entry.strategy.enabled,
                source_active,
                "signal ignored"
            );
            return Ok(IngestOutcome::Ignored);
        }

        let update = signal.flag_update(source_id);
        let transitions = self.apply_and_enqueue(entry, &update);
        if transitions.is_empty() {
            debug!(strategy_id, source_id, side = ?update.side, "position flags unchanged");
            return Ok(IngestOutcome::Unchanged);
        }

        self.persist
            .request(PersistTask::PositionState(strategy_id.to_string()));
        self.persist
            .request(PersistTask::DeliveryQueue(strategy_id.to_string()));
        Ok(IngestOutcome::Emitted(transitions))
    }

    /// 在已持有的临界区内应用标志更新，并为每个迁移入队投递任务
    fn apply_and_enqueue(&self, entry: &mut StrategyEntry, update: &FlagUpdate) -> Vec<Transition> {
        let now = self.clock.now_secs();
        let transitions = aggregate::apply_update(&mut entry.positions, update);
        for transition in &transitions {
            let task =
                aggregate::build_task(&entry.strategy, &update.source_id, transition, &self.rules, now);
            info!(
                strategy_id = %entry.strategy.id,
                source_id = %update.source_id,
                side = %transition.side,
                action = %transition.action,
                count = transition.count,
                task_id = %task.id,
                "signal enqueued"
            );
            entry.queue.push(task);
        }
        transitions
    }

    /// # Summary
    /// 创建策略，连同全部空仓的持仓状态与空投递队列。
    ///
    /// # Logic
    /// 1. 交易所转小写；标的转大写并在 `USDT` 之后截断，与入站信号的提取规则一致。
    /// 2. 为每个初始信号源分配 ID。
    /// 3. 提交配置、持仓状态、投递队列三类落盘任务。
    ///
    /// # Returns
    /// * `Result<Strategy, ManagerError>` - 标的不含 `USDT` 或交易所为空时返回 `InvalidInput`。
    pub async fn create_strategy(&self, req: NewStrategy) -> Result<Strategy, ManagerError> {
        let exchange = req.exchange.trim().to_lowercase();
        if exchange.is_empty() {
            return Err(ManagerError::InvalidInput("exchange is required".to_string()));
        }
        let symbol = extract_symbol(&req.symbol).ok_or_else(|| {
            ManagerError::InvalidInput(format!("symbol {:?} must contain USDT", req.symbol))
        })?;

        let now = self.clock.now_secs();
        let sources: BTreeMap<String, Source> = req
            .sources
            .into_iter()
            .map(|name| {
                let id = new_id();
                (
                    id.clone(),
                    Source {
                        id,
                        name,
                        active: true,
                        update_time: now,
                        create_time: now,
                    },
                )
            })
            .collect();

        let strategy = Strategy {
            id: new_id(),
            name: req.name,
            enabled: true,
            hook_url: req.hook_url.trim().to_string(),
            exchange,
            symbol,
            sources,
            update_time: now,
            create_time: now,
        };
        let positions = PositionState::for_sources(strategy.sources.keys(), now);

        self.strategies.insert(
            strategy.id.clone(),
            Arc::new(Mutex::new(StrategyEntry {
                strategy: strategy.clone(),
                positions,
                queue: DeliveryQueue::default(),
                deleted: false,
            })),
        );

        self.persist.request(PersistTask::StrategyConfig);
        self.persist
            .request(PersistTask::PositionState(strategy.id.clone()));
        self.persist
            .request(PersistTask::DeliveryQueue(strategy.id.clone()));

        info!(
            strategy_id = %strategy.id,
            symbol = %strategy.symbol,
            sources = strategy.sources.len(),
            "strategy created"
        );
        Ok(strategy)
    }

    /// 按 ID (即创建顺序) 列出全部策略
    pub async fn list_strategies(&self) -> Vec<Strategy> {
        let mut list = Vec::with_capacity(self.strategies.len());
        for entry in self.all_entries() {
            let guard = entry.lock().await;
            if !guard.deleted {
                list.push(guard.strategy.clone());
            }
        }
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub async fn get_strategy(&self, strategy_id: &str) -> Result<Strategy, ManagerError> {
        let entry = self.entry(strategy_id)?;
        let guard = entry.lock().await;
        live(&guard, strategy_id)?;
        Ok(guard.strategy.clone())
    }

    /// # Summary
    /// 修改策略的名称、Webhook 地址或启用状态。
    ///
    /// # Logic
    /// 只有字段实际发生变化时才更新 `update_time` 并提交配置落盘。
    pub async fn update_strategy(
        &self,
        strategy_id: &str,
        patch: StrategyPatch,
    ) -> Result<Strategy, ManagerError> {
        let entry = self.entry(strategy_id)?;
        let mut guard = entry.lock().await;
        live(&guard, strategy_id)?;

        let strategy = &mut guard.strategy;
        let mut changed = false;
        if let Some(name) = patch.name
            && name != strategy.name
        {
            strategy.name = name;
            changed = true;
        }
        if let Some(url) = patch.hook_url.map(|u| u.trim().to_string())
            && url != strategy.hook_url
        {
            strategy.hook_url = url;
            changed = true;
        }
        if let Some(enabled) = patch.enabled
            && enabled != strategy.enabled
        {
            strategy.enabled = enabled;
            changed = true;
        }

        if changed {
            strategy.update_time = self.clock.now_secs();
            self.persist.request(PersistTask::StrategyConfig);
            info!(strategy_id, enabled = strategy.enabled, "strategy updated");
        }
        Ok(strategy.clone())
    }

    /// # Summary
    /// 删除策略及其持仓状态、投递队列和落盘文档。
    ///
    /// # Logic
    /// 1. 从表中移除，随后的请求立即得到 NotFound。
    /// 2. 标记条目已删除，持有旧引用的请求与投递确认都会失效。
    /// 3. 提交配置落盘与 Purge 任务。
    pub async fn delete_strategy(&self, strategy_id: &str) -> Result<(), ManagerError> {
        let (_, entry) = self
            .strategies
            .remove(strategy_id)
            .ok_or_else(|| ManagerError::StrategyNotFound(strategy_id.to_string()))?;

        let mut guard = entry.lock().await;
        guard.deleted = true;
        let dropped = guard.queue.len();
        guard.queue = DeliveryQueue::default();
        drop(guard);

        self.persist.request(PersistTask::StrategyConfig);
        self.persist
            .request(PersistTask::Purge(strategy_id.to_string()));
        info!(strategy_id, dropped_deliveries = dropped, "strategy deleted");
        Ok(())
    }

    /// # Summary
    /// 为策略添加一个信号源，其持仓标志初始为空仓。
    ///
    /// # Arguments
    /// * `name` - 信号源名称，缺省时使用生成的 ID。
    pub async fn add_source(
        &self,
        strategy_id: &str,
        name: Option<String>,
    ) -> Result<Source, ManagerError> {
        let entry = self.entry(strategy_id)?;
        let mut guard = entry.lock().await;
        live(&guard, strategy_id)?;

        let now = self.clock.now_secs();
        let id = new_id();
        let source = Source {
            name: name.unwrap_or_else(|| id.clone()),
            id: id.clone(),
            active: true,
            update_time: now,
            create_time: now,
        };

        guard.strategy.sources.insert(id.clone(), source.clone());
        guard.strategy.update_time = now;
        guard.positions.pos_states.insert(id, Default::default());

        self.persist.request(PersistTask::StrategyConfig);
        self.persist
            .request(PersistTask::PositionState(strategy_id.to_string()));
        info!(strategy_id, source_id = %source.id, "source added");
        Ok(source)
    }

    pub async fn update_source(
        &self,
        strategy_id: &str,
        source_id: &str,
        patch: SourcePatch,
    ) -> Result<Source, ManagerError> {
        let entry = self.entry(strategy_id)?;
        let mut guard = entry.lock().await;
        live(&guard, strategy_id)?;

        let now = self.clock.now_secs();
        let entry = &mut *guard;
        let source = entry
            .strategy
            .sources
            .get_mut(source_id)
            .ok_or_else(|| ManagerError::SourceNotFound {
                strategy_id: strategy_id.to_string(),
                source_id: source_id.to_string(),
            })?;

        let mut changed = false;
        if let Some(name) = patch.name
            && name != source.name
        {
            source.name = name;
            changed = true;
        }
        if let Some(active) = patch.active
            && active != source.active
        {
            source.active = active;
            changed = true;
        }
        if changed {
            source.update_time = now;
        }

        let source = source.clone();
        if changed {
            entry.strategy.update_time = now;
            self.persist.request(PersistTask::StrategyConfig);
            info!(strategy_id, source_id, active = source.active, "source updated");
        }
        Ok(source)
    }

    /// # Summary
    /// 删除信号源。
    ///
    /// # Logic
    /// 1. 先让该信号源经状态机报告一次 `flat`，聚合计数下降时照常发出 decrease / close。
    /// 2. 再移除信号源及其持仓记录。
    ///
    /// # Returns
    /// * `Result<Vec<Transition>, ManagerError>` - 删除引起的状态迁移。
    pub async fn delete_source(
        &self,
        strategy_id: &str,
        source_id: &str,
    ) -> Result<Vec<Transition>, ManagerError> {
        let entry = self.entry(strategy_id)?;
        let mut guard = entry.lock().await;
        live(&guard, strategy_id)?;
        let entry = &mut *guard;

        if !entry.strategy.sources.contains_key(source_id) {
            return Err(ManagerError::SourceNotFound {
                strategy_id: strategy_id.to_string(),
                source_id: source_id.to_string(),
            });
        }

        let flat = FlagUpdate {
            source_id: source_id.to_string(),
            side: ReportedSide::Flat,
            opened: false,
        };
        let transitions = self.apply_and_enqueue(entry, &flat);

        entry.strategy.sources.remove(source_id);
        entry.positions.pos_states.remove(source_id);
        entry.strategy.update_time = self.clock.now_secs();

        self.persist.request(PersistTask::StrategyConfig);
        self.persist
            .request(PersistTask::PositionState(strategy_id.to_string()));
        if !transitions.is_empty() {
            self.persist
                .request(PersistTask::DeliveryQueue(strategy_id.to_string()));
        }
        info!(strategy_id, source_id, transitions = transitions.len(), "source deleted");
        Ok(transitions)
    }

    pub async fn get_position_state(&self, strategy_id: &str) -> Result<PositionState, ManagerError> {
        let entry = self.entry(strategy_id)?;
        let guard = entry.lock().await;
        live(&guard, strategy_id)?;
        Ok(guard.positions.clone())
    }

    pub async fn pending_deliveries(&self, strategy_id: &str) -> Result<DeliveryQueue, ManagerError> {
        let entry = self.entry(strategy_id)?;
        let guard = entry.lock().await;
        live(&guard, strategy_id)?;
        Ok(guard.queue.clone())
    }

    /// # Summary
    /// 生成策略配置文档的当前快照。
    ///
    /// # Arguments
    /// * `now` - 刷盘时间，写入文档的 `update_time`。
    pub async fn config_snapshot(&self, now: i64) -> StrategyConfig {
        let mut strategy = BTreeMap::new();
        for entry in self.all_entries() {
            let guard = entry.lock().await;
            if !guard.deleted {
                strategy.insert(guard.strategy.id.clone(), guard.strategy.clone());
            }
        }
        StrategyConfig {
            version: CONFIG_VERSION.to_string(),
            strategy,
            update_time: now,
            create_time: self.config_create_time,
        }
    }

    /// 刷盘用的持仓状态快照，并在内存中戳记 `update_time`；策略不存在时为 `None`
    pub async fn position_snapshot(&self, strategy_id: &str, now: i64) -> Option<PositionState> {
        let entry = self.entry(strategy_id).ok()?;
        let mut guard = entry.lock().await;
        if guard.deleted {
            return None;
        }
        guard.positions.update_time = now;
        Some(guard.positions.clone())
    }

    pub async fn queue_snapshot(&self, strategy_id: &str) -> Option<DeliveryQueue> {
        let entry = self.entry(strategy_id).ok()?;
        let guard = entry.lock().await;
        if guard.deleted {
            return None;
        }
        Some(guard.queue.clone())
    }

    /// # Summary
    /// 收集所有非空 (策略, 方向) 队列的队首任务。
    ///
    /// # Returns
    /// * `Vec<PendingHead>` - 每个队列至多一条，附带策略当前的 `hook_url`。
    pub async fn pending_heads(&self) -> Vec<PendingHead> {
        let mut heads = Vec::new();
        for entry in self.all_entries() {
            let guard = entry.lock().await;
            if guard.deleted {
                continue;
            }
            for side in Side::ALL {
                if let Some(task) = guard.queue.head(side) {
                    heads.push(PendingHead {
                        strategy_id: guard.strategy.id.clone(),
                        side,
                        task: task.clone(),
                        url: guard.strategy.hook_url.clone(),
                    });
                }
            }
        }
        heads
    }

    /// # Summary
    /// 下游确认后弹出队首任务。
    ///
    /// # Logic
    /// 仅当队首仍是该任务时弹出 (策略可能已在投递期间被删除)，并提交投递队列落盘。
    ///
    /// # Returns
    /// * `bool` - 是否实际弹出。
    pub async fn acknowledge(&self, strategy_id: &str, side: Side, task_id: &str) -> bool {
        let Ok(entry) = self.entry(strategy_id) else {
            return false;
        };
        let mut guard = entry.lock().await;
        if guard.deleted || !guard.queue.pop_if_head(side, task_id) {
            return false;
        }
        self.persist
            .request(PersistTask::DeliveryQueue(strategy_id.to_string()));
        true
    }
}

fn live(entry: &StrategyEntry, strategy_id: &str) -> Result<(), ManagerError> {
    if entry.deleted {
        return Err(ManagerError::StrategyNotFound(strategy_id.to_string()));
    }
    Ok(())
}
