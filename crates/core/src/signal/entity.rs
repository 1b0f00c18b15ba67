use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// # Summary
/// 持仓方向。聚合计数与投递队列都按此维度独立拆分。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// 全部方向，按固定顺序迭代
    pub const ALL: [Side; 2] = [Side::Long, Side::Short];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// 上游信号源上报的方向，`Flat` 表示该信号源已空仓。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedSide {
    Long,
    Short,
    Flat,
}

impl std::str::FromStr for ReportedSide {
    type Err = String;

    /// 别名表：只接受已知的多/空/平写法，大小写不敏感。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long" | "buy" | "bull" | "bullish" => Ok(ReportedSide::Long),
            "short" | "sell" | "bear" | "bearish" => Ok(ReportedSide::Short),
            "flat" | "close" | "exit" | "none" | "neutral" => Ok(ReportedSide::Flat),
            _ => Err(format!("Unknown side: {}", s)),
        }
    }
}

/// # Summary
/// 聚合计数跨越边界时产生的动作。动作是状态迁移，而不是状态本身。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Open,
    Increase,
    Decrease,
    Close,
}

impl Action {
    /// # Summary
    /// 根据某一方向的前后聚合计数推导动作。
    ///
    /// # Logic
    /// 1. 计数未变化：无动作。
    /// 2. 计数上升：原计数为 0 则 `Open`，否则 `Increase`。
    /// 3. 计数下降：新计数为 0 则 `Close`，否则 `Decrease`。
    ///
    /// # Arguments
    /// * `prev` - 本轮更新前的计数快照。
    /// * `next` - 本轮更新后的计数。
    ///
    /// # Returns
    /// * `Option<Action>` - 未跨越边界时为 `None`。
    pub fn from_counts(prev: usize, next: usize) -> Option<Action> {
        use std::cmp::Ordering;
        match next.cmp(&prev) {
            Ordering::Equal => None,
            Ordering::Greater if prev > 0 => Some(Action::Increase),
            Ordering::Greater => Some(Action::Open),
            Ordering::Less if next > 0 => Some(Action::Decrease),
            Ordering::Less => Some(Action::Close),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Open => write!(f, "open"),
            Action::Increase => write!(f, "increase"),
            Action::Decrease => write!(f, "decrease"),
            Action::Close => write!(f, "close"),
        }
    }
}

/// # Summary
/// 校验通过后的单条持仓标志更新。
///
/// # Invariants
/// - `side == Flat` 时 `opened` 恒为 `false`，并同时清除该信号源的多空两个标志。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagUpdate {
    pub source_id: String,
    pub side: ReportedSide,
    pub opened: bool,
}

/// # Summary
/// 推送给下游 Webhook 的信号载荷 (带版本号)。
///
/// # Invariants
/// - 一经入队即不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub version: String,
    pub exchange: String,
    pub symbol: String,
    pub side: Side,
    pub action: Action,
    pub safe_interval: u64,
    pub time: i64,
}

/// # Summary
/// 一条待下游确认的投递任务。
///
/// # Invariants
/// - 不可变；队列只会在收到 200 确认后从头部移除。
/// - `url` 记录入队时策略的 `hook_url`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub id: String,
    pub strategy_id: String,
    pub source_id: String,
    pub url: String,
    pub payload: SignalPayload,
    pub enqueue_time: i64,
}

/// # Summary
/// 单个策略的两条投递队列 (多/空各一条 FIFO)，同时也是落盘文档格式 `{long:[...], short:[...]}`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryQueue {
    #[serde(default)]
    pub long: VecDeque<DeliveryTask>,
    #[serde(default)]
    pub short: VecDeque<DeliveryTask>,
}

impl DeliveryQueue {
    pub fn side(&self, side: Side) -> &VecDeque<DeliveryTask> {
        match side {
            Side::Long => &self.long,
            Side::Short => &self.short,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut VecDeque<DeliveryTask> {
        match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        }
    }

    /// 追加到指定方向队尾
    pub fn push(&mut self, task: DeliveryTask) {
        let side = task.payload.side;
        self.side_mut(side).push_back(task);
    }

    /// 查看指定方向的队首任务
    pub fn head(&self, side: Side) -> Option<&DeliveryTask> {
        self.side(side).front()
    }

    /// # Summary
    /// 仅当队首仍是指定任务时将其弹出。
    ///
    /// # Logic
    /// 投递在锁外进行，期间队列可能被清空或重建；按 id 比对避免误删后继任务。
    ///
    /// # Returns
    /// * `bool` - 是否实际弹出。
    pub fn pop_if_head(&mut self, side: Side, task_id: &str) -> bool {
        let queue = self.side_mut(side);
        if queue.front().is_some_and(|t| t.id == task_id) {
            queue.pop_front();
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.long.len() + self.short.len()
    }

    pub fn is_empty(&self) -> bool {
        self.long.is_empty() && self.short.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, side: Side) -> DeliveryTask {
        DeliveryTask {
            id: id.to_string(),
            strategy_id: "s1".to_string(),
            source_id: "src1".to_string(),
            url: "http://localhost/hook".to_string(),
            payload: SignalPayload {
                version: "1".to_string(),
                exchange: "binance".to_string(),
                symbol: "BTCUSDT".to_string(),
                side,
                action: Action::Open,
                safe_interval: 60,
                time: 0,
            },
            enqueue_time: 0,
        }
    }

    #[test]
    fn test_action_from_counts() {
        assert_eq!(Action::from_counts(0, 0), None);
        assert_eq!(Action::from_counts(2, 2), None);
        assert_eq!(Action::from_counts(0, 1), Some(Action::Open));
        assert_eq!(Action::from_counts(1, 2), Some(Action::Increase));
        assert_eq!(Action::from_counts(2, 1), Some(Action::Decrease));
        assert_eq!(Action::from_counts(1, 0), Some(Action::Close));
        assert_eq!(Action::from_counts(0, 2), Some(Action::Open));
        assert_eq!(Action::from_counts(2, 0), Some(Action::Close));
    }

    #[test]
    fn test_reported_side_aliases() {
        assert_eq!("LONG".parse::<ReportedSide>(), Ok(ReportedSide::Long));
        assert_eq!("bearish".parse::<ReportedSide>(), Ok(ReportedSide::Short));
        assert_eq!("Flat".parse::<ReportedSide>(), Ok(ReportedSide::Flat));
        assert!("sideways".parse::<ReportedSide>().is_err());
    }

    #[test]
    fn test_queue_sides_are_independent() {
        let mut q = DeliveryQueue::default();
        q.push(task("a", Side::Long));
        q.push(task("b", Side::Short));
        q.push(task("c", Side::Long));

        assert_eq!(q.len(), 3);
        assert_eq!(q.head(Side::Long).map(|t| t.id.as_str()), Some("a"));
        assert_eq!(q.head(Side::Short).map(|t| t.id.as_str()), Some("b"));

        // 非队首任务不可弹出
        assert!(!q.pop_if_head(Side::Long, "c"));
        assert!(q.pop_if_head(Side::Long, "a"));
        assert_eq!(q.head(Side::Long).map(|t| t.id.as_str()), Some("c"));
        assert_eq!(q.side(Side::Short).len(), 1);
    }

    #[test]
    fn test_payload_wire_format() {
        let json = serde_json::to_value(&task("a", Side::Short).payload).unwrap();
        assert_eq!(json["side"], "short");
        assert_eq!(json["action"], "open");
        assert_eq!(json["version"], "1");
        assert_eq!(json["safe_interval"], 60);
    }
}
