use crate::signal::entity::{ReportedSide, Side};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 策略配置文档的当前版本号
pub const CONFIG_VERSION: &str = "1";

/// # Summary
/// 信号源：一个被允许为策略上报多空意图的独立信号来源 (如某个指标或机器人)。
///
/// # Invariants
/// - `id` 在所属策略内唯一。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub update_time: i64,
    pub create_time: i64,
}

/// # Summary
/// `Strategy` 聚合根：一个交易目标 (交易所 + 标的 + 下游 Webhook)，汇聚多个信号源。
///
/// # Invariants
/// - `id` 全局唯一、按创建时间单调可排序、永不复用。
/// - `exchange` 创建时转为小写，`symbol` 创建时转为大写，之后不可修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub hook_url: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub sources: BTreeMap<String, Source>,
    pub update_time: i64,
    pub create_time: i64,
}

/// # Summary
/// 策略配置落盘文档 `{version, strategy, update_time, create_time}`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub strategy: BTreeMap<String, Strategy>,
    pub update_time: i64,
    #[serde(default)]
    pub create_time: i64,
}

impl StrategyConfig {
    pub fn empty(now: i64) -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            strategy: BTreeMap::new(),
            update_time: now,
            create_time: now,
        }
    }
}

/// 单个信号源当前是否持有多/空仓位
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionFlags {
    pub long: bool,
    pub short: bool,
}

impl PositionFlags {
    pub fn get(&self, side: Side) -> bool {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }
}

/// # Summary
/// 策略的持仓状态，同时也是落盘文档 `{pos_states, update_time}`。
///
/// # Invariants
/// - 策略的每个信号源在 `pos_states` 中恰有一条记录。
/// - 聚合计数 (`count`) 只由标志推导，从不单独存储。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    #[serde(default)]
    pub pos_states: BTreeMap<String, PositionFlags>,
    #[serde(default)]
    pub update_time: i64,
}

impl PositionState {
    /// 为一组信号源创建全部空仓的状态
    pub fn for_sources<'a>(ids: impl IntoIterator<Item = &'a String>, now: i64) -> Self {
        Self {
            pos_states: ids
                .into_iter()
                .map(|id| (id.clone(), PositionFlags::default()))
                .collect(),
            update_time: now,
        }
    }

    /// 当前在指定方向上持仓的信号源数量
    pub fn count(&self, side: Side) -> usize {
        self.pos_states.values().filter(|f| f.get(side)).count()
    }

    /// # Summary
    /// 将一次标志更新写入对应信号源。
    ///
    /// # Logic
    /// - `Long` / `Short`：仅整体替换该方向的标志，另一方向保持不变。
    /// - `Flat`：同时清除多空两个标志。
    ///
    /// # Arguments
    /// * `source_id` - 上报的信号源。
    /// * `side` - 上报方向。
    /// * `opened` - 该方向是否持仓 (`Flat` 时忽略)。
    pub fn apply(&mut self, source_id: &str, side: ReportedSide, opened: bool) {
        let flags = self.pos_states.entry(source_id.to_string()).or_default();
        match side {
            ReportedSide::Long => flags.long = opened,
            ReportedSide::Short => flags.short = opened,
            ReportedSide::Flat => *flags = PositionFlags::default(),
        }
    }

    /// # Summary
    /// 使持仓记录与信号源集合保持一一对应。
    ///
    /// # Logic
    /// 1. 为缺失记录的信号源补充空仓记录。
    /// 2. 丢弃不再属于策略的信号源记录。
    ///
    /// # Returns
    /// * `bool` - 记录集合是否发生了变化。
    pub fn reconcile(&mut self, sources: &BTreeMap<String, Source>) -> bool {
        let before = self.pos_states.len();
        self.pos_states.retain(|id, _| sources.contains_key(id));
        let mut changed = self.pos_states.len() != before;
        for id in sources.keys() {
            if !self.pos_states.contains_key(id) {
                self.pos_states.insert(id.clone(), PositionFlags::default());
                changed = true;
            }
        }
        changed
    }
}

fn default_true() -> bool {
    true
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str) -> Source {
        Source {
            id: id.to_string(),
            name: id.to_string(),
            active: true,
            update_time: 0,
            create_time: 0,
        }
    }

    #[test]
    fn test_counts_are_derived_per_side() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut state = PositionState::for_sources(&ids, 0);
        state.apply("a", ReportedSide::Long, true);
        state.apply("b", ReportedSide::Long, true);
        state.apply("b", ReportedSide::Short, true);

        assert_eq!(state.count(Side::Long), 2);
        assert_eq!(state.count(Side::Short), 1);

        state.apply("b", ReportedSide::Flat, false);
        assert_eq!(state.count(Side::Long), 1);
        assert_eq!(state.count(Side::Short), 0);
    }

    #[test]
    fn test_reconcile_matches_sources() {
        let mut state = PositionState::default();
        state.apply("gone", ReportedSide::Long, true);

        let mut sources = BTreeMap::new();
        sources.insert("a".to_string(), source("a"));
        assert!(state.reconcile(&sources));

        assert_eq!(state.pos_states.len(), 1);
        assert_eq!(state.pos_states.get("a"), Some(&PositionFlags::default()));
        assert!(!state.reconcile(&sources));
    }

    #[test]
    fn test_legacy_config_document_loads() {
        // 早期版本的文档缺少 exchange / symbol / create_time
        let raw = r#"{
            "versin": "1",
            "strategy": {
                "s1": {"id": "s1", "name": "", "enabled": true, "hook_url": "", "sources": {},
                       "update_time": 10, "create_time": 10}
            },
            "update_time": 10
        }"#;
        let config: StrategyConfig = serde_json::from_str(raw).unwrap();
        let s1 = &config.strategy["s1"];
        assert_eq!(s1.symbol, "");
        assert!(s1.enabled);
        assert_eq!(config.create_time, 0);
        assert_eq!(config.version, CONFIG_VERSION);
    }
}
