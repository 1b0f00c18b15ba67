use std::path::{Path, PathBuf};

/// 全局策略配置文档名
pub const CONFIG_FILE: &str = "strategy.json";
/// 单个策略的持仓状态文档名
pub const STATE_FILE: &str = "state.json";
/// 单个策略的投递队列文档名
pub const QUEUE_FILE: &str = "queue.json";

/// # Summary
/// 数据根目录下的文件布局。
///
/// # Invariants
/// - 每个策略独占 `<root>/<strategy_id>/` 子目录，删除策略时整体移除。
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn strategy_dir(&self, strategy_id: &str) -> PathBuf {
        self.root.join(strategy_id)
    }

    pub fn state_path(&self, strategy_id: &str) -> PathBuf {
        self.strategy_dir(strategy_id).join(STATE_FILE)
    }

    pub fn queue_path(&self, strategy_id: &str) -> PathBuf {
        self.strategy_dir(strategy_id).join(QUEUE_FILE)
    }
}

/// # Summary
/// 判断策略 ID 能否安全地作为目录名使用。
///
/// # Logic
/// 只允许 ASCII 字母、数字、`-` 与 `_`，拒绝空串以及任何路径分隔符。
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
