use async_trait::async_trait;
use hookrelay_core::signal::entity::DeliveryQueue;
use hookrelay_core::store::error::StoreError;
use hookrelay_core::strategy::entity::{PositionState, StrategyConfig};
use hookrelay_core::strategy::port::StrategyStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::layout::{StoreLayout, is_safe_id};

/// # Summary
/// `StrategyStore` 的 JSON 文件实现，采用"一策略一目录"布局。
///
/// # Invariants
/// * 所有写入先落到同目录临时文件，再 `rename` 覆盖目标，读者永远看不到半截文档。
/// * 缺失的文档读取为 `None`，由上层决定默认值。
pub struct FileStrategyStore {
    layout: StoreLayout,
}

impl FileStrategyStore {
    /// # Summary
    /// 创建新的 FileStrategyStore 实例并确保根目录存在。
    ///
    /// # Arguments
    /// * `root` - 数据根目录。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 根目录无法创建时返回 `InitError`。
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let layout = StoreLayout::new(root);
        tokio::fs::create_dir_all(layout.root())
            .await
            .map_err(|e| StoreError::InitError(format!("{}: {}", layout.root().display(), e)))?;
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    fn checked_id<'a>(&self, strategy_id: &'a str) -> Result<&'a str, StoreError> {
        if is_safe_id(strategy_id) {
            Ok(strategy_id)
        } else {
            Err(StoreError::Io(format!("unsafe strategy id: {:?}", strategy_id)))
        }
    }
}

async fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_doc<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "document written");
    Ok(())
}

#[async_trait]
impl StrategyStore for FileStrategyStore {
    async fn load_config(&self) -> Result<Option<StrategyConfig>, StoreError> {
        read_doc(&self.layout.config_path()).await
    }

    async fn save_config(&self, config: &StrategyConfig) -> Result<(), StoreError> {
        write_doc(&self.layout.config_path(), config).await
    }

    async fn load_position_state(
        &self,
        strategy_id: &str,
    ) -> Result<Option<PositionState>, StoreError> {
        let id = self.checked_id(strategy_id)?;
        read_doc(&self.layout.state_path(id)).await
    }

    async fn save_position_state(
        &self,
        strategy_id: &str,
        state: &PositionState,
    ) -> Result<(), StoreError> {
        let id = self.checked_id(strategy_id)?;
        write_doc(&self.layout.state_path(id), state).await
    }

    async fn load_delivery_queue(
        &self,
        strategy_id: &str,
    ) -> Result<Option<DeliveryQueue>, StoreError> {
        let id = self.checked_id(strategy_id)?;
        read_doc(&self.layout.queue_path(id)).await
    }

    async fn save_delivery_queue(
        &self,
        strategy_id: &str,
        queue: &DeliveryQueue,
    ) -> Result<(), StoreError> {
        let id = self.checked_id(strategy_id)?;
        write_doc(&self.layout.queue_path(id), queue).await
    }

    async fn purge(&self, strategy_id: &str) -> Result<(), StoreError> {
        let id = self.checked_id(strategy_id)?;
        match tokio::fs::remove_dir_all(self.layout.strategy_dir(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
