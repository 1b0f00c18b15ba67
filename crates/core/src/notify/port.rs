use crate::notify::error::NotifyError;
use crate::signal::entity::SignalPayload;
use async_trait::async_trait;

/// # Summary
/// 将信号推送到下游 Webhook 的接口定义。
///
/// # Invariants
/// - 实现必须是 `Send` 和 `Sync` 以支持多个队列并发调用。
/// - 只有下游返回 HTTP 200 才算确认，其余一律返回 `Err`。
/// - 单次调用必须有超时上限，超时同样返回 `Err`。
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// # Summary
    /// 以 JSON 形式 POST 一条信号。
    ///
    /// # Arguments
    /// * `url` - 下游 Webhook 地址。
    /// * `payload` - 待推送的信号载荷。
    ///
    /// # Returns
    /// * 下游确认返回 `Ok(())`，否则返回 `Err(NotifyError)`。
    async fn send(&self, url: &str, payload: &SignalPayload) -> Result<(), NotifyError>;
}
