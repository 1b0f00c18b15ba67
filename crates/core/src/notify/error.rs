use thiserror::Error;

/// # Summary
/// 下游 Webhook 推送错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 所有变体都视为投递失败，由投递队列无限重试。
#[derive(Error, Debug)]
pub enum NotifyError {
    /// 网络连接、传输或超时错误
    #[error("Network error: {0}")]
    Network(String),

    /// 配置错误 (如策略尚未设置 hook_url)
    #[error("Configuration error: {0}")]
    Config(String),

    /// 下游返回了非 200 状态码
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}
