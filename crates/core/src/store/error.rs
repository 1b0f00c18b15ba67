use thiserror::Error;

/// # Summary
/// 存储层错误枚举，处理文件读写、编解码等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 运行期写入失败属于可重试的瞬时错误，由持久化队列负责重试。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 文件系统操作失败
    #[error("IO error: {0}")]
    Io(String),
    /// JSON 编解码失败
    #[error("Codec error: {0}")]
    Codec(String),
    /// 初始化存储失败
    #[error("Initialization error: {0}")]
    InitError(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}
