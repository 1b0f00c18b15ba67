pub mod time;

/// # Summary
/// 生成全局唯一且按时间单调可排序的标识符。
///
/// # Logic
/// 基于 UUID v7 (毫秒时间戳前缀)，以无连字符的小写十六进制输出，
/// 字典序即创建顺序，且永不复用。
///
/// # Returns
/// 32 位十六进制字符串。
pub fn new_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}
