use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 配置值合法但语义上不可用
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid config {key}: {reason}")]
pub struct ConfigValueError {
    pub key: &'static str,
    pub reason: &'static str,
}

/// 全局应用配置
///
/// 所有字段都有默认值，配置文件与环境变量只需覆盖需要修改的部分。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub persist: PersistConfig,
    pub delivery: DeliveryConfig,
    pub signal: SignalConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// # Summary
    /// 校验反序列化后的配置，周期与超时必须为正。
    ///
    /// # Returns
    /// * `Err(ConfigValueError)` - 第一个不合法的配置项。
    pub fn validate(&self) -> Result<(), ConfigValueError> {
        let positive = [
            ("persist.interval_ms", self.persist.interval_ms),
            ("delivery.interval_ms", self.delivery.interval_ms),
            ("delivery.timeout_secs", self.delivery.timeout_secs),
        ];
        match positive.iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(ConfigValueError {
                key: *key,
                reason: "must be greater than 0",
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 管理接口的会话令牌与账户配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 签发会话令牌使用的 HMAC 密钥
    pub secret: String,
    /// 会话令牌有效期 (秒)
    pub token_ttl_secs: i64,
    pub accounts: Vec<AccountConfig>,
}

/// 单个管理员账户，密码以 `hex(sha256(salt || password))` 形式保存
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub account: String,
    pub password_sha256: String,
    #[serde(default)]
    pub salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 策略配置、持仓状态与投递队列文档的根目录
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// 持久化队列的唤醒周期 (毫秒)
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// 投递队列的唤醒周期 (毫秒)
    pub interval_ms: u64,
    /// 单次下游调用超时 (秒)
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// 是否要求入站信号的交易所字段与策略一致
    pub validate_exchange: bool,
    /// 写入出站信号的 `safe_interval` (秒)
    pub safe_interval: u64,
    /// 出站信号载荷版本号
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 日志文件目录，为空时只输出到终端
    pub dir: Option<String>,
    /// `RUST_LOG` 未设置时使用的过滤规则
    pub filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2280,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: "01234567".to_string(), // Default for dev, should be overwritten by config
            token_ttl_secs: 60 * 3600,
            accounts: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "strategy_root".to_string(),
        }
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self { interval_ms: 200 }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            timeout_secs: 10,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            validate_exchange: false,
            safe_interval: 60,
            version: "1".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 2280);
        assert_eq!(config.storage.data_dir, "strategy_root");
        assert_eq!(config.delivery.timeout_secs, 10);
        assert_eq!(config.delivery.interval_ms, 100);
        assert!(!config.signal.validate_exchange);
        assert!(config.auth.accounts.is_empty());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"server": {"port": 9000}, "signal": {"validate_exchange": true}}"#)
                .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.signal.validate_exchange);
        assert_eq!(config.signal.safe_interval, 60);
    }

    #[test]
    fn test_zero_periods_are_rejected() {
        assert_eq!(AppConfig::default().validate(), Ok(()));

        let config: AppConfig =
            serde_json::from_str(r#"{"persist": {"interval_ms": 0}}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.key, "persist.interval_ms");

        let config: AppConfig =
            serde_json::from_str(r#"{"delivery": {"interval_ms": 0}}"#).unwrap();
        assert_eq!(config.validate().unwrap_err().key, "delivery.interval_ms");

        let config: AppConfig =
            serde_json::from_str(r#"{"delivery": {"timeout_secs": 0}}"#).unwrap();
        assert_eq!(config.validate().unwrap_err().key, "delivery.timeout_secs");
    }
}
