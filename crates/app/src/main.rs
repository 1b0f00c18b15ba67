use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File};
use hookrelay_api::server::{AppState, start_server};
use hookrelay_core::common::time::{RealTimeProvider, TimeProvider};
use hookrelay_core::config::{AppConfig, LogConfig};
use hookrelay_core::notify::port::WebhookSender;
use hookrelay_core::strategy::port::StrategyStore;
use hookrelay_manager::delivery::DeliveryWorker;
use hookrelay_manager::ingest::SignalRules;
use hookrelay_manager::persist::{self, PersistWorker};
use hookrelay_manager::strategy::StrategyManager;
use hookrelay_notify::webhook::HttpWebhookSender;
use hookrelay_store::strategy::FileStrategyStore;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// 指定配置文件路径的环境变量
const CONFIG_PATH_ENV: &str = "HOOKRELAY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "hookrelay.toml";

/// # Summary
/// 分层加载配置：内置默认值 → 配置文件 → `HOOKRELAY__SECTION__KEY` 环境变量。
///
/// # Logic
/// 显式通过 `HOOKRELAY_CONFIG` 指定的文件必须存在；默认文件缺失时忽略。
/// 反序列化后再做语义校验，不合法的周期在启动时即报错。
fn load_config() -> Result<AppConfig, config::ConfigError> {
    let (path, required) = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => (path, true),
        Err(_) => (DEFAULT_CONFIG_PATH.to_string(), false),
    };

    Config::builder()
        .add_source(File::with_name(&path).required(required))
        .add_source(
            Environment::with_prefix("HOOKRELAY")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<AppConfig>()
        .and_then(|config| {
            config
                .validate()
                .map_err(|e| config::ConfigError::Message(e.to_string()))?;
            Ok(config)
        })
}

/// # Summary
/// 初始化全局日志。`RUST_LOG` 优先于配置中的过滤规则。
///
/// # Returns
/// * `Option<WorkerGuard>` - 写文件时的后台刷写句柄，必须存活到进程退出。
fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hookrelay.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stdout.and(file_writer))
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到 StrategyManager。
///
/// # Logic
/// 1. 加载配置并初始化全局日志。
/// 2. 实例化基础设施层（文件存储、Webhook 客户端）。
/// 3. 从存储恢复 StrategyManager，启动持久化与投递两个后台循环。
/// 4. 启动 HTTP 服务，收到 Ctrl-C 后停止接收请求。
/// 5. 先停止投递循环 (等待在途调用)，再停止持久化循环 (最后一次刷盘)。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置与日志
    let config = load_config()?;
    let _log_guard = init_logging(&config.log);
    info!("HookRelay starting...");

    // 2. 实例化基础设施层
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    let store: Arc<dyn StrategyStore> =
        Arc::new(FileStrategyStore::new(&config.storage.data_dir).await?);
    let sender: Arc<dyn WebhookSender> = Arc::new(HttpWebhookSender::with_timeout(
        Duration::from_secs(config.delivery.timeout_secs),
    )?);

    // 3. 构造应用服务层与后台循环
    let (persist_handle, persist_rx) = persist::channel();
    let manager = StrategyManager::load(
        store.clone(),
        clock.clone(),
        SignalRules::from(&config.signal),
        persist_handle,
    )
    .await?;

    let persist_worker = PersistWorker::new(
        manager.clone(),
        store,
        clock.clone(),
        persist_rx,
        Duration::from_millis(config.persist.interval_ms),
    );
    let delivery_worker = DeliveryWorker::new(
        manager.clone(),
        sender,
        Duration::from_millis(config.delivery.interval_ms),
    );

    let (persist_stop, persist_stop_rx) = watch::channel(false);
    let (delivery_stop, delivery_stop_rx) = watch::channel(false);
    let persist_task = tokio::spawn(persist_worker.run(persist_stop_rx));
    let delivery_task = tokio::spawn(delivery_worker.run(delivery_stop_rx));

    // 4. HTTP 服务
    let state = AppState {
        manager,
        auth: Arc::new(config.auth.clone()),
        clock,
    };
    if state.auth.accounts.is_empty() {
        warn!("no admin accounts configured, management api is unreachable");
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let served = start_server(state, &bind_addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("Shutdown signal received, draining...");
    })
    .await;

    // 5. 依次停止后台循环
    if delivery_stop.send(true).is_err() {
        warn!("delivery worker already stopped");
    }
    if let Err(e) = delivery_task.await {
        error!(error = %e, "delivery worker panicked");
    }
    if persist_stop.send(true).is_err() {
        warn!("persist worker already stopped");
    }
    if let Err(e) = persist_task.await {
        error!(error = %e, "persist worker panicked");
    }

    served?;
    info!("HookRelay stopped");
    Ok(())
}
