use hookrelay_core::signal::entity::{
    Action, DeliveryQueue, DeliveryTask, ReportedSide, Side, SignalPayload,
};
use hookrelay_core::strategy::entity::{PositionState, Source, Strategy, StrategyConfig};
use hookrelay_core::strategy::port::StrategyStore;
use hookrelay_store::strategy::FileStrategyStore;
use std::collections::BTreeMap;
use tempfile::tempdir;

fn sample_strategy(id: &str) -> Strategy {
    let mut sources = BTreeMap::new();
    for sid in ["src-a", "src-b"] {
        sources.insert(
            sid.to_string(),
            Source {
                id: sid.to_string(),
                name: format!("feed {}", sid),
                active: true,
                update_time: 100,
                create_time: 100,
            },
        );
    }
    Strategy {
        id: id.to_string(),
        name: "btc trend".to_string(),
        enabled: true,
        hook_url: "http://127.0.0.1:9/hook".to_string(),
        exchange: "binance".to_string(),
        symbol: "BTCUSDT".to_string(),
        sources,
        update_time: 100,
        create_time: 100,
    }
}

fn sample_task(id: &str, side: Side, action: Action) -> DeliveryTask {
    DeliveryTask {
        id: id.to_string(),
        strategy_id: "s1".to_string(),
        source_id: "src-a".to_string(),
        url: "http://127.0.0.1:9/hook".to_string(),
        payload: SignalPayload {
            version: "1".to_string(),
            exchange: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            side,
            action,
            safe_interval: 60,
            time: 123,
        },
        enqueue_time: 123,
    }
}

#[tokio::test]
async fn test_documents_round_trip_across_restart() {
    // 1. 初始化临时测试环境
    let tmp_dir = tempdir().expect("Failed to create temp dir");
    let store = FileStrategyStore::new(tmp_dir.path()).await.unwrap();

    // 首次启动，没有任何文档
    assert!(store.load_config().await.unwrap().is_none());
    assert!(store.load_position_state("s1").await.unwrap().is_none());
    assert!(store.load_delivery_queue("s1").await.unwrap().is_none());

    // 2. 写入三类文档
    let mut config = StrategyConfig::empty(100);
    config.strategy.insert("s1".to_string(), sample_strategy("s1"));
    store.save_config(&config).await.unwrap();

    let strategy = &config.strategy["s1"];
    let mut state = PositionState::for_sources(strategy.sources.keys(), 100);
    state.apply("src-a", ReportedSide::Long, true);
    store.save_position_state("s1", &state).await.unwrap();

    let mut queue = DeliveryQueue::default();
    queue.push(sample_task("t1", Side::Long, Action::Open));
    queue.push(sample_task("t2", Side::Long, Action::Increase));
    queue.push(sample_task("t3", Side::Short, Action::Open));
    store.save_delivery_queue("s1", &queue).await.unwrap();

    // 3. 模拟重启：新实例读取同一目录
    let reopened = FileStrategyStore::new(tmp_dir.path()).await.unwrap();
    assert_eq!(reopened.load_config().await.unwrap(), Some(config));
    assert_eq!(reopened.load_position_state("s1").await.unwrap(), Some(state));

    let loaded_queue = reopened.load_delivery_queue("s1").await.unwrap().unwrap();
    assert_eq!(loaded_queue, queue);
    assert_eq!(loaded_queue.head(Side::Long).map(|t| t.id.as_str()), Some("t1"));
}

#[tokio::test]
async fn test_queue_document_shape() {
    let tmp_dir = tempdir().unwrap();
    let store = FileStrategyStore::new(tmp_dir.path()).await.unwrap();

    let mut queue = DeliveryQueue::default();
    queue.push(sample_task("t1", Side::Short, Action::Close));
    store.save_delivery_queue("s1", &queue).await.unwrap();

    let raw = std::fs::read_to_string(store.layout().queue_path("s1")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["long"].as_array().map(Vec::len), Some(0));
    assert_eq!(json["short"][0]["payload"]["action"], "close");
    assert_eq!(json["short"][0]["payload"]["side"], "short");

    // 临时文件不应残留
    let leftovers: Vec<_> = std::fs::read_dir(store.layout().strategy_dir("s1"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_purge_removes_strategy_artifacts() {
    let tmp_dir = tempdir().unwrap();
    let store = FileStrategyStore::new(tmp_dir.path()).await.unwrap();

    store
        .save_position_state("s1", &PositionState::default())
        .await
        .unwrap();
    store
        .save_delivery_queue("s1", &DeliveryQueue::default())
        .await
        .unwrap();
    assert!(store.layout().strategy_dir("s1").exists());

    store.purge("s1").await.unwrap();
    assert!(!store.layout().strategy_dir("s1").exists());
    assert!(store.load_position_state("s1").await.unwrap().is_none());

    // 重复删除视为成功
    store.purge("s1").await.unwrap();
}

#[tokio::test]
async fn test_rejects_path_like_ids() {
    let tmp_dir = tempdir().unwrap();
    let store = FileStrategyStore::new(tmp_dir.path()).await.unwrap();

    assert!(store.load_position_state("../escape").await.is_err());
    assert!(store.purge("a/b").await.is_err());
}
