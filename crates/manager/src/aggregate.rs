use hookrelay_core::common::new_id;
use hookrelay_core::signal::entity::{Action, DeliveryTask, FlagUpdate, Side, SignalPayload};
use hookrelay_core::strategy::entity::{PositionState, Strategy};

use crate::ingest::SignalRules;

/// # Summary
/// 一次聚合计数跨越边界的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub side: Side,
    pub action: Action,
    pub prev_count: usize,
    pub count: usize,
}

/// # Summary
/// 将标志更新应用到持仓状态，并推导每个方向的动作。
///
/// # Logic
/// 1. 在任何修改之前，对多空两个方向的聚合计数同时做快照。
/// 2. 应用标志更新 (`Flat` 会同时清除两个方向)。
/// 3. 两个方向各自用自己的快照与新计数比较，独立产生动作。
///
/// # Arguments
/// * `state` - 策略的持仓状态，调用方须持有该策略的临界区。
/// * `update` - 已校验的标志更新。
///
/// # Returns
/// * `Vec<Transition>` - 按 `Side::ALL` 顺序排列；标志未变化时为空。
pub fn apply_update(state: &mut PositionState, update: &FlagUpdate) -> Vec<Transition> {
    let before = Side::ALL.map(|side| state.count(side));

    state.apply(&update.source_id, update.side, update.opened);

    Side::ALL
        .iter()
        .zip(before)
        .filter_map(|(&side, prev_count)| {
            let count = state.count(side);
            Action::from_counts(prev_count, count).map(|action| Transition {
                side,
                action,
                prev_count,
                count,
            })
        })
        .collect()
}

/// # Summary
/// 为一次状态迁移构造出站投递任务。
///
/// # Arguments
/// * `strategy` - 所属策略，提供 exchange / symbol / hook_url。
/// * `source_id` - 触发迁移的信号源。
/// * `transition` - 状态迁移。
/// * `rules` - 提供载荷版本号与 `safe_interval`。
/// * `now` - 当前时间 (epoch 秒)。
pub fn build_task(
    strategy: &Strategy,
    source_id: &str,
    transition: &Transition,
    rules: &SignalRules,
    now: i64,
) -> DeliveryTask {
    DeliveryTask {
        id: new_id(),
        strategy_id: strategy.id.clone(),
        source_id: source_id.to_string(),
        url: strategy.hook_url.clone(),
        payload: SignalPayload {
            version: rules.version.clone(),
            exchange: strategy.exchange.clone(),
            symbol: strategy.symbol.clone(),
            side: transition.side,
            action: transition.action,
            safe_interval: rules.safe_interval,
            time: now,
        },
        enqueue_time: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookrelay_core::signal::entity::ReportedSide;

    fn state(ids: &[&str]) -> PositionState {
        let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        PositionState::for_sources(&ids, 0)
    }

    fn update(source: &str, side: ReportedSide, opened: bool) -> FlagUpdate {
        FlagUpdate {
            source_id: source.to_string(),
            side,
            opened,
        }
    }

    fn actions(transitions: &[Transition]) -> Vec<(Side, Action)> {
        transitions.iter().map(|t| (t.side, t.action)).collect()
    }

    #[test]
    fn test_two_source_lifecycle() {
        let mut st = state(&["a", "b"]);

        let t = apply_update(&mut st, &update("a", ReportedSide::Long, true));
        assert_eq!(actions(&t), vec![(Side::Long, Action::Open)]);
        assert_eq!((t[0].prev_count, t[0].count), (0, 1));

        let t = apply_update(&mut st, &update("b", ReportedSide::Long, true));
        assert_eq!(actions(&t), vec![(Side::Long, Action::Increase)]);

        let t = apply_update(&mut st, &update("a", ReportedSide::Flat, false));
        assert_eq!(actions(&t), vec![(Side::Long, Action::Decrease)]);
        assert_eq!((t[0].prev_count, t[0].count), (2, 1));

        let t = apply_update(&mut st, &update("b", ReportedSide::Flat, false));
        assert_eq!(actions(&t), vec![(Side::Long, Action::Close)]);
    }

    #[test]
    fn test_duplicate_report_is_idempotent() {
        let mut st = state(&["a", "b"]);
        apply_update(&mut st, &update("a", ReportedSide::Short, true));

        assert!(apply_update(&mut st, &update("a", ReportedSide::Short, true)).is_empty());
        assert!(apply_update(&mut st, &update("b", ReportedSide::Flat, false)).is_empty());
        assert_eq!(st.count(Side::Short), 1);
    }

    #[test]
    fn test_flat_closes_both_sides_from_one_snapshot() {
        let mut st = state(&["a", "b"]);
        apply_update(&mut st, &update("a", ReportedSide::Long, true));
        apply_update(&mut st, &update("a", ReportedSide::Short, true));
        apply_update(&mut st, &update("b", ReportedSide::Short, true));

        let t = apply_update(&mut st, &update("a", ReportedSide::Flat, false));
        assert_eq!(
            actions(&t),
            vec![(Side::Long, Action::Close), (Side::Short, Action::Decrease)]
        );
        assert_eq!((t[1].prev_count, t[1].count), (2, 1));
    }

    #[test]
    fn test_sides_do_not_interfere() {
        let mut st = state(&["a"]);
        apply_update(&mut st, &update("a", ReportedSide::Long, true));

        // 只替换空头标志，多头计数不变
        let t = apply_update(&mut st, &update("a", ReportedSide::Short, true));
        assert_eq!(actions(&t), vec![(Side::Short, Action::Open)]);
        assert_eq!(st.count(Side::Long), 1);

        let t = apply_update(&mut st, &update("a", ReportedSide::Long, false));
        assert_eq!(actions(&t), vec![(Side::Long, Action::Close)]);
        assert_eq!(st.count(Side::Short), 1);
    }

    #[test]
    fn test_never_two_opens_without_close() {
        let mut st = state(&["a", "b", "c"]);
        let script = [
            ("a", ReportedSide::Long, true),
            ("b", ReportedSide::Long, true),
            ("a", ReportedSide::Long, false),
            ("c", ReportedSide::Long, true),
            ("b", ReportedSide::Flat, false),
            ("c", ReportedSide::Long, false),
            ("a", ReportedSide::Long, true),
        ];

        let mut open = false;
        for (src, side, opened) in script {
            for t in apply_update(&mut st, &update(src, side, opened)) {
                match t.action {
                    Action::Open => {
                        assert!(!open, "open emitted twice");
                        open = true;
                    }
                    Action::Close => {
                        assert!(open, "close without open");
                        open = false;
                    }
                    Action::Increase | Action::Decrease => assert!(open),
                }
            }
        }
        assert!(open);
    }

    #[test]
    fn test_build_task_copies_strategy_identity() {
        let strategy = Strategy {
            id: "s1".to_string(),
            name: "n".to_string(),
            enabled: true,
            hook_url: "http://localhost/hook".to_string(),
            exchange: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            sources: Default::default(),
            update_time: 0,
            create_time: 0,
        };
        let transition = Transition {
            side: Side::Short,
            action: Action::Open,
            prev_count: 0,
            count: 1,
        };

        let task = build_task(&strategy, "a", &transition, &SignalRules::default(), 42);
        assert_eq!(task.strategy_id, "s1");
        assert_eq!(task.url, "http://localhost/hook");
        assert_eq!(task.enqueue_time, 42);
        assert_eq!(task.payload.side, Side::Short);
        assert_eq!(task.payload.action, Action::Open);
        assert_eq!(task.payload.symbol, "BTCUSDT");
        assert_eq!(task.payload.safe_interval, 60);
        assert_eq!(task.payload.time, 42);
    }
}
