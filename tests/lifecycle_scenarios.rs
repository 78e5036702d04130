use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use signal_tracker::config::AppConfig;
use signal_tracker::projector::TradeStatus;
use signal_tracker::state::AppState;
use signal_tracker::store::EventStore;
use signal_tracker::types::{CompletedReason, EventType, Variant, VariantPhase};

const TRADE: &str = "20250612_093000000_BULLISH";

fn ts(minute: u32) -> String {
    Utc.with_ymd_and_hms(2025, 6, 12, 13, 30 + minute, 0)
        .unwrap()
        .to_rfc3339()
}

fn mfe(minute: u32, fields: Value) -> Value {
    let mut payload = json!({
        "event_type": "MFE_UPDATE",
        "trade_id": TRADE,
        "timestamp": ts(minute),
    });
    if let (Some(obj), Some(extra)) = (payload.as_object_mut(), fields.as_object()) {
        obj.extend(extra.clone());
    }
    payload
}

fn lifecycle() -> Vec<Value> {
    vec![
        json!({"event_type": "ENTRY", "trade_id": TRADE, "entry_price": 100, "stop_loss_price": 90}),
        mfe(1, json!({"be_mfe_r": 0.5, "no_be_mfe_r": 0.5, "mae_r": 0.1})),
        json!({"event_type": "BE_TRIGGERED", "trade_id": TRADE, "timestamp": ts(2)}),
        mfe(3, json!({"be_mfe_r": 1.2, "no_be_mfe_r": 2.0, "mae_r": 0.1})),
        json!({"event_type": "EXIT_BREAK_EVEN", "trade_id": TRADE, "timestamp": ts(4), "current_price": 100}),
        mfe(5, json!({"no_be_mfe_r": 2.8})),
        json!({"event_type": "EXIT_STOP_LOSS", "trade_id": TRADE, "timestamp": ts(6),
               "variant": "NO_BE", "current_price": 90}),
    ]
}

async fn deliver(state: &AppState, payload: &Value) {
    state
        .ingest
        .ingest(payload, Utc::now())
        .await
        .expect("ingest should succeed");
}

async fn is_active(state: &AppState) -> bool {
    state
        .read_model
        .active_trades()
        .await
        .unwrap()
        .iter()
        .any(|t| t.trade_id == TRADE)
}

async fn is_completed(state: &AppState) -> bool {
    state
        .read_model
        .completed_trades(100)
        .await
        .unwrap()
        .iter()
        .any(|t| t.trade_id == TRADE)
}

#[tokio::test]
async fn breakeven_then_stop_loss_lifecycle() {
    let state = AppState::in_memory(AppConfig::default());
    let events = lifecycle();

    for payload in &events[..5] {
        deliver(&state, payload).await;
    }
    assert!(is_active(&state).await);
    assert!(!is_completed(&state).await);

    deliver(&state, &events[5]).await;
    assert!(is_active(&state).await);

    deliver(&state, &events[6]).await;
    assert!(!is_active(&state).await);
    assert!(is_completed(&state).await);

    let detail = state.read_model.trade_detail(TRADE).await.unwrap().unwrap();
    assert_eq!(detail.status, TradeStatus::Completed);
    assert_eq!(detail.events.len(), 7);
    assert_eq!(detail.be1.max_favorable_r, dec!(1.2));
    assert_eq!(detail.be1.completed_reason, Some(CompletedReason::BreakEvenStop));
    assert_eq!(detail.no_be.max_favorable_r, dec!(2.8));
    assert_eq!(detail.no_be.completed_reason, Some(CompletedReason::StopLoss));
    assert_eq!(detail.summary.signal_time, "2025-06-12 09:30:00");
    assert_eq!(detail.summary.risk_distance, Some(dec!(10)));
}

#[tokio::test]
async fn redelivered_events_do_not_change_state() {
    let once = AppState::in_memory(AppConfig::default());
    let twice = AppState::in_memory(AppConfig::default());

    for payload in lifecycle() {
        deliver(&once, &payload).await;
        deliver(&twice, &payload).await;
        deliver(&twice, &payload).await;
    }

    let a = once.read_model.trade_detail(TRADE).await.unwrap().unwrap();
    let b = twice.read_model.trade_detail(TRADE).await.unwrap().unwrap();
    assert_eq!(a.be1, b.be1);
    assert_eq!(a.no_be, b.no_be);
    assert_eq!(a.events.len(), b.events.len());
}

#[tokio::test]
async fn duplicate_entry_is_stored_once() {
    let state = AppState::in_memory(AppConfig::default());
    let entry = &lifecycle()[0];
    let first = state.ingest.ingest(entry, Utc::now()).await.unwrap();
    let second = state.ingest.ingest(entry, Utc::now()).await.unwrap();
    assert_eq!(first.inserted, 1);
    assert_eq!(second.inserted, 0);

    let events = state.store.events_for(TRADE).await.unwrap();
    let entries = events
        .iter()
        .filter(|e| e.event_type == EventType::Entry)
        .count();
    assert_eq!(entries, 1);
}

#[tokio::test]
async fn out_of_order_delivery_matches_ordered() {
    let ordered = AppState::in_memory(AppConfig::default());
    let shuffled = AppState::in_memory(AppConfig::default());

    let events = lifecycle();
    for payload in &events {
        deliver(&ordered, payload).await;
    }
    for i in [0, 3, 6, 1, 5, 2, 4] {
        deliver(&shuffled, &events[i]).await;
    }

    let a = ordered.read_model.trade_detail(TRADE).await.unwrap().unwrap();
    let b = shuffled.read_model.trade_detail(TRADE).await.unwrap().unwrap();
    assert_eq!(a.be1, b.be1);
    assert_eq!(a.no_be, b.no_be);
}

#[tokio::test]
async fn orphaned_updates_are_excluded_from_read_sets() {
    let state = AppState::in_memory(AppConfig::default());
    deliver(&state, &mfe(1, json!({"be_mfe_r": 0.3}))).await;
    deliver(&state, &mfe(2, json!({"be_mfe_r": 0.6}))).await;

    assert!(!is_active(&state).await);
    assert!(!is_completed(&state).await);

    let orphans = state.read_model.orphaned_trades().await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].event_count, 2);

    let detail = state.read_model.trade_detail(TRADE).await.unwrap().unwrap();
    assert_eq!(detail.status, TradeStatus::AwaitingEntry);
    assert_eq!(detail.be1.phase, VariantPhase::AwaitingEntry);

    // backfilled ENTRY brings the trade into the active set
    deliver(&state, &lifecycle()[0]).await;
    assert!(is_active(&state).await);
    assert!(state.read_model.orphaned_trades().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_trade_is_left_off_the_leaderboard() {
    let state = AppState::in_memory(AppConfig::default());
    deliver(&state, &lifecycle()[0]).await;
    deliver(
        &state,
        &json!({"event_type": "CANCELLED", "trade_id": TRADE, "timestamp": ts(1)}),
    )
    .await;

    let other = "20250612_100000000_BEARISH";
    deliver(
        &state,
        &json!({"event_type": "ENTRY", "trade_id": other, "entry_price": 100, "stop_loss_price": 105}),
    )
    .await;
    deliver(
        &state,
        &json!({"event_type": "EXIT_STOP_LOSS", "trade_id": other,
                "timestamp": "2025-06-12T15:00:00Z", "be_mfe_r": 0.7, "no_be_mfe_r": 0.7}),
    )
    .await;

    let completed = state.read_model.completed_trades(10).await.unwrap();
    assert_eq!(completed.len(), 2);
    let cancelled = completed.iter().find(|t| t.trade_id == TRADE).unwrap();
    assert!(cancelled.cancelled);
    assert_eq!(cancelled.be1.completed_reason, Some(CompletedReason::Cancelled));

    let board = state.read_model.leaderboard(Variant::Be1, 10).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].summary.trade_id, other);
    assert_eq!(board[0].summary.be1.max_favorable_r, dec!(0.7));
}

#[tokio::test]
async fn batch_updates_fan_out_to_each_trade() {
    let state = AppState::in_memory(AppConfig::default());
    let second = "20250612_094500000_BEARISH";
    deliver(&state, &lifecycle()[0]).await;
    deliver(
        &state,
        &json!({"event_type": "ENTRY", "trade_id": second, "entry_price": 50, "stop_loss_price": 52}),
    )
    .await;

    let batch = json!({
        "event_type": "MFE_UPDATE_BATCH",
        "timestamp": "2025-06-12T14:30:00Z",
        "signals": [
            {"trade_id": TRADE, "be_mfe": 0.8, "no_be_mfe": 0.8, "mae": -0.2},
            {"trade_id": second, "be_mfe": 1.5, "no_be_mfe": 1.5, "mae": 0.4},
        ]
    });
    let report = state.ingest.ingest(&batch, Utc::now()).await.unwrap();
    assert_eq!(report.accepted, 2);
    assert_eq!(report.orphaned, 0);

    let a = state.read_model.trade_detail(TRADE).await.unwrap().unwrap();
    let b = state.read_model.trade_detail(second).await.unwrap().unwrap();
    assert_eq!(a.be1.max_favorable_r, dec!(0.8));
    assert_eq!(a.be1.max_adverse_r, dec!(0.2));
    assert_eq!(b.no_be.max_favorable_r, dec!(1.5));
}
