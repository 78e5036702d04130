// src/projector/mod.rs
// Dual-strategy projector: folds one trade's event log into BE=1 and No-BE variant states

pub mod anomaly;
pub mod variant;

use crate::store::sort_events;
use crate::types::{CompletedReason, EventType, TradeEvent, Variant, VariantPhase};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

pub use anomaly::Anomaly;
pub use variant::VariantState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    /// No ENTRY yet; excluded from the active and completed sets.
    AwaitingEntry,
    /// At least one variant is still running.
    Active,
    /// Both variants completed.
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeProjection {
    pub trade_id: String,
    #[serde(skip)]
    pub entry: Option<TradeEvent>,
    pub be1: VariantState,
    pub no_be: VariantState,
    pub diagnostics: Vec<Anomaly>,
    pub event_count: usize,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl TradeProjection {
    fn new(trade_id: &str) -> Self {
        Self {
            trade_id: trade_id.to_string(),
            entry: None,
            be1: VariantState::awaiting(Variant::Be1),
            no_be: VariantState::awaiting(Variant::NoBe),
            diagnostics: Vec::new(),
            event_count: 0,
            last_event_at: None,
        }
    }

    pub fn status(&self) -> TradeStatus {
        if self.entry.is_none() {
            TradeStatus::AwaitingEntry
        } else if self.be1.is_completed() && self.no_be.is_completed() {
            TradeStatus::Completed
        } else {
            TradeStatus::Active
        }
    }

    pub fn variant(&self, variant: Variant) -> &VariantState {
        match variant {
            Variant::Be1 => &self.be1,
            Variant::NoBe => &self.no_be,
        }
    }

    fn variant_mut(&mut self, variant: Variant) -> &mut VariantState {
        match variant {
            Variant::Be1 => &mut self.be1,
            Variant::NoBe => &mut self.no_be,
        }
    }

    /// Time the later of the two variants completed.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match (self.be1.completed_at, self.no_be.completed_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.be1.completed_reason == Some(CompletedReason::Cancelled)
            && self.no_be.completed_reason == Some(CompletedReason::Cancelled)
    }

    /// Applies the excursion values an event carries to whichever variants are
    /// still listening.
    fn observe_path(&mut self, event: &TradeEvent) {
        let at = event.event_timestamp;
        if let Some(be) = event.be_mfe_r {
            self.be1
                .observe_favorable(be, event.event_type, at, &mut self.diagnostics);
        }
        if let Some(no_be) = event.no_be_mfe_r {
            self.no_be
                .observe_favorable(no_be, event.event_type, at, &mut self.diagnostics);
        }
        if let Some(mae) = event.mae_r {
            let recorded = self.be1.max_adverse_r.max(self.no_be.max_adverse_r);
            let be_regressed = self.be1.observe_adverse(mae, at);
            let no_be_regressed = self.no_be.observe_adverse(mae, at);
            if be_regressed || no_be_regressed {
                self.diagnostics.push(Anomaly::AdverseRegression {
                    reported: mae,
                    recorded,
                    at,
                });
            }
        }
    }

    fn exit(&mut self, variant: Variant, reason: CompletedReason, event: &TradeEvent) {
        let state = self.variant_mut(variant);
        if state.is_completed() {
            self.diagnostics.push(Anomaly::DuplicateExit {
                variant,
                event_type: event.event_type,
                at: event.event_timestamp,
            });
            return;
        }
        state.complete(reason, event.event_timestamp, event.current_price);
    }

    fn apply(&mut self, event: &TradeEvent, pre_entry: &mut Vec<(EventType, DateTime<Utc>)>) {
        let at = event.event_timestamp;
        self.event_count += 1;
        self.last_event_at = Some(self.last_event_at.map_or(at, |prev| prev.max(at)));

        if event.event_type == EventType::Entry {
            if self.entry.is_some() {
                self.diagnostics.push(Anomaly::DuplicateEntry { at });
            } else {
                self.entry = Some(event.clone());
                self.be1.activate(at);
                self.no_be.activate(at);
            }
            return;
        }

        if self.entry.is_none() {
            pre_entry.push((event.event_type, at));
            return;
        }

        match event.event_type {
            EventType::Entry => {}
            EventType::MfeUpdate => self.observe_path(event),
            EventType::BeTriggered => {
                self.observe_path(event);
                if !self.be1.is_active() {
                    self.diagnostics.push(Anomaly::UpdateAfterCompletion {
                        variant: Variant::Be1,
                        event_type: event.event_type,
                        at,
                    });
                } else if self.be1.stop_at_entry {
                    self.diagnostics.push(Anomaly::DuplicateBreakeven { at });
                } else {
                    if self.be1.max_favorable_r < Decimal::ONE {
                        self.diagnostics.push(Anomaly::BreakevenBelowThreshold {
                            max_favorable_r: self.be1.max_favorable_r,
                            at,
                        });
                    }
                    self.be1.stop_at_entry = true;
                    self.be1.breakeven_at = Some(at);
                }
            }
            EventType::ExitBreakEven => {
                self.observe_path(event);
                if self.be1.is_active() && !self.be1.stop_at_entry {
                    self.diagnostics
                        .push(Anomaly::BreakEvenExitWithoutTrigger { at });
                }
                self.exit(Variant::Be1, CompletedReason::BreakEvenStop, event);
            }
            EventType::ExitStopLoss => {
                self.observe_path(event);
                match event.variant {
                    Some(scope) => {
                        for variant in [Variant::Be1, Variant::NoBe] {
                            if scope.includes(variant) {
                                self.exit(variant, CompletedReason::StopLoss, event);
                            }
                        }
                    }
                    None => {
                        let active: Vec<Variant> = [Variant::Be1, Variant::NoBe]
                            .into_iter()
                            .filter(|v| self.variant(*v).is_active())
                            .collect();
                        if active.is_empty() {
                            for variant in [Variant::Be1, Variant::NoBe] {
                                self.exit(variant, CompletedReason::StopLoss, event);
                            }
                        }
                        for variant in active {
                            self.exit(variant, CompletedReason::StopLoss, event);
                        }
                    }
                }
            }
            EventType::Cancelled => {
                for variant in [Variant::Be1, Variant::NoBe] {
                    let state = self.variant_mut(variant);
                    if state.is_active() {
                        state.cancel(at);
                    } else {
                        self.diagnostics
                            .push(Anomaly::CancelAfterCompletion { variant, at });
                    }
                }
            }
        }
    }
}

/// Folds `events` (any order) into the two variant projections.
///
/// Never fails: malformed histories degrade to `AwaitingEntry` or carry
/// diagnostics.
pub fn project(trade_id: &str, events: &[TradeEvent]) -> TradeProjection {
    let mut ordered: Vec<TradeEvent> = events
        .iter()
        .filter(|e| e.trade_id == trade_id)
        .cloned()
        .collect();
    sort_events(&mut ordered);

    let mut projection = TradeProjection::new(trade_id);
    let mut pre_entry = Vec::new();
    for event in &ordered {
        projection.apply(event, &mut pre_entry);
    }

    if projection.entry.is_none() {
        if !pre_entry.is_empty() {
            projection.diagnostics.push(Anomaly::MissingEntry {
                events: pre_entry.len(),
            });
        }
    } else {
        for (event_type, at) in pre_entry {
            projection
                .diagnostics
                .push(Anomaly::EventBeforeEntry { event_type, at });
        }
    }

    for anomaly in &projection.diagnostics {
        warn!("[{}] {}", trade_id, anomaly);
    }

    debug_assert!(
        projection.entry.is_some()
            || (projection.be1.phase == VariantPhase::AwaitingEntry
                && projection.no_be.phase == VariantPhase::AwaitingEntry)
    );
    projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, TradeEventBuilder, VariantScope};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    const TRADE: &str = "20250612_093000000_BULLISH";

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 12, 13, 30, 0).unwrap() + Duration::minutes(minutes)
    }

    fn event(event_type: EventType, minutes: i64) -> TradeEventBuilder {
        TradeEventBuilder::new(TRADE, event_type, Direction::Bullish, at(minutes))
    }

    fn entry() -> TradeEvent {
        event(EventType::Entry, 0).prices(dec!(100), dec!(90)).build()
    }

    fn mfe(minutes: i64, be: Option<Decimal>, no_be: Option<Decimal>, mae: Option<Decimal>) -> TradeEvent {
        event(EventType::MfeUpdate, minutes)
            .excursions(be, no_be, mae)
            .build()
    }

    fn lifecycle() -> Vec<TradeEvent> {
        vec![
            entry(),
            mfe(1, Some(dec!(0.5)), Some(dec!(0.5)), Some(dec!(0.1))),
            event(EventType::BeTriggered, 2).build(),
            mfe(3, Some(dec!(1.2)), Some(dec!(2.0)), Some(dec!(0.1))),
            event(EventType::ExitBreakEven, 4).build(),
            mfe(5, None, Some(dec!(2.8)), None),
            event(EventType::ExitStopLoss, 6).variant(VariantScope::NoBe).build(),
        ]
    }

    #[test]
    fn test_full_lifecycle_scenario() {
        let events = lifecycle();

        let after_be_exit = project(TRADE, &events[..5]);
        assert_eq!(after_be_exit.status(), TradeStatus::Active);
        assert!(after_be_exit.be1.is_completed());
        assert!(after_be_exit.no_be.is_active());

        let after_mfe = project(TRADE, &events[..6]);
        assert_eq!(after_mfe.status(), TradeStatus::Active);
        assert_eq!(after_mfe.no_be.max_favorable_r, dec!(2.8));

        let done = project(TRADE, &events);
        assert_eq!(done.status(), TradeStatus::Completed);
        assert_eq!(done.be1.max_favorable_r, dec!(1.2));
        assert_eq!(done.be1.completed_reason, Some(CompletedReason::BreakEvenStop));
        assert_eq!(done.no_be.max_favorable_r, dec!(2.8));
        assert_eq!(done.no_be.completed_reason, Some(CompletedReason::StopLoss));
        assert_eq!(done.be1.max_adverse_r, dec!(0.1));
        assert!(done.be1.stop_at_entry);
        assert_eq!(done.completed_at(), Some(at(6)));
        // breakeven fired at 0.5R
        assert!(done
            .diagnostics
            .iter()
            .any(|a| matches!(a, Anomaly::BreakevenBelowThreshold { .. })));
    }

    #[test]
    fn test_variants_complete_at_their_own_timestamps() {
        let events = vec![
            entry(),
            mfe(1, Some(dec!(1.0)), Some(dec!(1.0)), None),
            event(EventType::ExitStopLoss, 7).variant(VariantScope::NoBe).build(),
            event(EventType::ExitStopLoss, 3).variant(VariantScope::Be1).build(),
        ];
        let p = project(TRADE, &events);
        assert_eq!(p.be1.completed_at, Some(at(3)));
        assert_eq!(p.no_be.completed_at, Some(at(7)));
        assert!(p.diagnostics.is_empty());
    }

    #[test]
    fn test_excursions_only_ratchet() {
        let events = vec![
            entry(),
            mfe(1, Some(dec!(0.4)), Some(dec!(0.4)), Some(dec!(0.2))),
            mfe(2, Some(dec!(0.9)), Some(dec!(0.9)), Some(dec!(0.5))),
            mfe(3, Some(dec!(0.7)), Some(dec!(1.3)), Some(dec!(0.3))),
        ];
        let p = project(TRADE, &events);
        assert_eq!(p.be1.max_favorable_r, dec!(0.9));
        assert_eq!(p.no_be.max_favorable_r, dec!(1.3));
        assert_eq!(p.be1.max_adverse_r, dec!(0.5));
        assert_eq!(p.no_be.max_adverse_r, dec!(0.5));
        // regression still advances staleness clock
        assert_eq!(p.be1.last_update_at, Some(at(3)));
        assert_eq!(
            p.diagnostics,
            vec![
                Anomaly::FavorableRegression {
                    variant: Variant::Be1,
                    reported: dec!(0.7),
                    recorded: dec!(0.9),
                    at: at(3),
                },
                Anomaly::AdverseRegression {
                    reported: dec!(0.3),
                    recorded: dec!(0.5),
                    at: at(3),
                },
            ]
        );
    }

    #[test]
    fn test_out_of_order_delivery_is_resequenced() {
        let mut events = lifecycle();
        events.reverse();
        let p = project(TRADE, &events);
        let ordered = project(TRADE, &lifecycle());
        assert_eq!(p.be1, ordered.be1);
        assert_eq!(p.no_be, ordered.no_be);
    }

    #[test]
    fn test_orphaned_events_await_entry() {
        let events = vec![
            mfe(1, Some(dec!(0.5)), Some(dec!(0.5)), None),
            event(EventType::ExitStopLoss, 2).build(),
        ];
        let p = project(TRADE, &events);
        assert_eq!(p.status(), TradeStatus::AwaitingEntry);
        assert_eq!(p.be1.phase, VariantPhase::AwaitingEntry);
        assert_eq!(p.no_be.phase, VariantPhase::AwaitingEntry);
        assert_eq!(p.diagnostics, vec![Anomaly::MissingEntry { events: 2 }]);
    }

    #[test]
    fn test_events_before_entry_are_flagged() {
        let events = vec![mfe(-5, Some(dec!(3.0)), None, None), entry()];
        let p = project(TRADE, &events);
        assert_eq!(p.status(), TradeStatus::Active);
        assert_eq!(p.be1.max_favorable_r, dec!(0));
        assert_eq!(
            p.diagnostics,
            vec![Anomaly::EventBeforeEntry {
                event_type: EventType::MfeUpdate,
                at: at(-5)
            }]
        );
    }

    #[test]
    fn test_cancel_before_any_update() {
        let events = vec![entry(), event(EventType::Cancelled, 1).build()];
        let p = project(TRADE, &events);
        assert_eq!(p.status(), TradeStatus::Completed);
        assert!(p.is_cancelled());
        assert_eq!(p.be1.completed_reason, Some(CompletedReason::Cancelled));
        assert_eq!(p.no_be.completed_reason, Some(CompletedReason::Cancelled));
    }

    #[test]
    fn test_cancel_discards_partial_excursions() {
        let events = vec![
            entry(),
            mfe(1, Some(dec!(0.3)), Some(dec!(0.3)), Some(dec!(0.2))),
            event(EventType::Cancelled, 2).build(),
        ];
        let p = project(TRADE, &events);
        assert_eq!(p.be1.max_favorable_r, dec!(0));
        assert_eq!(p.no_be.max_adverse_r, dec!(0));
    }

    #[test]
    fn test_first_exit_wins() {
        let events = vec![
            entry(),
            event(EventType::ExitStopLoss, 5)
                .variant(VariantScope::Be1)
                .current_price(dec!(90))
                .build(),
            event(EventType::ExitStopLoss, 9)
                .variant(VariantScope::Be1)
                .current_price(dec!(89))
                .build(),
        ];
        let p = project(TRADE, &events);
        assert_eq!(p.be1.completed_at, Some(at(5)));
        assert_eq!(p.be1.exit_price, Some(dec!(90)));
        assert!(p.no_be.is_active());
        assert_eq!(
            p.diagnostics,
            vec![Anomaly::DuplicateExit {
                variant: Variant::Be1,
                event_type: EventType::ExitStopLoss,
                at: at(9)
            }]
        );
    }

    #[test]
    fn test_unscoped_stop_loss_closes_remaining_variants() {
        let events = vec![
            entry(),
            event(EventType::BeTriggered, 1)
                .excursions(Some(dec!(1.0)), Some(dec!(1.0)), None)
                .build(),
            event(EventType::ExitBreakEven, 2).build(),
            event(EventType::ExitStopLoss, 3).build(),
        ];
        let p = project(TRADE, &events);
        assert_eq!(p.status(), TradeStatus::Completed);
        assert_eq!(p.be1.completed_reason, Some(CompletedReason::BreakEvenStop));
        assert_eq!(p.no_be.completed_reason, Some(CompletedReason::StopLoss));
        assert!(p.diagnostics.is_empty());
    }

    #[test]
    fn test_late_update_does_not_reopen_completed_variant() {
        let events = vec![
            entry(),
            mfe(1, Some(dec!(1.1)), Some(dec!(1.1)), None),
            event(EventType::BeTriggered, 2).build(),
            event(EventType::ExitBreakEven, 3).build(),
            mfe(4, Some(dec!(1.6)), Some(dec!(1.6)), None),
        ];
        let p = project(TRADE, &events);
        assert_eq!(p.be1.max_favorable_r, dec!(1.1));
        assert_eq!(p.no_be.max_favorable_r, dec!(1.6));
        assert_eq!(
            p.diagnostics,
            vec![Anomaly::UpdateAfterCompletion {
                variant: Variant::Be1,
                event_type: EventType::MfeUpdate,
                at: at(4)
            }]
        );
    }

    #[test]
    fn test_duplicate_entry_keeps_first() {
        let second = event(EventType::Entry, 10).prices(dec!(101), dec!(91)).build();
        let p = project(TRADE, &[entry(), second]);
        assert_eq!(p.entry.as_ref().and_then(|e| e.entry_price), Some(dec!(100)));
        assert_eq!(p.diagnostics, vec![Anomaly::DuplicateEntry { at: at(10) }]);
    }

    #[test]
    fn test_projection_ignores_foreign_events() {
        let foreign = TradeEventBuilder::new(
            "20250612_100000000_BEARISH",
            EventType::Cancelled,
            Direction::Bearish,
            at(1),
        )
        .build();
        let p = project(TRADE, &[entry(), foreign]);
        assert_eq!(p.status(), TradeStatus::Active);
        assert_eq!(p.event_count, 1);
    }
}
