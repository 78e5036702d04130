// src/projector/variant.rs
// Per-variant lifecycle state folded from the shared event stream

use super::anomaly::Anomaly;
use crate::types::{CompletedReason, EventType, Variant, VariantPhase};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantState {
    pub variant: Variant,
    pub phase: VariantPhase,
    pub max_favorable_r: Decimal,
    pub max_adverse_r: Decimal,
    pub completed_reason: Option<CompletedReason>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    /// Last MFE/MAE observation, used for staleness.
    pub last_update_at: Option<DateTime<Utc>>,
    /// Stop moved to entry. Only the BE=1 variant ever sets this.
    pub stop_at_entry: bool,
    pub breakeven_at: Option<DateTime<Utc>>,
}

impl VariantState {
    pub fn awaiting(variant: Variant) -> Self {
        Self {
            variant,
            phase: VariantPhase::AwaitingEntry,
            max_favorable_r: Decimal::ZERO,
            max_adverse_r: Decimal::ZERO,
            completed_reason: None,
            completed_at: None,
            exit_price: None,
            last_update_at: None,
            stop_at_entry: false,
            breakeven_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == VariantPhase::Active
    }

    pub fn is_completed(&self) -> bool {
        self.phase == VariantPhase::Completed
    }

    pub(crate) fn activate(&mut self, at: DateTime<Utc>) {
        self.phase = VariantPhase::Active;
        self.last_update_at = Some(at);
    }

    /// Folds in a reported favorable excursion. Values only ratchet upward; a
    /// lower report still counts as a sign of life.
    pub(crate) fn observe_favorable(
        &mut self,
        reported: Decimal,
        event_type: EventType,
        at: DateTime<Utc>,
        anomalies: &mut Vec<Anomaly>,
    ) {
        match self.phase {
            VariantPhase::Active => {
                if reported < self.max_favorable_r {
                    anomalies.push(Anomaly::FavorableRegression {
                        variant: self.variant,
                        reported,
                        recorded: self.max_favorable_r,
                        at,
                    });
                } else {
                    self.max_favorable_r = reported;
                }
                self.touch(at);
            }
            VariantPhase::Completed if reported > self.max_favorable_r => {
                anomalies.push(Anomaly::UpdateAfterCompletion {
                    variant: self.variant,
                    event_type,
                    at,
                });
            }
            _ => {}
        }
    }

    /// Returns whether `reported` was below the recorded value so the caller can
    /// raise the shared-path anomaly once rather than once per variant.
    pub(crate) fn observe_adverse(&mut self, reported: Decimal, at: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.touch(at);
        if reported < self.max_adverse_r {
            return true;
        }
        self.max_adverse_r = reported;
        false
    }

    pub(crate) fn complete(
        &mut self,
        reason: CompletedReason,
        at: DateTime<Utc>,
        exit_price: Option<Decimal>,
    ) {
        self.phase = VariantPhase::Completed;
        self.completed_reason = Some(reason);
        self.completed_at = Some(at);
        self.exit_price = exit_price;
        self.touch(at);
    }

    /// Pre-entry invalidation: excursion data gathered so far is discarded.
    pub(crate) fn cancel(&mut self, at: DateTime<Utc>) {
        self.max_favorable_r = Decimal::ZERO;
        self.max_adverse_r = Decimal::ZERO;
        self.complete(CompletedReason::Cancelled, at, None);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_update_at = Some(self.last_update_at.map_or(at, |prev| prev.max(at)));
    }
}
