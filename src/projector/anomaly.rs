// src/projector/anomaly.rs
use crate::types::{EventType, Variant};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Data-quality findings raised while folding a trade's events. None of these
/// stop the fold; they travel alongside the derived state.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    #[error("{events} event(s) stored without an ENTRY")]
    MissingEntry { events: usize },

    #[error("second ENTRY at {at} ignored")]
    DuplicateEntry { at: DateTime<Utc> },

    #[error("{event_type} at {at} precedes the ENTRY and was ignored")]
    EventBeforeEntry {
        event_type: EventType,
        at: DateTime<Utc>,
    },

    #[error("{variant} favorable excursion reported {reported}R below recorded {recorded}R at {at}")]
    FavorableRegression {
        variant: Variant,
        reported: Decimal,
        recorded: Decimal,
        at: DateTime<Utc>,
    },

    #[error("adverse excursion reported {reported}R below recorded {recorded}R at {at}")]
    AdverseRegression {
        reported: Decimal,
        recorded: Decimal,
        at: DateTime<Utc>,
    },

    #[error("{variant} is already completed, {event_type} at {at} moved its excursion")]
    UpdateAfterCompletion {
        variant: Variant,
        event_type: EventType,
        at: DateTime<Utc>,
    },

    #[error("{variant} already exited, {event_type} at {at} ignored")]
    DuplicateExit {
        variant: Variant,
        event_type: EventType,
        at: DateTime<Utc>,
    },

    #[error("breakeven triggered at {at} with only {max_favorable_r}R recorded")]
    BreakevenBelowThreshold {
        max_favorable_r: Decimal,
        at: DateTime<Utc>,
    },

    #[error("breakeven already triggered, repeat at {at} ignored")]
    DuplicateBreakeven { at: DateTime<Utc> },

    #[error("break-even exit at {at} without a preceding BE_TRIGGERED")]
    BreakEvenExitWithoutTrigger { at: DateTime<Utc> },

    #[error("{variant} already completed when CANCELLED arrived at {at}")]
    CancelAfterCompletion { variant: Variant, at: DateTime<Utc> },
}
