// src/store/mod.rs
// Append-only trade event storage

pub mod memory;
pub mod postgres;
pub mod schema;

use crate::errors::StoreError;
use crate::types::{EventType, TradeEvent, Variant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

pub use memory::MemoryEventStore;
pub use postgres::PostgresEventStore;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Short name for health output.
    fn kind(&self) -> &'static str;

    /// Stores `event` unless an event with the same key already exists.
    /// Returns `Ok(false)` for an idempotent repeat.
    async fn append(&self, event: &TradeEvent) -> Result<bool, StoreError>;

    /// Events for one trade, ascending by `event_timestamp` (ties in insert order).
    async fn events_for(&self, trade_id: &str) -> Result<Vec<TradeEvent>, StoreError>;

    async fn has_entry(&self, trade_id: &str) -> Result<bool, StoreError>;

    /// Trades with an ENTRY at or after `since` for which at least one variant
    /// has no terminal event yet.
    async fn active_trade_ids(&self, since: DateTime<Utc>)
        -> Result<BTreeSet<String>, StoreError>;

    /// Trades with an ENTRY and at least one terminal event.
    async fn terminal_trade_ids(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Trades that have events but no ENTRY.
    async fn orphaned_trade_ids(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Removes every event of every listed trade in one transaction. Returns the
    /// number of events removed.
    async fn delete_trades(&self, trade_ids: &[String]) -> Result<u64, StoreError>;
}

/// Terminal-event bookkeeping shared by the store implementations. Terminal
/// events before the earliest ENTRY are skipped, matching the projector.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TerminalFlags {
    pub entry_at: Option<DateTime<Utc>>,
    pub be1_done: bool,
    pub no_be_done: bool,
}

impl TerminalFlags {
    pub fn from_events<'a>(events: impl Iterator<Item = &'a TradeEvent> + Clone) -> Self {
        let entry_at = events
            .clone()
            .filter(|e| e.event_type == EventType::Entry)
            .map(|e| e.event_timestamp)
            .min();
        let mut flags = Self {
            entry_at,
            ..Default::default()
        };
        let Some(entry_at) = entry_at else {
            return flags;
        };
        for event in events.filter(|e| e.event_timestamp >= entry_at) {
            match event.event_type {
                EventType::Entry | EventType::MfeUpdate | EventType::BeTriggered => {}
                _ => {
                    flags.be1_done |= event.terminates(Variant::Be1);
                    flags.no_be_done |= event.terminates(Variant::NoBe);
                }
            }
        }
        flags
    }

    pub fn has_entry(&self) -> bool {
        self.entry_at.is_some()
    }

    pub fn any_terminal(&self) -> bool {
        self.be1_done || self.no_be_done
    }

    pub fn fully_terminal(&self) -> bool {
        self.be1_done && self.no_be_done
    }
}

/// Orders events the way the projector consumes them: by timestamp, then by
/// lifecycle rank, then by arrival.
pub fn sort_events(events: &mut [TradeEvent]) {
    events.sort_by(|a, b| {
        a.event_timestamp
            .cmp(&b.event_timestamp)
            .then(a.event_type.sequence_rank().cmp(&b.event_type.sequence_rank()))
    });
}
