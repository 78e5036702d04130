// src/store/memory.rs
// In-process event store used when no DATABASE_URL is configured, by the replay tool and in tests

use super::{EventStore, TerminalFlags};
use crate::errors::StoreError;
use crate::types::{EventKey, EventType, TradeEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

#[derive(Debug)]
struct StoredEvent {
    seq: u64,
    event: TradeEvent,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_seq: u64,
    trades: HashMap<String, Vec<StoredEvent>>,
    // key -> payload fingerprint
    keys: HashMap<EventKey, String>,
}

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.inner.read().keys.len()
    }

    fn flags_by_trade(&self) -> HashMap<String, TerminalFlags> {
        let inner = self.inner.read();
        inner
            .trades
            .iter()
            .map(|(trade_id, events)| {
                let flags = TerminalFlags::from_events(events.iter().map(|s| &s.event));
                (trade_id.clone(), flags)
            })
            .collect()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, event: &TradeEvent) -> Result<bool, StoreError> {
        let key = event.key();
        let mut inner = self.inner.write();

        if let Some(existing) = inner.keys.get(&key) {
            if *existing != event.payload_sha256 {
                warn!(
                    "Redelivered {} for {} at {} carries a different payload, keeping the first",
                    event.event_type, event.trade_id, event.event_timestamp
                );
            } else {
                debug!(
                    "Duplicate {} for {} ignored",
                    event.event_type, event.trade_id
                );
            }
            return Ok(false);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.keys.insert(key, event.payload_sha256.clone());
        inner
            .trades
            .entry(event.trade_id.clone())
            .or_default()
            .push(StoredEvent {
                seq,
                event: event.clone(),
            });
        Ok(true)
    }

    async fn events_for(&self, trade_id: &str) -> Result<Vec<TradeEvent>, StoreError> {
        let inner = self.inner.read();
        let mut stored: Vec<&StoredEvent> = match inner.trades.get(trade_id) {
            Some(events) => events.iter().collect(),
            None => return Ok(Vec::new()),
        };
        stored.sort_by_key(|s| (s.event.event_timestamp, s.seq));
        Ok(stored.into_iter().map(|s| s.event.clone()).collect())
    }

    async fn has_entry(&self, trade_id: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read();
        Ok(inner.trades.get(trade_id).is_some_and(|events| {
            events
                .iter()
                .any(|s| s.event.event_type == EventType::Entry)
        }))
    }

    async fn active_trade_ids(
        &self,
        since: DateTime<Utc>,
    ) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .flags_by_trade()
            .into_iter()
            .filter(|(_, flags)| {
                !flags.fully_terminal() && flags.entry_at.is_some_and(|t| t >= since)
            })
            .map(|(trade_id, _)| trade_id)
            .collect())
    }

    async fn terminal_trade_ids(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .flags_by_trade()
            .into_iter()
            .filter(|(_, flags)| flags.has_entry() && flags.any_terminal())
            .map(|(trade_id, _)| trade_id)
            .collect())
    }

    async fn orphaned_trade_ids(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .flags_by_trade()
            .into_iter()
            .filter(|(_, flags)| !flags.has_entry())
            .map(|(trade_id, _)| trade_id)
            .collect())
    }

    async fn delete_trades(&self, trade_ids: &[String]) -> Result<u64, StoreError> {
        let mut inner = self.inner.write();
        let mut removed = 0u64;
        for trade_id in trade_ids {
            if let Some(events) = inner.trades.remove(trade_id) {
                removed += events.len() as u64;
                for stored in events {
                    inner.keys.remove(&stored.event.key());
                }
            }
        }
        Ok(removed)
    }
}
