// src/read_model/cache.rs
// Per-trade projection cache, invalidated whenever a new event is appended for the trade

use crate::projector::TradeProjection;
use crate::types::TradeEvent;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A trade's ordered event history together with its folded projection.
#[derive(Debug, Clone)]
pub struct CachedTrade {
    pub events: Vec<TradeEvent>,
    pub projection: TradeProjection,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    trade: Arc<CachedTrade>,
}

/// Readers take a generation ticket before loading events; an insert made with
/// a ticket older than the latest invalidation is dropped so a slow reader can
/// never park a pre-append projection in the cache.
#[derive(Debug, Default)]
pub struct ProjectionCache {
    entries: DashMap<String, Slot>,
    generations: DashMap<String, u64>,
    // ticket handed out for trades with no recorded generation
    floor: AtomicU64,
    clock: AtomicU64,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, trade_id: &str) -> Option<Arc<CachedTrade>> {
        let current = self.ticket(trade_id);
        self.entries
            .get(trade_id)
            .filter(|slot| slot.generation == current)
            .map(|slot| Arc::clone(&slot.trade))
    }

    /// Current generation for `trade_id`; pass it back to `insert`.
    pub fn ticket(&self, trade_id: &str) -> u64 {
        self.generations
            .get(trade_id)
            .map_or_else(|| self.floor.load(Ordering::SeqCst), |g| *g)
    }

    pub fn insert(&self, trade_id: &str, ticket: u64, trade: Arc<CachedTrade>) -> bool {
        if self.ticket(trade_id) != ticket {
            debug!("Discarding projection for {} computed before an append", trade_id);
            return false;
        }
        self.entries.insert(
            trade_id.to_string(),
            Slot {
                generation: ticket,
                trade,
            },
        );
        true
    }

    pub fn invalidate(&self, trade_id: &str) {
        let next = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.generations.insert(trade_id.to_string(), next);
        self.entries.remove_if(trade_id, |_, slot| slot.generation < next);
    }

    /// Removes the slot and generation of a deleted trade. Raising the floor
    /// rejects inserts from readers that loaded the trade before the delete.
    pub fn forget(&self, trade_id: &str) {
        let next = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.floor.fetch_max(next, Ordering::SeqCst);
        self.generations.remove(trade_id);
        self.entries.remove(trade_id);
    }

    pub fn tracked(&self) -> usize {
        self.generations.len()
    }
}
