// src/read_model/mod.rs
// Dashboard-facing queries over projected trades

pub mod cache;

use crate::errors::StoreError;
use crate::normalizer::display_signal_time;
use crate::normalizer::trade_id::ParsedTradeId;
use crate::projector::{project, Anomaly, TradeProjection, TradeStatus, VariantState};
use crate::store::EventStore;
use crate::types::{CompletedReason, Direction, TradeEvent, Variant, VariantPhase};
use cache::{CachedTrade, ProjectionCache};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

const PROJECTION_CONCURRENCY: usize = 16;
pub const MAX_COMPLETED_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct VariantSummary {
    pub phase: VariantPhase,
    pub max_favorable_r: Decimal,
    pub max_adverse_r: Decimal,
    pub completed_reason: Option<CompletedReason>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub stop_at_entry: bool,
    pub last_update_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

impl VariantSummary {
    fn from_state(state: &VariantState, stale_before: DateTime<Utc>) -> Self {
        Self {
            phase: state.phase,
            max_favorable_r: state.max_favorable_r,
            max_adverse_r: state.max_adverse_r,
            completed_reason: state.completed_reason,
            completed_at: state.completed_at,
            exit_price: state.exit_price,
            stop_at_entry: state.stop_at_entry,
            last_update_at: state.last_update_at,
            stale: state.is_active() && state.last_update_at.map_or(true, |t| t < stale_before),
        }
    }
}

/// ENTRY fields merged with both variants, one dashboard row.
#[derive(Debug, Clone, Serialize)]
pub struct TradeSummary {
    pub trade_id: String,
    pub direction: Direction,
    /// Indicator-local signal time, `YYYY-MM-DD HH:MM:SS`.
    pub signal_time: String,
    pub entry_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub risk_distance: Option<Decimal>,
    pub entry_at: Option<DateTime<Utc>>,
    pub status: TradeStatus,
    pub be1: VariantSummary,
    pub no_be: VariantSummary,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub stale: bool,
    pub cancelled: bool,
    pub event_count: usize,
    pub anomaly_count: usize,
}

impl TradeSummary {
    pub fn from_projection(projection: &TradeProjection, stale_before: DateTime<Utc>) -> Self {
        let entry = projection.entry.as_ref();
        let direction = entry
            .map(|e| e.direction)
            .or_else(|| {
                ParsedTradeId::parse(&projection.trade_id)
                    .ok()
                    .map(|p| p.direction)
            })
            .unwrap_or(Direction::Bullish);
        let be1 = VariantSummary::from_state(&projection.be1, stale_before);
        let no_be = VariantSummary::from_state(&projection.no_be, stale_before);

        Self {
            trade_id: projection.trade_id.clone(),
            direction,
            signal_time: display_time(&projection.trade_id, entry),
            entry_price: entry.and_then(|e| e.entry_price),
            stop_loss_price: entry.and_then(|e| e.stop_loss_price),
            risk_distance: entry.and_then(TradeEvent::risk_distance),
            entry_at: entry.map(|e| e.event_timestamp),
            status: projection.status(),
            stale: be1.stale || no_be.stale,
            be1,
            no_be,
            completed_at: projection.completed_at(),
            last_event_at: projection.last_event_at,
            cancelled: projection.is_cancelled(),
            event_count: projection.event_count,
            anomaly_count: projection.diagnostics.len(),
        }
    }

    pub fn variant(&self, variant: Variant) -> &VariantSummary {
        match variant {
            Variant::Be1 => &self.be1,
            Variant::NoBe => &self.no_be,
        }
    }
}

/// Prefers the stored signal date/time; older rows only carry the trade_id.
fn display_time(trade_id: &str, entry: Option<&TradeEvent>) -> String {
    if let Some((date, time)) = entry.and_then(|e| e.signal_date.zip(e.signal_time)) {
        return display_signal_time(date, time);
    }
    match ParsedTradeId::parse(trade_id) {
        Ok(parsed) => display_signal_time(parsed.date, parsed.time),
        Err(_) => String::new(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeDetail {
    pub trade_id: String,
    pub status: TradeStatus,
    pub summary: TradeSummary,
    pub events: Vec<TradeEvent>,
    pub be1: VariantState,
    pub no_be: VariantState,
    pub diagnostics: Vec<Anomaly>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrphanedTrade {
    pub trade_id: String,
    pub event_count: usize,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub variant: Variant,
    #[serde(flatten)]
    pub summary: TradeSummary,
}

pub struct ReadModelService {
    store: Arc<dyn EventStore>,
    cache: ProjectionCache,
    stale_after: Duration,
    active_lookback: Option<Duration>,
}

impl ReadModelService {
    pub fn new(
        store: Arc<dyn EventStore>,
        stale_after: Duration,
        active_lookback: Option<Duration>,
    ) -> Self {
        Self {
            store,
            cache: ProjectionCache::new(),
            stale_after,
            active_lookback,
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drops the cached projection; called after every successful append.
    pub fn invalidate(&self, trade_id: &str) {
        self.cache.invalidate(trade_id);
    }

    /// Drops everything cached for a deleted trade.
    pub fn forget(&self, trade_id: &str) {
        self.cache.forget(trade_id);
    }

    async fn load(&self, trade_id: &str) -> Result<Arc<CachedTrade>, StoreError> {
        if let Some(hit) = self.cache.get(trade_id) {
            return Ok(hit);
        }
        let ticket = self.cache.ticket(trade_id);
        let events = self.store.events_for(trade_id).await?;
        let projection = project(trade_id, &events);
        let trade = Arc::new(CachedTrade { events, projection });
        self.cache.insert(trade_id, ticket, Arc::clone(&trade));
        Ok(trade)
    }

    async fn load_many(&self, ids: BTreeSet<String>) -> Result<Vec<Arc<CachedTrade>>, StoreError> {
        stream::iter(ids)
            .map(|id| async move { self.load(&id).await })
            .buffer_unordered(PROJECTION_CONCURRENCY)
            .try_collect()
            .await
    }

    fn stale_before(&self) -> DateTime<Utc> {
        Utc::now() - self.stale_after
    }

    /// Trades with at least one variant still ACTIVE, newest entry first.
    pub async fn active_trades(&self) -> Result<Vec<TradeSummary>, StoreError> {
        let since = match self.active_lookback {
            Some(lookback) => Utc::now() - lookback,
            None => DateTime::<Utc>::default(),
        };
        let ids = self.store.active_trade_ids(since).await?;
        let stale_before = self.stale_before();
        let mut rows: Vec<TradeSummary> = self
            .load_many(ids)
            .await?
            .iter()
            .filter(|t| t.projection.status() == TradeStatus::Active)
            .map(|t| TradeSummary::from_projection(&t.projection, stale_before))
            .collect();
        rows.sort_by(|a, b| b.entry_at.cmp(&a.entry_at).then(a.trade_id.cmp(&b.trade_id)));
        debug!("{} active trades", rows.len());
        Ok(rows)
    }

    /// Trades whose two variants have both completed, most recently completed first.
    pub async fn completed_trades(&self, limit: usize) -> Result<Vec<TradeSummary>, StoreError> {
        let limit = limit.min(MAX_COMPLETED_LIMIT);
        let ids = self.store.terminal_trade_ids().await?;
        let stale_before = self.stale_before();
        let mut rows: Vec<TradeSummary> = self
            .load_many(ids)
            .await?
            .iter()
            .filter(|t| t.projection.status() == TradeStatus::Completed)
            .map(|t| TradeSummary::from_projection(&t.projection, stale_before))
            .collect();
        rows.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then(a.trade_id.cmp(&b.trade_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    /// Full history plus both variant states. `None` when nothing is stored
    /// for the id.
    pub async fn trade_detail(&self, trade_id: &str) -> Result<Option<TradeDetail>, StoreError> {
        let trade = self.load(trade_id).await?;
        if trade.events.is_empty() {
            return Ok(None);
        }
        let projection = &trade.projection;
        Ok(Some(TradeDetail {
            trade_id: trade_id.to_string(),
            status: projection.status(),
            summary: TradeSummary::from_projection(projection, self.stale_before()),
            events: trade.events.clone(),
            be1: projection.be1.clone(),
            no_be: projection.no_be.clone(),
            diagnostics: projection.diagnostics.clone(),
        }))
    }

    pub async fn orphaned_trades(&self) -> Result<Vec<OrphanedTrade>, StoreError> {
        let ids = self.store.orphaned_trade_ids().await?;
        let mut rows: Vec<OrphanedTrade> = self
            .load_many(ids)
            .await?
            .iter()
            .map(|t| OrphanedTrade {
                trade_id: t.projection.trade_id.clone(),
                event_count: t.events.len(),
                first_event_at: t.events.iter().map(|e| e.event_timestamp).min(),
                last_event_at: t.projection.last_event_at,
            })
            .collect();
        rows.sort_by(|a, b| a.trade_id.cmp(&b.trade_id));
        if !rows.is_empty() {
            info!("{} trade ids awaiting an ENTRY", rows.len());
        }
        Ok(rows)
    }

    /// Completed, non-cancelled trades ranked by the variant's MFE.
    pub async fn leaderboard(
        &self,
        variant: Variant,
        limit: usize,
    ) -> Result<Vec<LeaderboardRow>, StoreError> {
        let mut rows: Vec<TradeSummary> = self
            .completed_trades(MAX_COMPLETED_LIMIT)
            .await?
            .into_iter()
            .filter(|s| !s.cancelled)
            .collect();
        rows.sort_by(|a, b| {
            b.variant(variant)
                .max_favorable_r
                .cmp(&a.variant(variant).max_favorable_r)
                .then(a.trade_id.cmp(&b.trade_id))
        });
        Ok(rows
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, summary)| LeaderboardRow {
                rank: i + 1,
                variant,
                summary,
            })
            .collect())
    }
}
