// src/ingest.rs
// Webhook ingestion: normalize, append under a per-trade lock, invalidate projections

use crate::errors::{ServiceError, StoreError};
use crate::normalizer::{normalize_payload, Rejection};
use crate::read_model::ReadModelService;
use crate::store::EventStore;
use crate::types::{EventType, TradeEvent};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of one webhook call.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub is_batch: bool,
    pub accepted: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Accepted events whose trade_id has no ENTRY stored.
    pub orphaned: usize,
    pub trade_ids: Vec<String>,
    pub errors: Vec<Rejection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    Duplicate,
}

pub struct IngestService {
    store: Arc<dyn EventStore>,
    read_model: Arc<ReadModelService>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    append_timeout: Duration,
    signal_tz: Tz,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn EventStore>,
        read_model: Arc<ReadModelService>,
        append_timeout: Duration,
        signal_tz: Tz,
    ) -> Self {
        Self {
            store,
            read_model,
            locks: DashMap::new(),
            append_timeout,
            signal_tz,
        }
    }

    /// Normalizes and stores one webhook body. Envelope problems and storage
    /// failures are `Err`; bad items inside a batch are reported in
    /// `IngestReport::errors`.
    pub async fn ingest(
        &self,
        payload: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<IngestReport, ServiceError> {
        let batch = normalize_payload(payload, self.signal_tz, received_at)?;
        let mut report = IngestReport {
            is_batch: batch.is_batch,
            errors: batch.rejections,
            ..Default::default()
        };

        for event in &batch.events {
            let outcome = self.append(event).await?;
            report.accepted += 1;
            match outcome {
                AppendOutcome::Inserted => report.inserted += 1,
                AppendOutcome::Duplicate => report.duplicates += 1,
            }
            if event.event_type != EventType::Entry
                && !self.bounded(self.store.has_entry(&event.trade_id)).await?
            {
                warn!(
                    "Orphaned {} for {}: no ENTRY stored",
                    event.event_type, event.trade_id
                );
                report.orphaned += 1;
            }
            if !report.trade_ids.contains(&event.trade_id) {
                report.trade_ids.push(event.trade_id.clone());
            }
        }

        if report.is_batch {
            info!(
                "Batch ingested: {} accepted ({} new, {} duplicate), {} rejected",
                report.accepted,
                report.inserted,
                report.duplicates,
                report.errors.len()
            );
        }
        Ok(report)
    }

    /// Appends one event. Appends for the same trade_id are serialized.
    pub async fn append(&self, event: &TradeEvent) -> Result<AppendOutcome, StoreError> {
        let lock = self.trade_lock(&event.trade_id);
        let result = {
            let _guard = lock.lock().await;
            self.bounded(self.store.append(event)).await
        };
        drop(lock);
        self.locks
            .remove_if(&event.trade_id, |_, l| Arc::strong_count(l) == 1);

        if result? {
            self.read_model.invalidate(&event.trade_id);
            debug!(
                "Stored {} for {} at {}",
                event.event_type, event.trade_id, event.event_timestamp
            );
            Ok(AppendOutcome::Inserted)
        } else {
            debug!("Duplicate {} for {} acknowledged", event.event_type, event.trade_id);
            Ok(AppendOutcome::Duplicate)
        }
    }

    /// Operator cleanup: removes every event of the listed trades.
    pub async fn delete_trades(&self, trade_ids: &[String]) -> Result<u64, ServiceError> {
        if trade_ids.is_empty() {
            return Err(ServiceError::BadRequest("trade_ids must not be empty".to_string()));
        }
        let deleted = self.store.delete_trades(trade_ids).await?;
        for trade_id in trade_ids {
            self.read_model.forget(trade_id);
        }
        info!("Operator deleted {} trades ({} events)", trade_ids.len(), deleted);
        Ok(deleted)
    }

    fn trade_lock(&self, trade_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(trade_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.append_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Storage call exceeded {:?}", self.append_timeout);
                Err(StoreError::Timeout(self.append_timeout))
            }
        }
    }
}
