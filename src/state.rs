// src/state.rs
// Shared service state handed to every axum handler

use crate::config::AppConfig;
use crate::errors::StoreError;
use crate::ingest::IngestService;
use crate::read_model::ReadModelService;
use crate::store::{EventStore, MemoryEventStore, PostgresEventStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn EventStore>,
    pub read_model: Arc<ReadModelService>,
    pub ingest: Arc<IngestService>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn EventStore>) -> Self {
        let read_model = Arc::new(ReadModelService::new(
            Arc::clone(&store),
            config.stale_after,
            config.active_lookback,
        ));
        let ingest = Arc::new(IngestService::new(
            Arc::clone(&store),
            Arc::clone(&read_model),
            config.ingest_timeout,
            config.signal_timezone,
        ));
        Self {
            config: Arc::new(config),
            store,
            read_model,
            ingest,
            started_at: Utc::now(),
        }
    }

    /// In-memory state, used by tests and when no database is configured.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Arc::new(MemoryEventStore::new()))
    }

    /// Connects to Postgres when `DATABASE_URL` is set, otherwise falls back to
    /// the in-memory store.
    pub async fn initialize(config: AppConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn EventStore> = match &config.database_url {
            Some(url) => {
                let pg = PostgresEventStore::connect(url, config.db_max_connections).await?;
                pg.ensure_schema().await?;
                Arc::new(pg)
            }
            None => {
                warn!("DATABASE_URL not set, events are kept in memory only");
                Arc::new(MemoryEventStore::new())
            }
        };
        info!("Event store: {}", store.kind());
        Ok(Self::new(config, store))
    }
}
