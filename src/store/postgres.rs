// src/store/postgres.rs
// Postgres-backed trade event log

use super::schema::{variant_column, EventRow, CREATE_TABLES, EVENT_COLUMNS};
use super::EventStore;
use crate::errors::StoreError;
use crate::types::TradeEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

const ENDS_BE1: &str = "(event_type IN ('CANCELLED', 'EXIT_BREAK_EVEN') \
     OR (event_type = 'EXIT_STOP_LOSS' AND variant IN ('', 'BE1', 'BOTH')))";
const ENDS_NO_BE: &str = "(event_type = 'CANCELLED' \
     OR (event_type = 'EXIT_STOP_LOSS' AND variant IN ('', 'NO_BE', 'BOTH')))";
// Terminal events only count from the earliest ENTRY on.
const WITH_ENTRIES: &str = "WITH entries AS (SELECT trade_id, MIN(event_timestamp) AS entry_at \
     FROM trade_events WHERE event_type = 'ENTRY' GROUP BY trade_id)";

#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        info!("Connected to Postgres (pool size {})", max_connections);
        Ok(Self { pool })
    }

    /// Creates the event table and indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in CREATE_TABLES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("trade_events schema verified");
        Ok(())
    }

    async fn ids(&self, sql: &str, since: Option<DateTime<Utc>>) -> Result<BTreeSet<String>, StoreError> {
        let mut query = sqlx::query_scalar::<_, String>(sql);
        if let Some(since) = since {
            query = query.bind(since);
        }
        let ids = query.fetch_all(&self.pool).await?;
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn append(&self, event: &TradeEvent) -> Result<bool, StoreError> {
        let sql = format!(
            "INSERT INTO trade_events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT ON CONSTRAINT trade_events_idempotency DO NOTHING"
        );
        let result = sqlx::query(&sql)
            .bind(&event.trade_id)
            .bind(event.event_type.as_str())
            .bind(variant_column(event.variant))
            .bind(event.direction.as_str())
            .bind(event.entry_price)
            .bind(event.stop_loss_price)
            .bind(event.current_price)
            .bind(event.be_mfe_r)
            .bind(event.no_be_mfe_r)
            .bind(event.mae_r)
            .bind(event.signal_date)
            .bind(event.signal_time)
            .bind(event.event_timestamp)
            .bind(&event.raw_payload)
            .bind(&event.payload_sha256)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT payload_sha256 FROM trade_events \
             WHERE trade_id = $1 AND event_timestamp = $2 AND event_type = $3 AND variant = $4",
        )
        .bind(&event.trade_id)
        .bind(event.event_timestamp)
        .bind(event.event_type.as_str())
        .bind(variant_column(event.variant))
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            Some(fp) if fp != event.payload_sha256 => warn!(
                "Redelivered {} for {} at {} carries a different payload, keeping the first",
                event.event_type, event.trade_id, event.event_timestamp
            ),
            _ => debug!("Duplicate {} for {} ignored", event.event_type, event.trade_id),
        }
        Ok(false)
    }

    async fn events_for(&self, trade_id: &str) -> Result<Vec<TradeEvent>, StoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM trade_events \
             WHERE trade_id = $1 ORDER BY event_timestamp, id"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(trade_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TradeEvent::try_from).collect()
    }

    async fn has_entry(&self, trade_id: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM trade_events WHERE trade_id = $1 AND event_type = 'ENTRY')",
        )
        .bind(trade_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn active_trade_ids(
        &self,
        since: DateTime<Utc>,
    ) -> Result<BTreeSet<String>, StoreError> {
        let sql = format!(
            "{WITH_ENTRIES} SELECT e.trade_id FROM entries e \
             JOIN trade_events t ON t.trade_id = e.trade_id \
             WHERE e.entry_at >= $1 \
             GROUP BY e.trade_id, e.entry_at \
             HAVING NOT (bool_or(t.event_timestamp >= e.entry_at AND {ENDS_BE1}) \
             AND bool_or(t.event_timestamp >= e.entry_at AND {ENDS_NO_BE}))"
        );
        self.ids(&sql, Some(since)).await
    }

    async fn terminal_trade_ids(&self) -> Result<BTreeSet<String>, StoreError> {
        let sql = format!(
            "{WITH_ENTRIES} SELECT e.trade_id FROM entries e \
             JOIN trade_events t ON t.trade_id = e.trade_id \
             WHERE t.event_timestamp >= e.entry_at AND ({ENDS_BE1} OR {ENDS_NO_BE}) \
             GROUP BY e.trade_id, e.entry_at"
        );
        self.ids(&sql, None).await
    }

    async fn orphaned_trade_ids(&self) -> Result<BTreeSet<String>, StoreError> {
        self.ids(
            "SELECT trade_id FROM trade_events GROUP BY trade_id \
             HAVING NOT bool_or(event_type = 'ENTRY')",
            None,
        )
        .await
    }

    async fn delete_trades(&self, trade_ids: &[String]) -> Result<u64, StoreError> {
        if trade_ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM trade_events WHERE trade_id = ANY($1)")
            .bind(trade_ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(
            "Deleted {} events across {} trade ids",
            result.rows_affected(),
            trade_ids.len()
        );
        Ok(result.rows_affected())
    }
}
