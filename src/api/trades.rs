// src/api/trades.rs
// Read API over projected trades plus operator endpoints

use crate::errors::ServiceError;
use crate::state::AppState;
use crate::types::{Variant, VariantScope};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_LEADERBOARD_LIMIT: usize = 20;

#[derive(Debug, Default, Deserialize)]
pub struct CompletedQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub variant: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteTradesRequest {
    pub trade_ids: Vec<String>,
}

pub async fn active_trades(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    let trades = state.read_model.active_trades().await?;
    Ok(Json(json!({
        "success": true,
        "count": trades.len(),
        "trades": trades,
    })))
}

pub async fn completed_trades(
    State(state): State<AppState>,
    Query(query): Query<CompletedQuery>,
) -> Result<Json<Value>, ServiceError> {
    let limit = query.limit.unwrap_or(state.config.completed_default_limit);
    let trades = state.read_model.completed_trades(limit).await?;
    Ok(Json(json!({
        "success": true,
        "count": trades.len(),
        "trades": trades,
    })))
}

pub async fn trade_detail(
    State(state): State<AppState>,
    Path(trade_id): Path<String>,
) -> Result<Json<Value>, ServiceError> {
    let detail = state
        .read_model
        .trade_detail(&trade_id)
        .await?
        .ok_or(ServiceError::NotFound(trade_id))?;
    Ok(Json(json!({
        "success": true,
        "trade": detail,
    })))
}

pub async fn orphaned_trades(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    let trades = state.read_model.orphaned_trades().await?;
    Ok(Json(json!({
        "success": true,
        "count": trades.len(),
        "trades": trades,
    })))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Value>, ServiceError> {
    let variant = match query.variant.as_deref().map(str::parse::<VariantScope>) {
        None => Variant::Be1,
        Some(Ok(VariantScope::Be1)) => Variant::Be1,
        Some(Ok(VariantScope::NoBe)) => Variant::NoBe,
        Some(Ok(VariantScope::Both)) | Some(Err(_)) => {
            return Err(ServiceError::BadRequest(
                "variant must be BE1 or NO_BE".to_string(),
            ))
        }
    };
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    let rows = state.read_model.leaderboard(variant, limit).await?;
    Ok(Json(json!({
        "success": true,
        "variant": variant,
        "count": rows.len(),
        "trades": rows,
    })))
}

pub async fn delete_trades(
    State(state): State<AppState>,
    Json(request): Json<DeleteTradesRequest>,
) -> Result<Json<Value>, ServiceError> {
    let deleted = state.ingest.delete_trades(&request.trade_ids).await?;
    Ok(Json(json!({
        "success": true,
        "deleted_events": deleted,
        "trade_ids": request.trade_ids,
    })))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "store": state.store.kind(),
        "cached_projections": state.read_model.cache_len(),
        "signal_timezone": state.config.signal_timezone.name(),
        "started_at": state.started_at,
        "timestamp": Utc::now(),
    }))
}
