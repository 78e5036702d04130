// src/api/webhook.rs
// POST /webhook: indicator event ingestion

use crate::errors::ServiceError;
use crate::ingest::IngestReport;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub async fn webhook(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ServiceError> {
    let request_id = Uuid::new_v4();
    async move {
        let Json(payload) =
            payload.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
        let report = state.ingest.ingest(&payload, Utc::now()).await?;
        Ok::<_, ServiceError>(respond(report))
    }
    .instrument(info_span!("webhook", %request_id))
    .await
}

fn respond(report: IngestReport) -> (StatusCode, Json<Value>) {
    if report.is_batch {
        let status = if report.accepted > 0 {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        return (
            status,
            Json(json!({
                "success": report.accepted > 0,
                "accepted": report.accepted,
                "inserted": report.inserted,
                "duplicates": report.duplicates,
                "orphaned": report.orphaned,
                "errors": report.errors,
            })),
        );
    }

    if let Some(rejection) = report.errors.first() {
        warn!("Webhook rejected: {}", rejection.error);
        let mut body = json!({"success": false, "error": rejection.error});
        if let Some(trade_id) = &rejection.trade_id {
            body["trade_id"] = json!(trade_id);
        }
        return (StatusCode::BAD_REQUEST, Json(body));
    }

    let trade_id = report.trade_ids.first().cloned().unwrap_or_default();
    info!(
        "Webhook accepted for {} ({})",
        trade_id,
        if report.inserted > 0 { "new" } else { "duplicate" }
    );
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "trade_id": trade_id,
            "inserted": report.inserted > 0,
            "duplicate": report.duplicates > 0,
            "orphaned": report.orphaned > 0,
        })),
    )
}
