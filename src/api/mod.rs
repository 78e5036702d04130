// src/api/mod.rs
pub mod trades;
pub mod webhook;

use crate::state::AppState;
use axum::routing::{delete, get, post};
use axum::Router;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook::webhook))
        .route("/active-trades", get(trades::active_trades))
        .route("/completed-trades", get(trades::completed_trades))
        .route("/trade/:trade_id", get(trades::trade_detail))
        .route("/orphaned-trades", get(trades::orphaned_trades))
        .route("/leaderboard", get(trades::leaderboard))
        .route("/trades", delete(trades::delete_trades))
        .route("/health", get(trades::health))
        .with_state(state)
}
