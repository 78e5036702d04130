// src/lib.rs
pub mod api;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod normalizer;
pub mod projector;
pub mod read_model;
pub mod state;
pub mod store;
pub mod types;
