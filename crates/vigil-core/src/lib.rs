//! Vigil Core — transport-agnostic domain logic for the Vigil anomaly
//! detection platform.
//!
//! This crate contains the data models, SQLite stores, AI oracle boundary,
//! workflow engine, and ingestion scheduler. It has **no HTTP framework
//! dependency** by default, making it suitable for use in:
//!
//! - HTTP servers (via `vigil-server`)
//! - CLI tools (via `vigil-cli`)
//! - Embedded schedulers and batch jobs
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `ServerError` for use in axum handlers.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ingest;
pub mod models;
pub mod oracle;
pub mod state;
pub mod store;
pub mod workflow;

// Convenience re-exports
pub use config::Settings;
pub use db::Database;
pub use error::ServerError;
pub use state::{AppState, AppStateInner};
