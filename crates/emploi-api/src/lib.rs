//! Axum HTTP API server.
//!
//! This crate provides:
//! - The ranked, safety-filtered newsfeed
//! - Webhook triggers that enqueue background jobs
//! - Job and queue status endpoints
//! - Rate limiting, security headers and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
