//! HTTP handlers.

pub mod admin;
pub mod feed;
pub mod health;
pub mod jobs;
pub mod webhooks;

pub use health::{health, ready};
