//! Relational datastore access.
//!
//! This crate provides:
//! - `FeedStore`: keyset reads of publications per ranking cohort, viewer relations
//! - `WorkStore`: reads/writes performed by background workers
//! - `PgStore`: PostgreSQL implementation (schema is owned elsewhere)
//! - `MemoryStore`: in-process implementation for tests and local runs

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod repo;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repo::{FeedStore, WorkStore};
