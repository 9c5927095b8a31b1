//! facecore - storage core of the face-search Telegram bot
//!
//! Users with free and paid search credits, the searches they run and the
//! Telegram Stars payments that buy more, kept in SQLite.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors and logging
//! - `storage`: pool, migrations and per-table operations
//! - `billing`: Stars products and payment settlement

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod billing;
pub mod core;
pub mod storage;

// Re-export commonly used types for convenience
pub use crate::core::{AppError, AppResult};
pub use crate::storage::{create_pool, get_connection, DbConnection, DbPool};
