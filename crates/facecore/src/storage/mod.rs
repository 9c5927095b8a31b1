//! Database schema, migrations and per-table operations

pub mod db;
pub mod events;
pub mod migrations;
pub mod payments;
pub mod searches;
pub mod stats;
pub mod users;

// Re-exports for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use events::Event;
pub use payments::{NewPayment, Payment};
pub use searches::{NewSearch, Search};
pub use stats::Stats;
pub use users::{Credits, SearchCharge, User};
