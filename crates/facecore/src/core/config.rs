use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: database.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "database.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: facehunt.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "facehunt.log".to_string()));

/// Connection pool configuration
pub mod pool {
    use super::Duration;

    /// Maximum number of pooled connections for file-backed databases
    pub const MAX_CONNECTIONS: u32 = 10;

    /// How long a connection waits on a locked database (in seconds)
    pub const BUSY_TIMEOUT_SECS: u64 = 30;

    /// Busy timeout duration
    pub fn busy_timeout() -> Duration {
        Duration::from_secs(BUSY_TIMEOUT_SECS)
    }
}

/// Credits granted to every new user
pub mod credits {
    /// Free searches a user starts with (and is reset to)
    pub const INITIAL_FREE_SEARCHES: i64 = 1;

    /// Paid searches a user starts with (and is reset to)
    pub const INITIAL_PAID_SEARCHES: i64 = 0;
}

/// Telegram Stars pricing
pub mod pricing {
    /// Single search
    pub const SEARCH_COST_STARS: i64 = 75;

    /// Pack of five searches
    pub const SEARCH_PACK_5_STARS: i64 = 300;

    /// Searches in the big pack
    pub const SEARCH_PACK_5_SIZE: i64 = 5;

    /// Unlock one link of a search
    pub const UNLOCK_SINGLE_STARS: i64 = 10;

    /// Unlock every link of a search
    pub const UNLOCK_ALL_STARS: i64 = 35;

    /// Stars saved by buying the pack instead of five single searches
    pub fn pack_savings() -> i64 {
        SEARCH_COST_STARS * SEARCH_PACK_5_SIZE - SEARCH_PACK_5_STARS
    }
}
