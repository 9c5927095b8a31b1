use rusqlite::ffi;
use thiserror::Error;

/// Centralized error types for the store
///
/// Every storage operation returns this enum. SQLite constraint failures are
/// classified into the typed variants (`DuplicateUser`, `UnknownUser`,
/// `PaymentImmutable`) where the caller knows which constraint can fire.
///
/// # Example
///
/// ```no_run
/// use facecore::core::error::AppError;
///
/// fn describe(err: &AppError) -> String {
///     format!("store rejected write: {}", err)
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),

    /// A user with this telegram_id already exists
    #[error("User {0} already exists")]
    DuplicateUser(i64),

    /// A search or payment referenced a telegram_id with no user row
    #[error("No user with telegram_id {0} to reference")]
    UnknownUser(i64),

    /// Lookup of a user that must exist
    #[error("User {0} not found")]
    UserNotFound(i64),

    /// Attempt to change or remove a recorded payment
    #[error("Payments are immutable")]
    PaymentImmutable,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

/// Extended result code of a failed SQLite statement, if any.
fn extended_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code),
        _ => None,
    }
}

/// Returns true when `err` is a UNIQUE (or PRIMARY KEY) violation.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        extended_code(err),
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

/// Returns true when `err` is a FOREIGN KEY violation.
pub fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    extended_code(err) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

/// Returns true when `err` was raised by a trigger (`RAISE(ABORT, ...)`).
pub fn is_trigger_abort(err: &rusqlite::Error) -> bool {
    extended_code(err) == Some(ffi::SQLITE_CONSTRAINT_TRIGGER)
}

/// Returns true when `err` is a CHECK constraint violation.
pub fn is_check_violation(err: &rusqlite::Error) -> bool {
    extended_code(err) == Some(ffi::SQLITE_CONSTRAINT_CHECK)
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Validation(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Validation(err.to_string())
    }
}
