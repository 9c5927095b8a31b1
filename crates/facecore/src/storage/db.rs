use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::core::config;
use crate::core::error::AppResult;
use crate::storage::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const MEMORY_PATH: &str = ":memory:";

/// Create a new database connection pool
///
/// Every connection handed out by the pool has foreign keys enforced and a
/// busy timeout set. Schema migrations run once on the first connection
/// before the pool is returned; a migration failure fails pool creation.
///
/// `":memory:"` yields a single-connection pool so every caller sees the
/// same in-memory database.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file, or `":memory:"`
///
/// # Example
///
/// ```no_run
/// use facecore::storage::db;
///
/// let pool = db::create_pool("database.sqlite")?;
/// # Ok::<(), facecore::core::AppError>(())
/// ```
pub fn create_pool(database_path: &str) -> AppResult<DbPool> {
    let (manager, max_size) = if database_path == MEMORY_PATH {
        (SqliteConnectionManager::memory(), 1)
    } else {
        (
            SqliteConnectionManager::file(database_path),
            config::pool::MAX_CONNECTIONS,
        )
    };

    let manager = manager.with_init(|conn| {
        conn.busy_timeout(config::pool::busy_timeout())?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });

    let pool = Pool::builder().max_size(max_size).build(manager)?;

    let mut conn = pool.get()?;
    migrations::run_migrations(&mut conn)?;
    drop(conn);

    log::info!("Database pool ready: {} (max {} connections)", database_path, max_size);
    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> AppResult<DbConnection> {
    Ok(pool.get()?)
}
