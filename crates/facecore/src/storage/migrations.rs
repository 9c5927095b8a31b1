use rusqlite::Connection;
use std::sync::{Mutex, OnceLock};

use crate::core::error::AppResult;

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

static MIGRATION_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Apply all pending schema migrations.
///
/// Runs are serialized per process; refinery wraps each migration in its
/// own transaction and records applied versions in
/// `refinery_schema_history`, so re-running is a no-op.
pub fn run_migrations(conn: &mut Connection) -> AppResult<usize> {
    let mutex = MIGRATION_LOCK.get_or_init(|| Mutex::new(()));
    // Migrations are idempotent, so a lock poisoned by a panicking runner is safe to reuse.
    let _guard = match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Migration lock was poisoned, recovering...");
            poisoned.into_inner()
        }
    };

    let report = embedded::migrations::runner().run(conn)?;
    let applied = report.applied_migrations();
    for migration in applied {
        log::info!("Applied migration {}", migration);
    }

    Ok(applied.len())
}

/// Latest schema version known to this build.
pub fn latest_version() -> Option<u32> {
    embedded::migrations::runner()
        .get_migrations()
        .iter()
        .map(|m| m.version())
        .max()
}
