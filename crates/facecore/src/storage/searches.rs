//! Face search records
//!
//! Rows are never deleted. `results_count` and `is_unlocked` change after
//! the search runs and after the user pays to unlock it.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::core::error::{is_foreign_key_violation, AppError, AppResult};

/// A row of the `searches` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Search {
    pub id: i64,
    /// Telegram ID of the user who searched
    pub telegram_id: i64,
    /// Opaque id correlating the request with the search provider's results
    pub search_id: String,
    pub results_count: i64,
    pub is_unlocked: bool,
    pub created_at: NaiveDateTime,
}

/// Parameters for saving a new search
#[derive(Debug)]
pub struct NewSearch<'a> {
    pub telegram_id: i64,
    pub search_id: &'a str,
    pub results_count: i64,
    pub is_unlocked: bool,
}

const SEARCH_COLUMNS: &str = "id, telegram_id, search_id, results_count, is_unlocked, created_at";

fn map_search(row: &Row<'_>) -> rusqlite::Result<Search> {
    Ok(Search {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        search_id: row.get(2)?,
        results_count: row.get(3)?,
        is_unlocked: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn validate_results_count(count: i64) -> AppResult<()> {
    if count < 0 {
        return Err(AppError::Validation(format!("results_count must not be negative ({})", count)));
    }
    Ok(())
}

fn query_searches(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> AppResult<Vec<Search>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map_search)?;

    let mut searches = Vec::new();
    for row in rows {
        searches.push(row?);
    }
    Ok(searches)
}

/// Saves a search result.
///
/// # Returns
///
/// Returns `Ok(id)` on success (ID of the inserted row).
///
/// # Errors
///
/// `AppError::UnknownUser` if no user has this telegram_id.
pub fn save_search(conn: &Connection, search: &NewSearch) -> AppResult<i64> {
    validate_results_count(search.results_count)?;

    match conn.execute(
        "INSERT INTO searches (telegram_id, search_id, results_count, is_unlocked) VALUES (?1, ?2, ?3, ?4)",
        params![
            search.telegram_id,
            search.search_id,
            search.results_count,
            search.is_unlocked
        ],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_foreign_key_violation(&e) => Err(AppError::UnknownUser(search.telegram_id)),
        Err(e) => Err(e.into()),
    }
}

/// Creates a search relying on the column defaults (no results, locked).
pub fn create_search(conn: &Connection, telegram_id: i64, search_id: &str) -> AppResult<i64> {
    match conn.execute(
        "INSERT INTO searches (telegram_id, search_id) VALUES (?1, ?2)",
        params![telegram_id, search_id],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_foreign_key_violation(&e) => Err(AppError::UnknownUser(telegram_id)),
        Err(e) => Err(e.into()),
    }
}

/// Gets a search by row id.
pub fn get_search(conn: &Connection, id: i64) -> AppResult<Option<Search>> {
    let search = conn
        .query_row(
            &format!("SELECT {} FROM searches WHERE id = ?1", SEARCH_COLUMNS),
            params![id],
            map_search,
        )
        .optional()?;
    Ok(search)
}

/// Gets every row carrying this search id, oldest first.
pub fn get_searches_by_search_id(conn: &Connection, search_id: &str) -> AppResult<Vec<Search>> {
    query_searches(
        conn,
        &format!("SELECT {} FROM searches WHERE search_id = ?1 ORDER BY id", SEARCH_COLUMNS),
        params![search_id],
    )
}

/// Gets the searches of a user, newest first.
pub fn get_user_searches(conn: &Connection, telegram_id: i64) -> AppResult<Vec<Search>> {
    query_searches(
        conn,
        &format!(
            "SELECT {} FROM searches WHERE telegram_id = ?1 ORDER BY id DESC",
            SEARCH_COLUMNS
        ),
        params![telegram_id],
    )
}

/// Updates the number of results found for a search.
///
/// Returns `Ok(false)` if no search has this id.
pub fn set_results_count(conn: &Connection, id: i64, results_count: i64) -> AppResult<bool> {
    validate_results_count(results_count)?;
    let updated = conn.execute(
        "UPDATE searches SET results_count = ?1 WHERE id = ?2",
        params![results_count, id],
    )?;
    Ok(updated > 0)
}

/// Marks search results as unlocked.
///
/// Returns `Ok(false)` if no search has this id.
pub fn unlock_search(conn: &Connection, id: i64) -> AppResult<bool> {
    let updated = conn.execute("UPDATE searches SET is_unlocked = 1 WHERE id = ?1", params![id])?;
    if updated > 0 {
        log::info!("Unlocked search row {}", id);
    }
    Ok(updated > 0)
}

/// Marks every row of a user's search as unlocked.
///
/// Returns the number of rows updated; scoping by telegram_id keeps one
/// user's payment from unlocking another user's results.
pub fn unlock_search_by_search_id(conn: &Connection, telegram_id: i64, search_id: &str) -> AppResult<usize> {
    let updated = conn.execute(
        "UPDATE searches SET is_unlocked = 1 WHERE telegram_id = ?1 AND search_id = ?2",
        params![telegram_id, search_id],
    )?;
    log::info!("Unlocked search {} for user {} ({} rows)", search_id, telegram_id, updated);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{create_pool, get_connection};
    use crate::storage::users::create_user;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_search_defaults() {
        let pool = create_pool(":memory:").unwrap();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1001, None).unwrap();

        let id = create_search(&conn, 1001, "abc123").unwrap();
        let search = get_search(&conn, id).unwrap().unwrap();

        assert_eq!(search.search_id, "abc123");
        assert_eq!(search.results_count, 0);
        assert!(!search.is_unlocked);
    }

    #[test]
    fn test_search_for_unknown_user_is_rejected() {
        let pool = create_pool(":memory:").unwrap();
        let conn = get_connection(&pool).unwrap();

        let err = save_search(
            &conn,
            &NewSearch {
                telegram_id: 555,
                search_id: "x",
                results_count: 3,
                is_unlocked: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::UnknownUser(555)));
        assert!(matches!(create_search(&conn, 555, "y").unwrap_err(), AppError::UnknownUser(555)));
    }

    #[test]
    fn test_unlock_flips_flag() {
        let pool = create_pool(":memory:").unwrap();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();
        let id = create_search(&conn, 1, "s1").unwrap();

        assert!(unlock_search(&conn, id).unwrap());
        assert!(get_search(&conn, id).unwrap().unwrap().is_unlocked);
        assert!(!unlock_search(&conn, id + 100).unwrap());
    }

    #[test]
    fn test_lookup_by_search_id_returns_all_rows() {
        let pool = create_pool(":memory:").unwrap();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();
        create_user(&conn, 2, None).unwrap();
        create_search(&conn, 1, "shared").unwrap();
        create_search(&conn, 2, "shared").unwrap();
        create_search(&conn, 1, "other").unwrap();

        let rows = get_searches_by_search_id(&conn, "shared").unwrap();
        assert_eq!(rows.iter().map(|s| s.telegram_id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(get_searches_by_search_id(&conn, "missing").unwrap().is_empty());
    }

    #[test]
    fn test_user_searches_newest_first() {
        let pool = create_pool(":memory:").unwrap();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();
        create_search(&conn, 1, "first").unwrap();
        create_search(&conn, 1, "second").unwrap();

        let ids: Vec<String> = get_user_searches(&conn, 1)
            .unwrap()
            .into_iter()
            .map(|s| s.search_id)
            .collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[test]
    fn test_set_results_count() {
        let pool = create_pool(":memory:").unwrap();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();
        let id = create_search(&conn, 1, "s").unwrap();

        assert!(set_results_count(&conn, id, 10).unwrap());
        assert_eq!(get_search(&conn, id).unwrap().unwrap().results_count, 10);
        assert!(matches!(set_results_count(&conn, id, -1).unwrap_err(), AppError::Validation(_)));
    }

    #[test]
    fn test_unlock_by_search_id_is_scoped_to_user() {
        let pool = create_pool(":memory:").unwrap();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();
        create_user(&conn, 2, None).unwrap();
        let mine = create_search(&conn, 1, "shared").unwrap();
        let theirs = create_search(&conn, 2, "shared").unwrap();

        assert_eq!(unlock_search_by_search_id(&conn, 1, "shared").unwrap(), 1);
        assert!(get_search(&conn, mine).unwrap().unwrap().is_unlocked);
        assert!(!get_search(&conn, theirs).unwrap().unwrap().is_unlocked);
    }
}
