//! Users and their search credits
//!
//! A user is created on first contact with one free search. Searches are
//! charged against free credits first, then paid ones; counters never go
//! below zero (the `CHECK` constraints back this up).

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::core::config::credits;
use crate::core::error::{is_unique_violation, AppError, AppResult};

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Surrogate row id
    pub id: i64,
    /// Telegram ID of the user
    pub telegram_id: i64,
    /// Telegram username, if the user has one
    pub username: Option<String>,
    /// Remaining free searches
    pub free_searches: i64,
    /// Remaining paid searches
    pub paid_searches: i64,
    pub created_at: NaiveDateTime,
}

impl User {
    /// Remaining searches of both kinds.
    pub fn total_searches(&self) -> i64 {
        self.free_searches.saturating_add(self.paid_searches)
    }

    pub fn credits(&self) -> Credits {
        Credits {
            free_searches: self.free_searches,
            paid_searches: self.paid_searches,
        }
    }
}

/// Remaining search credits of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Credits {
    pub free_searches: i64,
    pub paid_searches: i64,
}

impl Credits {
    pub fn total(&self) -> i64 {
        self.free_searches.saturating_add(self.paid_searches)
    }
}

/// Which counter `use_search` charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCharge {
    /// One free search was consumed
    Free,
    /// One paid search was consumed
    Paid,
    /// Both counters are at zero; nothing was consumed
    Exhausted,
}

impl SearchCharge {
    /// True when a credit was actually consumed.
    pub fn is_charged(self) -> bool {
        !matches!(self, SearchCharge::Exhausted)
    }
}

const USER_COLUMNS: &str = "id, telegram_id, username, free_searches, paid_searches, created_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        username: row.get(2)?,
        free_searches: row.get(3)?,
        paid_searches: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Creates a new user with the default credits.
///
/// # Returns
///
/// Returns `Ok(id)` with the row id of the new user.
///
/// # Errors
///
/// `AppError::DuplicateUser` if a user with this telegram_id already exists.
pub fn create_user(conn: &Connection, telegram_id: i64, username: Option<&str>) -> AppResult<i64> {
    match conn.execute(
        "INSERT INTO users (telegram_id, username) VALUES (?1, ?2)",
        params![telegram_id, username],
    ) {
        Ok(_) => {
            log::info!("Created new user: {}", telegram_id);
            Ok(conn.last_insert_rowid())
        }
        Err(e) if is_unique_violation(&e) => Err(AppError::DuplicateUser(telegram_id)),
        Err(e) => Err(e.into()),
    }
}

/// Gets a user by Telegram ID.
///
/// Returns `Ok(None)` if the user does not exist.
pub fn get_user(conn: &Connection, telegram_id: i64) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE telegram_id = ?1", USER_COLUMNS),
            params![telegram_id],
            map_user,
        )
        .optional()?;
    Ok(user)
}

/// Gets a user by Telegram ID, creating it on first contact.
///
/// Uses `INSERT OR IGNORE`, so two concurrent first messages from the same
/// user both end up reading the single row that won. An existing user's
/// username is left untouched.
pub fn get_or_create_user(conn: &Connection, telegram_id: i64, username: Option<&str>) -> AppResult<User> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO users (telegram_id, username) VALUES (?1, ?2)",
        params![telegram_id, username],
    )?;
    if inserted > 0 {
        log::info!("Created new user: {}", telegram_id);
    }

    get_user(conn, telegram_id)?.ok_or(AppError::UserNotFound(telegram_id))
}

/// Gets the remaining credits of a user.
///
/// An unknown user has no credits.
pub fn get_user_credits(conn: &Connection, telegram_id: i64) -> AppResult<Credits> {
    let credits = conn
        .query_row(
            "SELECT free_searches, paid_searches FROM users WHERE telegram_id = ?1",
            params![telegram_id],
            |row| {
                Ok(Credits {
                    free_searches: row.get(0)?,
                    paid_searches: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(credits.unwrap_or_default())
}

/// Consumes one search credit, free ones first.
///
/// Each decrement is a single conditional `UPDATE`, so concurrent callers
/// can never drive a counter below zero.
///
/// # Errors
///
/// `AppError::UserNotFound` if the user does not exist.
pub fn use_search(conn: &Connection, telegram_id: i64) -> AppResult<SearchCharge> {
    let free = conn.execute(
        "UPDATE users SET free_searches = free_searches - 1 WHERE telegram_id = ?1 AND free_searches > 0",
        params![telegram_id],
    )?;
    if free > 0 {
        log::debug!("User {} used a free search", telegram_id);
        return Ok(SearchCharge::Free);
    }

    let paid = conn.execute(
        "UPDATE users SET paid_searches = paid_searches - 1 WHERE telegram_id = ?1 AND paid_searches > 0",
        params![telegram_id],
    )?;
    if paid > 0 {
        log::debug!("User {} used a paid search", telegram_id);
        return Ok(SearchCharge::Paid);
    }

    if get_user(conn, telegram_id)?.is_none() {
        return Err(AppError::UserNotFound(telegram_id));
    }
    Ok(SearchCharge::Exhausted)
}

/// Adds paid searches to a user account.
///
/// # Errors
///
/// `AppError::Validation` for a negative amount or one that would overflow
/// the counter, `AppError::UserNotFound` if the user does not exist.
pub fn add_paid_searches(conn: &Connection, telegram_id: i64, amount: i64) -> AppResult<()> {
    if amount < 0 {
        return Err(AppError::Validation(format!(
            "cannot add a negative number of searches ({})",
            amount
        )));
    }

    // SQLite turns an overflowing INTEGER sum into a REAL, so the bound is checked in the UPDATE.
    let updated = conn.execute(
        "UPDATE users SET paid_searches = paid_searches + ?1 WHERE telegram_id = ?2 AND paid_searches <= ?3",
        params![amount, telegram_id, i64::MAX - amount],
    )?;
    if updated == 0 {
        return match get_user(conn, telegram_id)? {
            Some(user) => Err(AppError::Validation(format!(
                "adding {} searches to {} would overflow the paid balance",
                amount, user.paid_searches
            ))),
            None => Err(AppError::UserNotFound(telegram_id)),
        };
    }

    log::info!("Added {} searches to user {}", amount, telegram_id);
    Ok(())
}

/// Resets a user to the credits of a brand new account.
pub fn reset_user_credits(conn: &Connection, telegram_id: i64) -> AppResult<()> {
    let updated = conn.execute(
        "UPDATE users SET free_searches = ?1, paid_searches = ?2 WHERE telegram_id = ?3",
        params![
            credits::INITIAL_FREE_SEARCHES,
            credits::INITIAL_PAID_SEARCHES,
            telegram_id
        ],
    )?;
    if updated == 0 {
        return Err(AppError::UserNotFound(telegram_id));
    }

    log::info!("Reset credits of user {}", telegram_id);
    Ok(())
}

/// Grants the daily free search.
///
/// A user with no free searches left gets one back, at most once per
/// `today` (a UTC date). The grant is recorded in `daily_grants` in the same
/// transaction as the credit.
///
/// # Returns
///
/// `Ok(true)` if a search was granted, `Ok(false)` if the user still has a
/// free search or already got today's.
///
/// # Errors
///
/// `AppError::UserNotFound` if the user does not exist.
pub fn check_and_grant_daily_free_search(conn: &Connection, telegram_id: i64, today: NaiveDate) -> AppResult<bool> {
    let tx = conn.unchecked_transaction()?;

    let recorded = tx.execute(
        "INSERT OR IGNORE INTO daily_grants (telegram_id, granted_on)
         SELECT telegram_id, ?2 FROM users WHERE telegram_id = ?1 AND free_searches = 0",
        params![telegram_id, today],
    )?;
    if recorded == 0 {
        if get_user(&tx, telegram_id)?.is_none() {
            return Err(AppError::UserNotFound(telegram_id));
        }
        return Ok(false);
    }

    tx.execute(
        "UPDATE users SET free_searches = free_searches + 1 WHERE telegram_id = ?1",
        params![telegram_id],
    )?;
    tx.commit()?;

    log::info!("Granted daily free search to user {} for {}", telegram_id, today);
    Ok(true)
}

/// Gets every user, oldest first.
pub fn get_all_users(conn: &Connection) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
    let rows = stmt.query_map([], map_user)?;

    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{create_pool, get_connection, DbPool};
    use pretty_assertions::assert_eq;

    fn pool() -> DbPool {
        create_pool(":memory:").unwrap()
    }

    #[test]
    fn test_new_user_has_default_credits() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();

        create_user(&conn, 1001, Some("alice")).unwrap();
        let user = get_user(&conn, 1001).unwrap().unwrap();

        assert_eq!(user.telegram_id, 1001);
        assert_eq!(user.username.as_deref(), Some("alice"));
        assert_eq!(user.free_searches, 1);
        assert_eq!(user.paid_searches, 0);
    }

    #[test]
    fn test_duplicate_telegram_id_is_rejected() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();

        create_user(&conn, 1001, None).unwrap();
        let err = create_user(&conn, 1001, Some("other")).unwrap_err();

        assert!(matches!(err, AppError::DuplicateUser(1001)));
        assert_eq!(get_all_users(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_get_user_missing_returns_none() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        assert!(get_user(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn test_get_or_create_user_is_idempotent() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();

        let first = get_or_create_user(&conn, 7, Some("bob")).unwrap();
        let second = get_or_create_user(&conn, 7, Some("renamed")).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.username.as_deref(), Some("bob"));
    }

    #[test]
    fn test_use_search_consumes_free_then_paid() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();
        add_paid_searches(&conn, 1, 1).unwrap();

        assert_eq!(use_search(&conn, 1).unwrap(), SearchCharge::Free);
        assert_eq!(use_search(&conn, 1).unwrap(), SearchCharge::Paid);
        assert_eq!(use_search(&conn, 1).unwrap(), SearchCharge::Exhausted);

        assert_eq!(get_user_credits(&conn, 1).unwrap(), Credits::default());
    }

    #[test]
    fn test_use_search_unknown_user() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        assert!(matches!(use_search(&conn, 9).unwrap_err(), AppError::UserNotFound(9)));
    }

    #[test]
    fn test_counters_cannot_go_negative() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();

        let err = conn
            .execute("UPDATE users SET free_searches = -1 WHERE telegram_id = 1", [])
            .unwrap_err();
        assert!(crate::core::error::is_check_violation(&err));
    }

    #[test]
    fn test_add_paid_searches() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();

        add_paid_searches(&conn, 1, 5).unwrap();
        add_paid_searches(&conn, 1, 1).unwrap();

        let credits = get_user_credits(&conn, 1).unwrap();
        assert_eq!(credits.paid_searches, 6);
        assert_eq!(credits.total(), 7);
    }

    #[test]
    fn test_add_paid_searches_rejects_bad_input() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();

        assert!(matches!(add_paid_searches(&conn, 1, -3).unwrap_err(), AppError::Validation(_)));
        assert!(matches!(add_paid_searches(&conn, 2, 3).unwrap_err(), AppError::UserNotFound(2)));
    }

    #[test]
    fn test_add_paid_searches_rejects_overflow() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();
        add_paid_searches(&conn, 1, i64::MAX).unwrap();

        assert!(matches!(add_paid_searches(&conn, 1, 1).unwrap_err(), AppError::Validation(_)));

        let user = get_user(&conn, 1).unwrap().unwrap();
        assert_eq!(user.paid_searches, i64::MAX);
        assert_eq!(user.total_searches(), i64::MAX);
        assert_eq!(use_search(&conn, 1).unwrap(), SearchCharge::Free);
    }

    #[test]
    fn test_reset_user_credits() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        create_user(&conn, 1, None).unwrap();
        use_search(&conn, 1).unwrap();
        add_paid_searches(&conn, 1, 5).unwrap();

        reset_user_credits(&conn, 1).unwrap();

        let user = get_user(&conn, 1).unwrap().unwrap();
        assert_eq!(user.credits(), Credits { free_searches: 1, paid_searches: 0 });
    }

    #[test]
    fn test_daily_free_search_once_per_day() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let tuesday = monday.succ_opt().unwrap();
        create_user(&conn, 1, None).unwrap();

        // Still holding the sign-up search.
        assert!(!check_and_grant_daily_free_search(&conn, 1, monday).unwrap());

        use_search(&conn, 1).unwrap();
        assert!(check_and_grant_daily_free_search(&conn, 1, monday).unwrap());
        assert_eq!(get_user_credits(&conn, 1).unwrap().free_searches, 1);

        use_search(&conn, 1).unwrap();
        assert!(!check_and_grant_daily_free_search(&conn, 1, monday).unwrap());
        assert_eq!(get_user_credits(&conn, 1).unwrap().free_searches, 0);

        assert!(check_and_grant_daily_free_search(&conn, 1, tuesday).unwrap());
        assert_eq!(get_user_credits(&conn, 1).unwrap().free_searches, 1);
    }

    #[test]
    fn test_daily_free_search_unknown_user() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();

        assert!(matches!(
            check_and_grant_daily_free_search(&conn, 5, today).unwrap_err(),
            AppError::UserNotFound(5)
        ));
    }

    #[test]
    fn test_credits_of_unknown_user_are_zero() {
        let pool = pool();
        let conn = get_connection(&pool).unwrap();
        assert_eq!(get_user_credits(&conn, 404).unwrap().total(), 0);
    }
}
