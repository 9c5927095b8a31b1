use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;

use crate::core::error::AppResult;
use crate::storage::events;

/// Aggregate bot statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_users: i64,
    /// Users with at least one recorded payment
    pub paying_users: i64,
    /// Paying users as a percentage of all users, one decimal
    pub conversion_rate: f64,
    /// Sum of stars over all payments
    pub total_stars: i64,
    pub total_searches: i64,
    pub unlocked_searches: i64,
    /// Recorded events per event name
    pub events: BTreeMap<String, i64>,
}

fn conversion_rate(paying_users: i64, total_users: i64) -> f64 {
    if total_users == 0 {
        return 0.0;
    }
    let percent = paying_users as f64 / total_users as f64 * 100.0;
    (percent * 10.0).round() / 10.0
}

/// Gets aggregate statistics over users, searches and payments.
pub fn get_stats(conn: &Connection) -> AppResult<Stats> {
    let total_users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let (paying_users, total_stars): (i64, i64) = conn.query_row(
        "SELECT COUNT(DISTINCT telegram_id), COALESCE(SUM(stars_amount), 0) FROM payments",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let (total_searches, unlocked_searches): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_unlocked THEN 1 ELSE 0 END), 0) FROM searches",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(Stats {
        total_users,
        paying_users,
        conversion_rate: conversion_rate(paying_users, total_users),
        total_stars,
        total_searches,
        unlocked_searches,
        events: events::count_events_by_name(conn)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{create_pool, get_connection};
    use crate::storage::events::{names, track_event};
    use crate::storage::payments::{record_payment, NewPayment};
    use crate::storage::searches::{create_search, unlock_search};
    use crate::storage::users::create_user;

    #[test]
    fn test_empty_database() {
        let pool = create_pool(":memory:").unwrap();
        let conn = get_connection(&pool).unwrap();

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.total_users, 0);
        assert_eq!(stats.total_stars, 0);
        assert_eq!(stats.conversion_rate, 0.0);
        assert!(stats.events.is_empty());
    }

    #[test]
    fn test_counts_paying_users_once() {
        let pool = create_pool(":memory:").unwrap();
        let conn = get_connection(&pool).unwrap();
        for id in 1..=3 {
            create_user(&conn, id, None).unwrap();
        }
        for charge in ["a", "b"] {
            record_payment(
                &conn,
                &NewPayment {
                    telegram_id: 1,
                    stars_amount: 75,
                    searches_amount: 1,
                    telegram_payment_id: charge,
                },
            )
            .unwrap();
        }
        let search = create_search(&conn, 2, "s").unwrap();
        create_search(&conn, 2, "t").unwrap();
        unlock_search(&conn, search).unwrap();
        track_event(&conn, 1, names::BOT_START, None).unwrap();
        track_event(&conn, 2, names::BOT_START, None).unwrap();

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.paying_users, 1);
        assert_eq!(stats.conversion_rate, 33.3);
        assert_eq!(stats.total_stars, 150);
        assert_eq!(stats.total_searches, 2);
        assert_eq!(stats.unlocked_searches, 1);
        assert_eq!(stats.events.get("bot_start"), Some(&2));
    }
}
