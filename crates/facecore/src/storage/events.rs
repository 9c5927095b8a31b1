//! Funnel events
//!
//! Append-only log of what users do with the bot, counted per event name in
//! the admin statistics. The payload is free-form JSON.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use serde_json::Value;

use crate::core::error::{is_foreign_key_violation, AppError, AppResult};

/// Event names the bot records
pub mod names {
    pub const BOT_START: &str = "bot_start";
    pub const PHOTO_SENT: &str = "photo_sent";
    pub const PAYMENT_CLICKED: &str = "payment_clicked";
    pub const UNLOCK_CLICKED: &str = "unlock_clicked";
    pub const PAYMENT_COMPLETED: &str = "payment_completed";
    pub const SEARCH_COMPLETED: &str = "search_completed";
}

/// A row of the `events` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: i64,
    pub telegram_id: i64,
    pub event_name: String,
    pub event_data: Option<Value>,
    pub created_at: NaiveDateTime,
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let raw: Option<String> = row.get(3)?;
    let event_data = raw
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(Event {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        event_name: row.get(2)?,
        event_data,
        created_at: row.get(4)?,
    })
}

/// Records an event for a user.
///
/// # Errors
///
/// `AppError::Validation` for an empty name, `AppError::UnknownUser` if no
/// user has this telegram_id.
pub fn track_event(conn: &Connection, telegram_id: i64, event_name: &str, event_data: Option<&Value>) -> AppResult<i64> {
    if event_name.is_empty() {
        return Err(AppError::Validation("event name must not be empty".to_string()));
    }
    let data = event_data
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| AppError::Validation(format!("event data is not serializable: {}", e)))?;

    match conn.execute(
        "INSERT INTO events (telegram_id, event_name, event_data) VALUES (?1, ?2, ?3)",
        params![telegram_id, event_name, data],
    ) {
        Ok(_) => {
            log::debug!("Event {} for user {}", event_name, telegram_id);
            Ok(conn.last_insert_rowid())
        }
        Err(e) if is_foreign_key_violation(&e) => Err(AppError::UnknownUser(telegram_id)),
        Err(e) => Err(e.into()),
    }
}

/// Gets every event of a user, newest first.
pub fn get_user_events(conn: &Connection, telegram_id: i64) -> AppResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, telegram_id, event_name, event_data, created_at FROM events
         WHERE telegram_id = ?1 ORDER BY id DESC",
    )?;
    let rows = stmt.query_map(params![telegram_id], map_event)?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

/// Number of recorded events per event name.
pub fn count_events_by_name(conn: &Connection) -> AppResult<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare("SELECT event_name, COUNT(*) FROM events GROUP BY event_name")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut counts = BTreeMap::new();
    for row in rows {
        let (name, count) = row?;
        counts.insert(name, count);
    }
    Ok(counts)
}
