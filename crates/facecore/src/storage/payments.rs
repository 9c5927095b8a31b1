//! Telegram Stars payments
//!
//! Write-once: the `payments_no_update` / `payments_no_delete` triggers
//! abort any attempt to change a recorded payment.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::core::error::{is_foreign_key_violation, is_trigger_abort, AppError, AppResult};

/// A row of the `payments` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: i64,
    pub telegram_id: i64,
    /// Stars paid
    pub stars_amount: i64,
    /// Searches granted by this payment (0 for unlocks)
    pub searches_amount: i64,
    /// `telegram_payment_charge_id` of the successful payment
    pub telegram_payment_id: String,
    pub created_at: NaiveDateTime,
}

/// Parameters for recording a payment
#[derive(Debug)]
pub struct NewPayment<'a> {
    pub telegram_id: i64,
    pub stars_amount: i64,
    pub searches_amount: i64,
    pub telegram_payment_id: &'a str,
}

const PAYMENT_COLUMNS: &str = "id, telegram_id, stars_amount, searches_amount, telegram_payment_id, created_at";

fn map_payment(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        stars_amount: row.get(2)?,
        searches_amount: row.get(3)?,
        telegram_payment_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Records a successful payment.
///
/// # Returns
///
/// Returns `Ok(id)` on success (ID of the inserted row).
///
/// # Errors
///
/// `AppError::Validation` for negative amounts or an empty payment id,
/// `AppError::UnknownUser` if no user has this telegram_id.
pub fn record_payment(conn: &Connection, payment: &NewPayment) -> AppResult<i64> {
    if payment.stars_amount < 0 || payment.searches_amount < 0 {
        return Err(AppError::Validation(format!(
            "payment amounts must not be negative (stars={}, searches={})",
            payment.stars_amount, payment.searches_amount
        )));
    }
    if payment.telegram_payment_id.trim().is_empty() {
        return Err(AppError::Validation("telegram_payment_id must not be empty".to_string()));
    }

    match conn.execute(
        "INSERT INTO payments (telegram_id, stars_amount, searches_amount, telegram_payment_id) VALUES (?1, ?2, ?3, ?4)",
        params![
            payment.telegram_id,
            payment.stars_amount,
            payment.searches_amount,
            payment.telegram_payment_id
        ],
    ) {
        Ok(_) => {
            log::info!(
                "Payment recorded: {} paid {} stars for {} searches",
                payment.telegram_id,
                payment.stars_amount,
                payment.searches_amount
            );
            Ok(conn.last_insert_rowid())
        }
        Err(e) if is_foreign_key_violation(&e) => Err(AppError::UnknownUser(payment.telegram_id)),
        Err(e) => Err(e.into()),
    }
}

/// Gets a payment by row id.
pub fn get_payment(conn: &Connection, id: i64) -> AppResult<Option<Payment>> {
    let payment = conn
        .query_row(
            &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS),
            params![id],
            map_payment,
        )
        .optional()?;
    Ok(payment)
}

/// Finds the first payment recorded for a Telegram charge id.
pub fn find_payment_by_charge_id(conn: &Connection, telegram_payment_id: &str) -> AppResult<Option<Payment>> {
    let payment = conn
        .query_row(
            &format!(
                "SELECT {} FROM payments WHERE telegram_payment_id = ?1 ORDER BY id LIMIT 1",
                PAYMENT_COLUMNS
            ),
            params![telegram_payment_id],
            map_payment,
        )
        .optional()?;
    Ok(payment)
}

/// Gets the payments of a user, newest first.
pub fn get_user_payments(conn: &Connection, telegram_id: i64) -> AppResult<Vec<Payment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM payments WHERE telegram_id = ?1 ORDER BY id DESC",
        PAYMENT_COLUMNS
    ))?;
    let rows = stmt.query_map(params![telegram_id], map_payment)?;

    let mut payments = Vec::new();
    for row in rows {
        payments.push(row?);
    }
    Ok(payments)
}

/// Maps a trigger abort on `payments` to `AppError::PaymentImmutable`.
///
/// For callers issuing their own statements against the table.
pub fn classify_write_error(err: rusqlite::Error) -> AppError {
    if is_trigger_abort(&err) {
        AppError::PaymentImmutable
    } else {
        AppError::Database(err)
    }
}
