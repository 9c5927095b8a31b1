//! Telegram Stars products and payment settlement
//!
//! Invoices carry a payload naming the product; when Telegram reports a
//! successful payment the payload is parsed back and the payment is settled
//! against the store in a single transaction.

use rusqlite::{Connection, TransactionBehavior};
use std::fmt;

use crate::core::config::pricing;
use crate::core::error::{AppError, AppResult};
use crate::storage::events::{self, names};
use crate::storage::payments::{self, NewPayment};
use crate::storage::{searches, users};

/// Currency code of Telegram Stars
pub const STARS_CURRENCY: &str = "XTR";

/// Telegram rejects invoice payloads longer than this
pub const MAX_PAYLOAD_BYTES: usize = 128;

fn check_search_id(search_id: &str) -> AppResult<()> {
    if search_id.is_empty() {
        return Err(AppError::Validation("search id is empty".to_string()));
    }
    Ok(())
}

/// Something a user can buy with Stars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Product {
    /// One search, run immediately after payment
    PaidSearch,
    /// One search credit
    SearchPack1,
    /// Five search credits
    SearchPack5,
    /// Every link of a search
    UnlockAll { search_id: String },
    /// One link of a search
    UnlockSingle { search_id: String, result_index: usize },
}

impl Product {
    /// Price in Stars.
    pub fn price_stars(&self) -> i64 {
        match self {
            Product::PaidSearch | Product::SearchPack1 => pricing::SEARCH_COST_STARS,
            Product::SearchPack5 => pricing::SEARCH_PACK_5_STARS,
            Product::UnlockAll { .. } => pricing::UNLOCK_ALL_STARS,
            Product::UnlockSingle { .. } => pricing::UNLOCK_SINGLE_STARS,
        }
    }

    /// Searches recorded on the payment row.
    pub fn searches_granted(&self) -> i64 {
        match self {
            Product::PaidSearch | Product::SearchPack1 => 1,
            Product::SearchPack5 => pricing::SEARCH_PACK_5_SIZE,
            Product::UnlockAll { .. } | Product::UnlockSingle { .. } => 0,
        }
    }

    /// Searches added to the user's paid balance.
    ///
    /// A `PaidSearch` is consumed right away, so it is recorded but never
    /// credited.
    pub fn searches_credited(&self) -> i64 {
        match self {
            Product::PaidSearch => 0,
            other => other.searches_granted(),
        }
    }

    /// Invoice payload for this product.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` when the search id could not be parsed back
    /// into the same product: empty, `all`/`all_*` for a single unlock, or a
    /// payload longer than Telegram accepts.
    pub fn payload(&self) -> AppResult<String> {
        let payload = match self {
            Product::PaidSearch => "paid_search".to_string(),
            Product::SearchPack1 => "buy_1_search".to_string(),
            Product::SearchPack5 => "buy_5_searches".to_string(),
            Product::UnlockAll { search_id } => {
                check_search_id(search_id)?;
                format!("unlock_all_{}", search_id)
            }
            Product::UnlockSingle {
                search_id,
                result_index,
            } => {
                check_search_id(search_id)?;
                if search_id == "all" || search_id.starts_with("all_") {
                    return Err(AppError::Validation(format!(
                        "search id {:?} cannot be unlocked one result at a time",
                        search_id
                    )));
                }
                format!("unlock_{}_{}", search_id, result_index)
            }
        };

        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(AppError::Validation(format!(
                "invoice payload is {} bytes, limit is {}",
                payload.len(),
                MAX_PAYLOAD_BYTES
            )));
        }
        Ok(payload)
    }

    /// Parses an invoice payload.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` for anything that is not a known product.
    pub fn from_payload(payload: &str) -> AppResult<Self> {
        match payload {
            "paid_search" => return Ok(Product::PaidSearch),
            "buy_1_search" => return Ok(Product::SearchPack1),
            "buy_5_searches" => return Ok(Product::SearchPack5),
            _ => {}
        }

        if let Some(search_id) = payload.strip_prefix("unlock_all_") {
            if !search_id.is_empty() {
                return Ok(Product::UnlockAll {
                    search_id: search_id.to_string(),
                });
            }
        } else if let Some(rest) = payload.strip_prefix("unlock_") {
            if let Some((search_id, index)) = rest.rsplit_once('_') {
                if let (false, Ok(result_index)) = (search_id.is_empty(), index.parse::<usize>()) {
                    return Ok(Product::UnlockSingle {
                        search_id: search_id.to_string(),
                        result_index,
                    });
                }
            }
        }

        Err(AppError::Validation(format!("unknown invoice payload: {}", payload)))
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Product::PaidSearch => write!(f, "paid search"),
            Product::SearchPack1 => write!(f, "1 search"),
            Product::SearchPack5 => write!(f, "{} searches", pricing::SEARCH_PACK_5_SIZE),
            Product::UnlockAll { search_id } => write!(f, "unlock all of {}", search_id),
            Product::UnlockSingle {
                search_id,
                result_index,
            } => write!(f, "unlock result {} of {}", result_index, search_id),
        }
    }
}

/// The parts of Telegram's `successful_payment` update the store needs.
#[derive(Debug, Clone)]
pub struct SuccessfulPayment {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
    pub telegram_payment_charge_id: String,
}

/// Outcome of settling a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Payment recorded; `searches_added` credited to the paid balance
    Credited { payment_id: i64, searches_added: i64 },
    /// Payment recorded; `rows` search rows marked unlocked
    Unlocked { payment_id: i64, rows: usize },
    /// Payment recorded; nothing else to change in the store
    Recorded { payment_id: i64 },
    /// This charge id was settled before; nothing changed
    Duplicate { payment_id: i64 },
}

impl Settlement {
    pub fn payment_id(&self) -> i64 {
        match self {
            Settlement::Credited { payment_id, .. }
            | Settlement::Unlocked { payment_id, .. }
            | Settlement::Recorded { payment_id }
            | Settlement::Duplicate { payment_id } => *payment_id,
        }
    }
}

/// Settles a successful payment.
///
/// In one immediate transaction: skip charge ids that were already
/// recorded, make sure the payer has a user row, record the payment and a
/// `payment_completed` event, then credit searches or unlock the search the
/// product names. Telegram may
/// deliver the same update more than once; replays return
/// `Settlement::Duplicate` and change nothing.
///
/// The amount actually paid is recorded even when it differs from the
/// current price list.
pub fn settle_payment(conn: &mut Connection, payment: &SuccessfulPayment) -> AppResult<Settlement> {
    if payment.currency != STARS_CURRENCY {
        return Err(AppError::Validation(format!(
            "unsupported currency {} (expected {})",
            payment.currency, STARS_CURRENCY
        )));
    }
    let product = Product::from_payload(&payment.invoice_payload)?;
    if payment.total_amount != product.price_stars() {
        log::warn!(
            "Payment {} for {} paid {} stars, price list says {}",
            payment.telegram_payment_charge_id,
            product,
            payment.total_amount,
            product.price_stars()
        );
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(existing) = payments::find_payment_by_charge_id(&tx, &payment.telegram_payment_charge_id)? {
        log::warn!(
            "Payment {} already settled as row {}, skipping",
            payment.telegram_payment_charge_id,
            existing.id
        );
        return Ok(Settlement::Duplicate { payment_id: existing.id });
    }

    users::get_or_create_user(&tx, payment.telegram_id, payment.username.as_deref())?;

    let payment_id = payments::record_payment(
        &tx,
        &NewPayment {
            telegram_id: payment.telegram_id,
            stars_amount: payment.total_amount,
            searches_amount: product.searches_granted(),
            telegram_payment_id: &payment.telegram_payment_charge_id,
        },
    )?;
    events::track_event(
        &tx,
        payment.telegram_id,
        names::PAYMENT_COMPLETED,
        Some(&serde_json::json!({
            "type": payment.invoice_payload,
            "stars": payment.total_amount,
        })),
    )?;

    let settlement = match &product {
        Product::SearchPack1 | Product::SearchPack5 => {
            let searches_added = product.searches_credited();
            users::add_paid_searches(&tx, payment.telegram_id, searches_added)?;
            Settlement::Credited {
                payment_id,
                searches_added,
            }
        }
        Product::UnlockAll { search_id } => {
            let rows = searches::unlock_search_by_search_id(&tx, payment.telegram_id, search_id)?;
            Settlement::Unlocked { payment_id, rows }
        }
        Product::PaidSearch | Product::UnlockSingle { .. } => Settlement::Recorded { payment_id },
    };

    tx.commit()?;
    log::info!(
        "Settled payment {} from user {} for {}: {:?}",
        payment.telegram_payment_charge_id,
        payment.telegram_id,
        product,
        settlement
    );
    Ok(settlement)
}
