//! Subcommand implementations
//!
//! Every command writes its report to `out` so it can be captured in tests.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use facecore::storage::{events, migrations, payments, searches, stats, users};
use facecore::{get_connection, DbPool};

use crate::cli::Commands;

fn write_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("serialize report")?;
    writeln!(out)?;
    Ok(())
}

/// Runs one subcommand against an already migrated pool.
pub fn execute(pool: &DbPool, command: &Commands, out: &mut impl Write) -> Result<()> {
    let conn = get_connection(pool).context("get database connection")?;

    match command {
        Commands::Migrate => {
            // Pool creation already applied everything.
            match migrations::latest_version() {
                Some(version) => writeln!(out, "Database is at schema version {}", version)?,
                None => writeln!(out, "No migrations embedded")?,
            }
        }
        Commands::User { telegram_id, json } => {
            let user = users::get_user(&conn, *telegram_id)?
                .with_context(|| format!("user {} not found", telegram_id))?;
            if *json {
                write_json(out, &user)?;
            } else {
                writeln!(out, "User {} (@{})", user.telegram_id, user.username.as_deref().unwrap_or("-"))?;
                writeln!(out, "  free searches: {}", user.free_searches)?;
                writeln!(out, "  paid searches: {}", user.paid_searches)?;
                writeln!(out, "  created at:    {}", user.created_at)?;
            }
        }
        Commands::Grant { telegram_id, amount } => {
            users::add_paid_searches(&conn, *telegram_id, *amount)?;
            let credits = users::get_user_credits(&conn, *telegram_id)?;
            writeln!(
                out,
                "Granted {} searches to {} (now {} free, {} paid)",
                amount, telegram_id, credits.free_searches, credits.paid_searches
            )?;
        }
        Commands::Reset { telegram_id } => {
            users::reset_user_credits(&conn, *telegram_id)?;
            writeln!(out, "Reset credits of {}", telegram_id)?;
        }
        Commands::Searches { telegram_id, json } => {
            let rows = searches::get_user_searches(&conn, *telegram_id)?;
            if *json {
                write_json(out, &rows)?;
            } else {
                for s in &rows {
                    writeln!(
                        out,
                        "#{} {} results={} {} {}",
                        s.id,
                        s.search_id,
                        s.results_count,
                        if s.is_unlocked { "unlocked" } else { "locked" },
                        s.created_at
                    )?;
                }
                writeln!(out, "{} searches", rows.len())?;
            }
        }
        Commands::Payments { telegram_id, json } => {
            let rows = payments::get_user_payments(&conn, *telegram_id)?;
            if *json {
                write_json(out, &rows)?;
            } else {
                for p in &rows {
                    writeln!(
                        out,
                        "#{} {} stars, {} searches, charge {} at {}",
                        p.id, p.stars_amount, p.searches_amount, p.telegram_payment_id, p.created_at
                    )?;
                }
                writeln!(out, "{} payments", rows.len())?;
            }
        }
        Commands::Events { telegram_id, json } => {
            let rows = events::get_user_events(&conn, *telegram_id)?;
            if *json {
                write_json(out, &rows)?;
            } else {
                for e in &rows {
                    match &e.event_data {
                        Some(data) => writeln!(out, "#{} {} {} at {}", e.id, e.event_name, data, e.created_at)?,
                        None => writeln!(out, "#{} {} at {}", e.id, e.event_name, e.created_at)?,
                    }
                }
                writeln!(out, "{} events", rows.len())?;
            }
        }
        Commands::Stats { json } => {
            let stats = stats::get_stats(&conn)?;
            if *json {
                write_json(out, &stats)?;
            } else {
                writeln!(out, "Total users:   {}", stats.total_users)?;
                writeln!(out, "Paying users:  {}", stats.paying_users)?;
                writeln!(out, "Conversion:    {}%", stats.conversion_rate)?;
                writeln!(out, "Total revenue: {} stars", stats.total_stars)?;
                writeln!(
                    out,
                    "Searches:      {} ({} unlocked)",
                    stats.total_searches, stats.unlocked_searches
                )?;
                writeln!(out, "Events:")?;
                if stats.events.is_empty() {
                    writeln!(out, "  No events yet")?;
                }
                for (name, count) in &stats.events {
                    writeln!(out, "  {}: {}", name, count)?;
                }
            }
        }
    }

    Ok(())
}
