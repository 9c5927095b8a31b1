use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "facectl")]
#[command(author, version, about = "Operator tool for the face-search bot database", long_about = None)]
pub struct Cli {
    /// Path to the SQLite database (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database if needed and apply pending migrations
    Migrate,

    /// Show a user and their remaining credits
    User {
        telegram_id: i64,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Add paid searches to a user
    Grant {
        telegram_id: i64,

        /// Number of searches to add
        amount: i64,
    },

    /// Reset a user to one free search and no paid searches
    Reset { telegram_id: i64 },

    /// List a user's searches, newest first
    Searches {
        telegram_id: i64,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List a user's payments, newest first
    Payments {
        telegram_id: i64,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List a user's recorded events, newest first
    Events {
        telegram_id: i64,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show totals: users, conversion, revenue and events
    Stats {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
