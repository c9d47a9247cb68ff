pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "estuary")]
#[command(about = "Feed synchronization and retention engine", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/estuary/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Number of parallel workers for fetching feeds
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new feed and fetch it
    Add {
        /// URL of the feed to add
        url: String,
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Remove a feed and all its items
    Remove {
        /// URL of the feed to remove
        url: String,
    },
    /// Update all feeds, or a single URL
    Update {
        #[arg(long)]
        url: Option<String>,
    },
    /// List feeds or items
    List {
        /// Show items instead of feeds
        #[arg(long)]
        items: bool,
        /// Restrict items to one feed id
        #[arg(long)]
        feed: Option<i64>,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an item read
    Read {
        id: i64,
        /// Mark unread instead
        #[arg(long)]
        unset: bool,
    },
    /// Star an item
    Star {
        id: i64,
        /// Remove the star instead
        #[arg(long)]
        unset: bool,
    },
    /// Delete an item; its content is scrubbed on the next flush
    Delete { id: i64 },
    /// Run retention and flush to disk
    Cleanup,
    /// Run in the foreground with automatic updates until interrupted
    Run,
}
