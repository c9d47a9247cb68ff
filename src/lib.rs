//! # Estuary
//!
//! Feed synchronization and retention engine: fetches RSS/Atom feeds,
//! merges their entries into a deduplicated news store and prunes that store
//! under a retention policy.
//!
//! ## Architecture
//!
//! ```text
//! FetchScheduler → ParseWorker (Normalizer → Merger) → working store
//!                                                         ↕ Mirror
//!                                                    durable store
//! ```
//!
//! An in-memory working store serves the session. It is loaded from the
//! on-disk durable store at startup and written back by the mirror, which
//! runs the retention pass for every feed before each copy.
//!
//! ## Quick Start
//!
//! ```bash
//! # Add a feed
//! estuary add https://blog.rust-lang.org/feed.xml
//!
//! # List feeds
//! estuary list
//!
//! # Update all feeds
//! estuary update
//!
//! # Keep running with automatic updates
//! estuary run
//! ```

/// Application context and error handling.
pub mod app;

/// Configuration management.
///
/// Loads from `~/.config/estuary/config.toml`: retention policy, proxy,
/// fetch transport, automatic updates and storage location.
pub mod config;

/// Foreground loop with the automatic update timer.
pub mod daemon;

/// Command-line interface using clap.
pub mod cli;

/// Core domain models.
///
/// - [`Feed`](domain::Feed): a syndicated source and its cached counts
/// - [`NewsItem`](domain::NewsItem): a stored entry with its state flags
/// - [`ParsedItem`](domain::ParsedItem): an entry as read from a document
pub mod domain;

/// Coordinator of the fetch, parse and mirror workers.
pub mod engine;

/// HTTP fetching and the bounded-concurrency fetch scheduler.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for feed fetching
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`FetchScheduler`](fetcher::scheduler::FetchScheduler): queue and worker pool
pub mod fetcher;

/// Insert-or-update merge of parsed entries.
pub mod merger;

/// Working store / durable store mirroring.
pub mod mirror;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0, Atom 0.3/1.0, and JSON Feed 1.0
/// into [`ParsedItem`](domain::ParsedItem)s.
pub mod normalizer;

/// Count, age and read based pruning.
pub mod retention;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
