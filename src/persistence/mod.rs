//! Persistence Layer
//!
//! SQLite storage for emitted composite signals and cycle summaries, async via
//! sqlx.
//!
//! # Database Schema
//!
//! ## composite_signals
//! - entity, generated_at: unique pair, a re-run of the same window replaces the row
//! - action, confidence, urgency, risk_level: indexed columns for querying
//! - payload: the full composite as JSON
//!
//! ## cycle_reports
//! - started_at, finished_at, timed_out
//! - summary: JSON counts per outcome

pub mod signal_repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub use signal_repository::SqliteSignalRepository;

/// Database connection pool
pub type DbPool = SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

/// Open (creating if needed) the signal database and run migrations
///
/// # Arguments
/// - `database_url`: e.g. "sqlite://data/signals.db" or "sqlite::memory:"
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    info!(database_url = %database_url, "Initializing database");

    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .log_statements(tracing::log::LevelFilter::Debug);

    // Every in-memory connection is its own database
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");
    Ok(pool)
}

pub(crate) async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS composite_signals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity TEXT NOT NULL,
            action TEXT NOT NULL,
            confidence REAL NOT NULL,
            urgency TEXT NOT NULL,
            risk_level TEXT NOT NULL,
            payload TEXT NOT NULL,
            generated_at DATETIME NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(entity, generated_at)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create composite_signals table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cycle_reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at DATETIME NOT NULL,
            finished_at DATETIME NOT NULL,
            timed_out BOOLEAN NOT NULL DEFAULT 0,
            summary TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create cycle_reports table: {}", e))
    })?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_composite_signals_generated_at ON composite_signals(generated_at)",
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    Ok(())
}
