// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The persistent store
//!
//! One SQLite database holds every piece of state: media and server
//! configuration, the package index of each media, the files index with its
//! trigram FTS mirror, transaction history, pins and holds, peer
//! provenance, and cache accounting. Readers run concurrently; writers are
//! serialised by [`Database::writer`].

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Pool, Sqlite};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::environment;

pub mod cache;
pub mod constraints;
pub mod files;
pub mod history;
pub mod media;
pub mod packages;
pub mod peer;
pub mod server;

#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    writer: Arc<Mutex<()>>,
}

impl Database {
    pub async fn new(path: impl AsRef<Path>, read_only: bool) -> Result<Self, Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(!read_only)
            .read_only(read_only)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        Self::connect(options).await
    }

    /// In-memory database, used by tests
    pub async fn memory() -> Result<Self, Error> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::migrate!("src/db/migrations").run(&pool).await?;

        Ok(Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        })
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, Error> {
        let pool = sqlx::SqlitePool::connect_with(options).await?;

        sqlx::migrate!("src/db/migrations").run(&pool).await?;

        Ok(Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        })
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Serialise a mutation against every other in-process writer
    pub(crate) async fn writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    /// Run a write that may contend with the daemon's RPM-database sync.
    /// Retries on `database is locked` with a linearly growing delay.
    pub(crate) async fn retry_locked<T, F, Fut>(&self, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_locked(&e) && attempt + 1 < environment::DB_COMMIT_RETRIES => {
                    attempt += 1;
                    if attempt == 1 {
                        log::warn!("database locked, retrying");
                    }
                    tokio::time::sleep(Duration::from_millis(
                        environment::DB_COMMIT_BASE_DELAY_MS * u64::from(attempt),
                    ))
                    .await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Trade crash-durability for bulk import throughput. The caller must
    /// pair this with [`Self::end_bulk_import`].
    pub async fn begin_bulk_import(&self) -> Result<(), Error> {
        sqlx::query("PRAGMA synchronous = OFF")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA temp_store = MEMORY")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA cache_size = -64000")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Restore safe settings after a bulk import
    pub async fn end_bulk_import(&self) -> Result<(), Error> {
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA temp_store = DEFAULT")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA cache_size = -2000")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn is_locked(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.message().contains("locked"))
        .unwrap_or_default()
}

/// Does this error look like a broken FTS mirror? A dropped virtual table
/// is treated the same way as corruption: mark dirty, fall back, rebuild.
pub(crate) fn is_corruption(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| {
            let msg = d.message().to_lowercase();
            msg.contains("malformed")
                || msg.contains("corrupt")
                || msg.contains("no such table: package_files_fts")
        })
        .unwrap_or_default()
}

pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("row not found")]
    RowNotFound,
    #[error("sqlx")]
    Sqlx(#[source] sqlx::Error),
    #[error("sqlx migration")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Error::RowNotFound,
            error => Error::Sqlx(error),
        }
    }
}
