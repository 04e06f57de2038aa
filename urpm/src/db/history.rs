// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Transaction history
//!
//! Every mutation of the host is recorded as a history row owning an
//! ordered list of package rows. Completion and abort commits run through
//! the locked-retry path because the background daemon may hold the write
//! lock while syncing the RPM database.

use std::fmt;

use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::{unix_now, Database, Error};

/// What a transaction did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Remove,
    Upgrade,
    Undo,
    Rollback,
    Autoremove,
    Cleandeps,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Install => "install",
            Action::Remove => "remove",
            Action::Upgrade => "upgrade",
            Action::Undo => "undo",
            Action::Rollback => "rollback",
            Action::Autoremove => "autoremove",
            Action::Cleandeps => "cleandeps",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "install" => Some(Action::Install),
            "remove" => Some(Action::Remove),
            "upgrade" => Some(Action::Upgrade),
            "undo" => Some(Action::Undo),
            "rollback" => Some(Action::Rollback),
            "autoremove" => Some(Action::Autoremove),
            "cleandeps" => Some(Action::Cleandeps),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Lifecycle state of a transaction row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Complete,
    Interrupted,
    Cleaned,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Running => "running",
            Status::Complete => "complete",
            Status::Interrupted => "interrupted",
            Status::Cleaned => "cleaned",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Transaction {
    pub id: i64,
    pub timestamp: i64,
    pub user: String,
    pub action: String,
    pub status: String,
    pub return_code: Option<i64>,
    pub command: Option<String>,
    pub undone_by: Option<i64>,
}

/// One package row inside a transaction
#[derive(Debug, Clone, FromRow)]
pub struct TransactionPackage {
    pub pkg_nevra: String,
    pub pkg_name: String,
    pub action: String,
    pub reason: String,
    pub previous_nevra: Option<String>,
}

impl Database {
    pub async fn begin_history_transaction(
        &self,
        action: Action,
        command: Option<&str>,
    ) -> Result<i64, Error> {
        let _guard = self.writer().await;
        let user = std::env::var("SUDO_USER")
            .or_else(|_| std::env::var("USER"))
            .unwrap_or_else(|_| nix::unistd::Uid::current().to_string());
        let result = sqlx::query(
            "INSERT INTO history (timestamp, user, action, status, command)
             VALUES (?, ?, ?, 'running', ?)",
        )
        .bind(unix_now())
        .bind(user)
        .bind(action.as_str())
        .bind(command)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Record the package list of a transaction in one batch, preserving
    /// the given order
    pub async fn record_packages(
        &self,
        transaction_id: i64,
        packages: &[TransactionPackage],
    ) -> Result<(), Error> {
        if packages.is_empty() {
            return Ok(());
        }
        let _guard = self.writer().await;
        let mut tx = self.pool().begin().await?;
        for chunk in packages.chunks(100) {
            QueryBuilder::<Sqlite>::new(
                "INSERT INTO history_packages
                 (history_id, pkg_nevra, pkg_name, action, reason, previous_nevra) ",
            )
            .push_values(chunk, |mut b, pkg| {
                b.push_bind(transaction_id)
                    .push_bind(&pkg.pkg_nevra)
                    .push_bind(&pkg.pkg_name)
                    .push_bind(&pkg.action)
                    .push_bind(&pkg.reason)
                    .push_bind(&pkg.previous_nevra);
            })
            .build()
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn record_package(
        &self,
        transaction_id: i64,
        package: TransactionPackage,
    ) -> Result<(), Error> {
        self.record_packages(transaction_id, std::slice::from_ref(&package))
            .await
    }

    pub async fn complete_transaction(
        &self,
        transaction_id: i64,
        return_code: i64,
    ) -> Result<(), Error> {
        let _guard = self.writer().await;
        let pool = self.pool().clone();
        self.retry_locked(move || {
            let pool = pool.clone();
            async move {
                sqlx::query("UPDATE history SET status = 'complete', return_code = ? WHERE id = ?")
                    .bind(return_code)
                    .bind(transaction_id)
                    .execute(&pool)
                    .await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn abort_transaction(&self, transaction_id: i64) -> Result<(), Error> {
        let _guard = self.writer().await;
        let pool = self.pool().clone();
        self.retry_locked(move || {
            let pool = pool.clone();
            async move {
                sqlx::query(
                    "UPDATE history SET status = 'interrupted', return_code = -1 WHERE id = ?",
                )
                .bind(transaction_id)
                .execute(&pool)
                .await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn mark_undone(&self, transaction_id: i64, undone_by: i64) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("UPDATE history SET undone_by = ? WHERE id = ?")
            .bind(undone_by)
            .bind(transaction_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Interrupted transactions whose faildeps were cleaned up afterwards
    pub async fn mark_cleaned(&self, transaction_id: i64) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("UPDATE history SET status = 'cleaned' WHERE id = ?")
            .bind(transaction_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_history(
        &self,
        limit: i64,
        action_filter: Option<Action>,
    ) -> Result<Vec<Transaction>, Error> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, timestamp, user, action, status, return_code, command, undone_by
             FROM history",
        );
        if let Some(action) = action_filter {
            query.push(" WHERE action = ");
            query.push_bind(action.as_str());
        }
        query.push(" ORDER BY id DESC LIMIT ");
        query.push_bind(limit);
        Ok(query
            .build_query_as::<Transaction>()
            .fetch_all(self.pool())
            .await?)
    }

    /// A transaction with its ordered package rows
    pub async fn get_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Option<(Transaction, Vec<TransactionPackage>)>, Error> {
        let transaction_query = sqlx::query_as::<_, Transaction>(
            "SELECT id, timestamp, user, action, status, return_code, command, undone_by
             FROM history WHERE id = ?",
        )
        .bind(transaction_id)
        .fetch_optional(self.pool());

        let packages_query = sqlx::query_as::<_, TransactionPackage>(
            "SELECT pkg_nevra, pkg_name, action, reason, previous_nevra
             FROM history_packages WHERE history_id = ? ORDER BY id",
        )
        .bind(transaction_id)
        .fetch_all(self.pool());

        let (transaction, packages) = futures::try_join!(transaction_query, packages_query)?;

        Ok(transaction.map(|t| (t, packages)))
    }

    /// Most recent `complete` transaction that has not been undone
    pub async fn last_complete_transaction(&self) -> Result<Option<Transaction>, Error> {
        Ok(sqlx::query_as::<_, Transaction>(
            "SELECT id, timestamp, user, action, status, return_code, command, undone_by
             FROM history WHERE status = 'complete' AND undone_by IS NULL
             ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?)
    }

    /// Complete, not-yet-undone transactions, newest first, for rollback
    pub async fn undoable_transactions(&self, limit: i64) -> Result<Vec<Transaction>, Error> {
        Ok(sqlx::query_as::<_, Transaction>(
            "SELECT id, timestamp, user, action, status, return_code, command, undone_by
             FROM history WHERE status = 'complete' AND undone_by IS NULL
             ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn interrupted_transactions(&self) -> Result<Vec<Transaction>, Error> {
        Ok(sqlx::query_as::<_, Transaction>(
            "SELECT id, timestamp, user, action, status, return_code, command, undone_by
             FROM history WHERE status = 'interrupted' ORDER BY id DESC",
        )
        .fetch_all(self.pool())
        .await?)
    }

    /// Dependency-reason installs left behind by an interrupted transaction
    pub async fn faildep_candidates(&self, transaction_id: i64) -> Result<Vec<String>, Error> {
        Ok(sqlx::query_scalar(
            "SELECT pkg_nevra FROM history_packages
             WHERE history_id = ? AND reason = 'dependency' AND action = 'install'
             ORDER BY id",
        )
        .bind(transaction_id)
        .fetch_all(self.pool())
        .await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pkg(nevra: &str, action: &str, reason: &str) -> TransactionPackage {
        TransactionPackage {
            pkg_nevra: nevra.to_owned(),
            pkg_name: nevra.split('-').next().unwrap_or(nevra).to_owned(),
            action: action.to_owned(),
            reason: reason.to_owned(),
            previous_nevra: None,
        }
    }

    #[tokio::test]
    async fn record_roundtrip_preserves_order() {
        let db = Database::memory().await.unwrap();
        let id = db
            .begin_history_transaction(Action::Install, Some("urpm install wget"))
            .await
            .unwrap();
        db.record_packages(
            id,
            &[
                pkg("wget-1.21-1.mga10.x86_64", "install", "explicit"),
                pkg("libpsl-0.21-1.mga10.x86_64", "install", "dependency"),
                pkg("libidn2-2.3-1.mga10.x86_64", "install", "dependency"),
            ],
        )
        .await
        .unwrap();
        db.complete_transaction(id, 0).await.unwrap();

        let (row, packages) = db.get_transaction(id).await.unwrap().unwrap();
        assert_eq!(row.status, "complete");
        assert_eq!(row.action, "install");
        assert_eq!(
            packages.iter().map(|p| p.pkg_name.as_str()).collect::<Vec<_>>(),
            vec!["wget", "libpsl", "libidn2"],
            "package rows come back in recorded order"
        );
    }

    #[tokio::test]
    async fn last_complete_skips_undone() {
        let db = Database::memory().await.unwrap();
        let t1 = db.begin_history_transaction(Action::Install, None).await.unwrap();
        db.complete_transaction(t1, 0).await.unwrap();
        let t2 = db.begin_history_transaction(Action::Upgrade, None).await.unwrap();
        db.complete_transaction(t2, 0).await.unwrap();

        assert_eq!(db.last_complete_transaction().await.unwrap().unwrap().id, t2);

        let undo = db.begin_history_transaction(Action::Undo, None).await.unwrap();
        db.complete_transaction(undo, 0).await.unwrap();
        db.mark_undone(t2, undo).await.unwrap();

        // t2 is out; the undo transaction itself is now the last one
        assert_eq!(db.last_complete_transaction().await.unwrap().unwrap().id, undo);
    }

    #[tokio::test]
    async fn faildeps_from_interrupted() {
        let db = Database::memory().await.unwrap();
        let id = db.begin_history_transaction(Action::Install, None).await.unwrap();
        db.record_packages(
            id,
            &[
                pkg("app-1.0-1.mga10.x86_64", "install", "explicit"),
                pkg("libdep-1.0-1.mga10.x86_64", "install", "dependency"),
            ],
        )
        .await
        .unwrap();
        db.abort_transaction(id).await.unwrap();

        let interrupted = db.interrupted_transactions().await.unwrap();
        assert_eq!(interrupted.len(), 1);
        assert_eq!(
            db.faildep_candidates(id).await.unwrap(),
            vec!["libdep-1.0-1.mga10.x86_64"]
        );

        db.mark_cleaned(id).await.unwrap();
        assert!(db.interrupted_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_filter() {
        let db = Database::memory().await.unwrap();
        for action in [Action::Install, Action::Remove, Action::Install] {
            let id = db.begin_history_transaction(action, None).await.unwrap();
            db.complete_transaction(id, 0).await.unwrap();
        }
        assert_eq!(db.list_history(10, None).await.unwrap().len(), 3);
        assert_eq!(
            db.list_history(10, Some(Action::Install)).await.unwrap().len(),
            2
        );
        assert_eq!(db.list_history(1, None).await.unwrap().len(), 1);
    }
}
