// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Pins and holds
//!
//! Pins bias provider selection by (package pattern, media pattern,
//! priority). Holds freeze a name against upgrade and against replacement
//! through obsoletes.

use std::collections::HashSet;

use glob::Pattern;
use sqlx::FromRow;

use super::{unix_now, Database, Error};

#[derive(Debug, Clone, FromRow)]
pub struct Pin {
    pub id: i64,
    pub package_pattern: String,
    pub media_pattern: Option<String>,
    pub priority: i64,
    pub version_pattern: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Hold {
    pub package_name: String,
    pub reason: Option<String>,
    pub added_timestamp: i64,
}

impl Database {
    pub async fn add_pin(
        &self,
        package_pattern: &str,
        media_pattern: Option<&str>,
        priority: i64,
        version_pattern: Option<&str>,
        comment: Option<&str>,
    ) -> Result<i64, Error> {
        let _guard = self.writer().await;
        let result = sqlx::query(
            "INSERT INTO pins (package_pattern, media_pattern, priority,
                               version_pattern, comment, added_timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(package_pattern)
        .bind(media_pattern)
        .bind(priority)
        .bind(version_pattern)
        .bind(comment)
        .bind(unix_now())
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn remove_pin(&self, pin_id: i64) -> Result<bool, Error> {
        let _guard = self.writer().await;
        let result = sqlx::query("DELETE FROM pins WHERE id = ?")
            .bind(pin_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_pins(&self) -> Result<Vec<Pin>, Error> {
        Ok(sqlx::query_as::<_, Pin>(
            "SELECT id, package_pattern, media_pattern, priority, version_pattern, comment
             FROM pins ORDER BY priority DESC, id",
        )
        .fetch_all(self.pool())
        .await?)
    }

    /// Effective priority of a package offered by a media: the highest
    /// matching pin wins, otherwise the media's own priority
    pub async fn get_pin_priority(
        &self,
        package_name: &str,
        media_name: &str,
        media_priority: i64,
    ) -> Result<i64, Error> {
        let pins = self.list_pins().await?;
        Ok(pin_priority(&pins, package_name, media_name).unwrap_or(media_priority))
    }

    pub async fn add_hold(&self, package_name: &str, reason: Option<&str>) -> Result<bool, Error> {
        let _guard = self.writer().await;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO held_packages (package_name, reason, added_timestamp)
             VALUES (?, ?, ?)",
        )
        .bind(package_name)
        .bind(reason)
        .bind(unix_now())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_hold(&self, package_name: &str) -> Result<bool, Error> {
        let _guard = self.writer().await;
        let result = sqlx::query("DELETE FROM held_packages WHERE package_name = ?")
            .bind(package_name)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_held(&self, package_name: &str) -> Result<bool, Error> {
        let row: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM held_packages WHERE package_name = ?")
                .bind(package_name)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.is_some())
    }

    pub async fn list_holds(&self) -> Result<Vec<Hold>, Error> {
        Ok(sqlx::query_as::<_, Hold>(
            "SELECT package_name, reason, added_timestamp
             FROM held_packages ORDER BY package_name",
        )
        .fetch_all(self.pool())
        .await?)
    }

    /// All held names in one set, for the resolver's hot path
    pub async fn held_names(&self) -> Result<HashSet<String>, Error> {
        let names: Vec<String> = sqlx::query_scalar("SELECT package_name FROM held_packages")
            .fetch_all(self.pool())
            .await?;
        Ok(names.into_iter().collect())
    }
}

/// Highest-priority pin matching (package, media), if any
pub fn pin_priority(pins: &[Pin], package_name: &str, media_name: &str) -> Option<i64> {
    let package_name = package_name.to_lowercase();
    pins.iter()
        .filter(|pin| {
            let pkg_match = Pattern::new(&pin.package_pattern.to_lowercase())
                .map(|p| p.matches(&package_name))
                .unwrap_or(false);
            let media_match = match &pin.media_pattern {
                None => true,
                Some(pattern) => Pattern::new(pattern)
                    .map(|p| p.matches(media_name))
                    .unwrap_or(false),
            };
            pkg_match && media_match
        })
        .map(|pin| pin.priority)
        .max()
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn pin_matching() {
        let db = Database::memory().await.unwrap();
        db.add_pin("firefox", Some("Cauldron"), 500, None, None).await.unwrap();
        db.add_pin("lib64*", Some("Core Updates Testing"), 600, None, None)
            .await
            .unwrap();
        db.add_pin("*", Some("Core Release"), 50, None, None).await.unwrap();

        assert_eq!(
            db.get_pin_priority("Firefox", "Cauldron", 10).await.unwrap(),
            500,
            "patterns are case folded on the package side"
        );
        assert_eq!(
            db.get_pin_priority("lib64ssl3", "Core Updates Testing", 10)
                .await
                .unwrap(),
            600
        );
        assert_eq!(
            db.get_pin_priority("random", "Core Release", 10).await.unwrap(),
            50
        );
        // No pin matches: media default applies
        assert_eq!(
            db.get_pin_priority("random", "Cauldron", 77).await.unwrap(),
            77
        );
    }

    #[tokio::test]
    async fn highest_pin_wins() {
        let db = Database::memory().await.unwrap();
        db.add_pin("foo", None, 100, None, None).await.unwrap();
        db.add_pin("foo*", None, 300, None, None).await.unwrap();
        assert_eq!(db.get_pin_priority("foo", "Any", 1).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn holds() {
        let db = Database::memory().await.unwrap();
        assert!(db.add_hold("kernel", Some("stay on lts")).await.unwrap());
        assert!(!db.add_hold("kernel", None).await.unwrap(), "already held");
        assert!(db.is_held("kernel").await.unwrap());
        assert!(db.held_names().await.unwrap().contains("kernel"));

        assert!(db.remove_hold("kernel").await.unwrap());
        assert!(!db.remove_hold("kernel").await.unwrap());
        assert!(!db.is_held("kernel").await.unwrap());
    }
}
