// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use sqlx::FromRow;

use super::{unix_now, Database, Error};
use crate::request::IpMode;

/// A mirror endpoint serving one or more media
#[derive(Debug, Clone, FromRow)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub protocol: String,
    pub host: String,
    pub base_path: String,
    pub is_official: bool,
    pub enabled: bool,
    pub priority: i64,
    pub ip_mode: String,
}

const SERVER_COLUMNS: &str =
    "id, name, protocol, host, base_path, is_official, enabled, priority, ip_mode";

impl Server {
    /// `<protocol>://<host><base_path>`
    pub fn base_url(&self) -> String {
        format!("{}://{}{}", self.protocol, self.host, self.base_path)
    }

    pub fn ip_mode(&self) -> IpMode {
        IpMode::parse(&self.ip_mode).unwrap_or_default()
    }
}

impl Database {
    pub async fn add_server(
        &self,
        name: &str,
        protocol: &str,
        host: &str,
        base_path: &str,
        is_official: bool,
        enabled: bool,
        priority: i64,
    ) -> Result<i64, Error> {
        let _guard = self.writer().await;
        let result = sqlx::query(
            "
            INSERT INTO server (name, protocol, host, base_path, is_official,
                                enabled, priority, added_timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(name)
        .bind(protocol)
        .bind(host)
        .bind(base_path)
        .bind(is_official)
        .bind(enabled)
        .bind(priority)
        .bind(unix_now())
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_server(&self, name: &str) -> Result<Option<Server>, Error> {
        Ok(
            sqlx::query_as::<_, Server>(&format!(
                "SELECT {SERVER_COLUMNS} FROM server WHERE name = ?"
            ))
            .bind(name)
            .fetch_optional(self.pool())
            .await?,
        )
    }

    /// Lookup by the (protocol, host, base_path) unique key, for upserts
    pub async fn get_server_by_location(
        &self,
        protocol: &str,
        host: &str,
        base_path: &str,
    ) -> Result<Option<Server>, Error> {
        Ok(sqlx::query_as::<_, Server>(&format!(
            "SELECT {SERVER_COLUMNS} FROM server
             WHERE protocol = ? AND host = ? AND base_path = ?"
        ))
        .bind(protocol)
        .bind(host)
        .bind(base_path)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn list_servers(&self, enabled_only: bool) -> Result<Vec<Server>, Error> {
        let query = if enabled_only {
            format!(
                "SELECT {SERVER_COLUMNS} FROM server WHERE enabled = 1 \
                 ORDER BY priority DESC, name"
            )
        } else {
            format!("SELECT {SERVER_COLUMNS} FROM server ORDER BY priority DESC, name")
        };
        Ok(sqlx::query_as::<_, Server>(&query).fetch_all(self.pool()).await?)
    }

    /// Removal cascades to server_media links
    pub async fn remove_server(&self, name: &str) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("DELETE FROM server WHERE name = ?")
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn enable_server(&self, name: &str, enabled: bool) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("UPDATE server SET enabled = ? WHERE name = ?")
            .bind(enabled)
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_server_priority(&self, name: &str, priority: i64) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("UPDATE server SET priority = ? WHERE name = ?")
            .bind(priority)
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_server_ip_mode(&self, name: &str, ip_mode: IpMode) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("UPDATE server SET ip_mode = ? WHERE name = ?")
            .bind(ip_mode.as_str())
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn link_server_media(&self, server_id: i64, media_id: i64) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query(
            "INSERT OR IGNORE INTO server_media (server_id, media_id, added_timestamp)
             VALUES (?, ?, ?)",
        )
        .bind(server_id)
        .bind(media_id)
        .bind(unix_now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn unlink_server_media(&self, server_id: i64, media_id: i64) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("DELETE FROM server_media WHERE server_id = ? AND media_id = ?")
            .bind(server_id)
            .bind(media_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Servers able to serve a media, best first. Ordering is deterministic:
    /// priority descending, then name.
    pub async fn get_servers_for_media(
        &self,
        media_id: i64,
        enabled_only: bool,
    ) -> Result<Vec<Server>, Error> {
        let filter = if enabled_only { "AND s.enabled = 1" } else { "" };
        Ok(sqlx::query_as::<_, Server>(&format!(
            "SELECT s.id, s.name, s.protocol, s.host, s.base_path, s.is_official,
                    s.enabled, s.priority, s.ip_mode
             FROM server s
             JOIN server_media sm ON s.id = sm.server_id
             WHERE sm.media_id = ? {filter}
             ORDER BY s.priority DESC, s.name"
        ))
        .bind(media_id)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn get_media_for_server(&self, server_id: i64) -> Result<Vec<super::media::Media>, Error> {
        Ok(sqlx::query_as::<_, super::media::Media>(
            "SELECT m.id, m.name, m.short_name, m.version, m.architecture, m.relative_path,
                    m.is_official, m.enabled, m.update_media, m.priority, m.sync_files,
                    m.shared, m.replication_policy, m.quota_mb, m.retention_days,
                    m.last_sync, m.synthesis_md5
             FROM media m
             JOIN server_media sm ON m.id = sm.media_id
             WHERE sm.server_id = ?
             ORDER BY m.name",
        )
        .bind(server_id)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn best_server_for_media(&self, media_id: i64) -> Result<Option<Server>, Error> {
        Ok(self
            .get_servers_for_media(media_id, true)
            .await?
            .into_iter()
            .next())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::media::NewMedia;

    async fn media_id(db: &Database) -> i64 {
        db.add_media(NewMedia {
            name: "Core Release",
            short_name: "core_release",
            version: "10",
            architecture: "x86_64",
            relative_path: "10/x86_64/media/core/release",
            is_official: true,
            enabled: true,
            update_media: false,
            priority: 50,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn priority_ordering() {
        let db = Database::memory().await.unwrap();
        let media = media_id(&db).await;

        let slow = db
            .add_server("slow", "http", "mirror.slow.example", "/mageia", true, true, 10)
            .await
            .unwrap();
        let fast = db
            .add_server("fast", "https", "mirror.fast.example", "/mageia", true, true, 100)
            .await
            .unwrap();
        let off = db
            .add_server("off", "https", "mirror.off.example", "/mageia", true, false, 200)
            .await
            .unwrap();
        for id in [slow, fast, off] {
            db.link_server_media(id, media).await.unwrap();
        }

        let servers = db.get_servers_for_media(media, true).await.unwrap();
        assert_eq!(
            servers.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["fast", "slow"]
        );
        assert_eq!(
            db.best_server_for_media(media).await.unwrap().unwrap().name,
            "fast"
        );
        assert_eq!(
            servers[0].base_url(),
            "https://mirror.fast.example/mageia"
        );
    }

    #[tokio::test]
    async fn location_is_unique() {
        let db = Database::memory().await.unwrap();
        db.add_server("a", "http", "m.example", "/x", true, true, 50)
            .await
            .unwrap();
        assert!(db
            .add_server("b", "http", "m.example", "/x", true, true, 50)
            .await
            .is_err());
        assert!(db
            .get_server_by_location("http", "m.example", "/x")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn cascade_on_server_removal() {
        let db = Database::memory().await.unwrap();
        let media = media_id(&db).await;
        let id = db
            .add_server("a", "http", "m.example", "/x", true, true, 50)
            .await
            .unwrap();
        db.link_server_media(id, media).await.unwrap();
        db.remove_server("a").await.unwrap();
        assert!(db.get_servers_for_media(media, false).await.unwrap().is_empty());
    }
}
