// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Peer provenance, blacklist and mirror configuration

use sqlx::FromRow;

use super::{unix_now, Database, Error};

/// Where a cached file came from on the LAN
#[derive(Debug, Clone, FromRow)]
pub struct PeerDownload {
    pub filename: String,
    pub file_path: String,
    pub peer_host: String,
    pub peer_port: i64,
    pub download_time: i64,
    pub file_size: Option<i64>,
    pub checksum_sha256: Option<String>,
    pub verified: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct BlacklistedPeer {
    pub peer_host: String,
    pub peer_port: Option<i64>,
    pub reason: Option<String>,
    pub blacklist_time: i64,
}

/// Aggregate per-peer transfer stats
#[derive(Debug, Clone, FromRow)]
pub struct PeerStats {
    pub peer_host: String,
    pub peer_port: i64,
    pub download_count: i64,
    pub total_bytes: Option<i64>,
    pub verified_count: i64,
}

impl Database {
    pub async fn record_peer_download(
        &self,
        filename: &str,
        file_path: &str,
        peer_host: &str,
        peer_port: u16,
        file_size: i64,
        checksum_sha256: &str,
        verified: bool,
    ) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query(
            "INSERT OR REPLACE INTO peer_downloads
             (filename, file_path, peer_host, peer_port, download_time,
              file_size, checksum_sha256, verified)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(filename)
        .bind(file_path)
        .bind(peer_host)
        .bind(i64::from(peer_port))
        .bind(unix_now())
        .bind(file_size)
        .bind(checksum_sha256)
        .bind(verified)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_peer_downloads(
        &self,
        peer_host: Option<&str>,
        limit: i64,
    ) -> Result<Vec<PeerDownload>, Error> {
        let rows = match peer_host {
            Some(host) => {
                sqlx::query_as::<_, PeerDownload>(
                    "SELECT filename, file_path, peer_host, peer_port, download_time,
                            file_size, checksum_sha256, verified
                     FROM peer_downloads WHERE peer_host = ?
                     ORDER BY download_time DESC LIMIT ?",
                )
                .bind(host)
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, PeerDownload>(
                    "SELECT filename, file_path, peer_host, peer_port, download_time,
                            file_size, checksum_sha256, verified
                     FROM peer_downloads ORDER BY download_time DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn peer_stats(&self) -> Result<Vec<PeerStats>, Error> {
        Ok(sqlx::query_as::<_, PeerStats>(
            "SELECT peer_host, peer_port,
                    COUNT(*) AS download_count,
                    SUM(file_size) AS total_bytes,
                    SUM(CASE WHEN verified = 1 THEN 1 ELSE 0 END) AS verified_count
             FROM peer_downloads
             GROUP BY peer_host, peer_port
             ORDER BY download_count DESC",
        )
        .fetch_all(self.pool())
        .await?)
    }

    /// Cached file paths attributed to one peer, for `peer clean`
    pub async fn files_from_peer(&self, peer_host: &str) -> Result<Vec<String>, Error> {
        Ok(
            sqlx::query_scalar("SELECT file_path FROM peer_downloads WHERE peer_host = ?")
                .bind(peer_host)
                .fetch_all(self.pool())
                .await?,
        )
    }

    pub async fn delete_peer_downloads(&self, peer_host: &str) -> Result<u64, Error> {
        let _guard = self.writer().await;
        let result = sqlx::query("DELETE FROM peer_downloads WHERE peer_host = ?")
            .bind(peer_host)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn blacklist_peer(
        &self,
        peer_host: &str,
        peer_port: Option<u16>,
        reason: Option<&str>,
    ) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query(
            "INSERT OR REPLACE INTO peer_blacklist (peer_host, peer_port, reason, blacklist_time)
             VALUES (?, ?, ?, ?)",
        )
        .bind(peer_host)
        .bind(peer_port.map(i64::from))
        .bind(reason)
        .bind(unix_now())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn unblacklist_peer(
        &self,
        peer_host: &str,
        peer_port: Option<u16>,
    ) -> Result<u64, Error> {
        let _guard = self.writer().await;
        let result = match peer_port {
            Some(port) => {
                sqlx::query("DELETE FROM peer_blacklist WHERE peer_host = ? AND peer_port = ?")
                    .bind(peer_host)
                    .bind(i64::from(port))
                    .execute(self.pool())
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM peer_blacklist WHERE peer_host = ?")
                    .bind(peer_host)
                    .execute(self.pool())
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    /// A row with NULL port blacklists the host on any port
    pub async fn is_peer_blacklisted(&self, peer_host: &str, peer_port: u16) -> Result<bool, Error> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM peer_blacklist
             WHERE peer_host = ? AND (peer_port = ? OR peer_port IS NULL)
             LIMIT 1",
        )
        .bind(peer_host)
        .bind(i64::from(peer_port))
        .fetch_optional(self.pool())
        .await?;
        Ok(row.is_some())
    }

    pub async fn list_blacklisted_peers(&self) -> Result<Vec<BlacklistedPeer>, Error> {
        Ok(sqlx::query_as::<_, BlacklistedPeer>(
            "SELECT peer_host, peer_port, reason, blacklist_time
             FROM peer_blacklist ORDER BY blacklist_time DESC",
        )
        .fetch_all(self.pool())
        .await?)
    }

    // -- Mirror configuration ------------------------------------------------

    pub async fn get_mirror_config(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(
            sqlx::query_scalar("SELECT value FROM mirror_config WHERE key = ?")
                .bind(key)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn set_mirror_config(&self, key: &str, value: &str) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("INSERT OR REPLACE INTO mirror_config (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn is_mirror_enabled(&self) -> Result<bool, Error> {
        Ok(self.get_mirror_config("enabled").await?.as_deref() == Some("1"))
    }

    pub async fn disabled_mirror_versions(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .get_mirror_config("disabled_versions")
            .await?
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn provenance_roundtrip() {
        let db = Database::memory().await.unwrap();
        db.record_peer_download(
            "wget-1.21-1.mga10.x86_64.rpm",
            "official/core/wget-1.21-1.mga10.x86_64.rpm",
            "192.168.1.20",
            9876,
            794356,
            "deadbeef",
            false,
        )
        .await
        .unwrap();

        let rows = db.list_peer_downloads(None, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].peer_port, 9876);
        assert!(!rows[0].verified);

        let stats = db.peer_stats().await.unwrap();
        assert_eq!(stats[0].download_count, 1);
        assert_eq!(stats[0].total_bytes, Some(794356));

        assert_eq!(
            db.files_from_peer("192.168.1.20").await.unwrap(),
            vec!["official/core/wget-1.21-1.mga10.x86_64.rpm"]
        );
        assert_eq!(db.delete_peer_downloads("192.168.1.20").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn blacklist_port_semantics() {
        let db = Database::memory().await.unwrap();
        db.blacklist_peer("10.0.0.5", Some(9876), Some("served invalid file"))
            .await
            .unwrap();
        assert!(db.is_peer_blacklisted("10.0.0.5", 9876).await.unwrap());
        assert!(!db.is_peer_blacklisted("10.0.0.5", 9877).await.unwrap());

        // NULL port bans the whole host
        db.blacklist_peer("10.0.0.6", None, None).await.unwrap();
        assert!(db.is_peer_blacklisted("10.0.0.6", 1234).await.unwrap());

        db.unblacklist_peer("10.0.0.6", None).await.unwrap();
        assert!(!db.is_peer_blacklisted("10.0.0.6", 1234).await.unwrap());
    }

    #[tokio::test]
    async fn mirror_config() {
        let db = Database::memory().await.unwrap();
        assert!(!db.is_mirror_enabled().await.unwrap());
        db.set_mirror_config("enabled", "1").await.unwrap();
        assert!(db.is_mirror_enabled().await.unwrap());

        db.set_mirror_config("disabled_versions", "9, 10").await.unwrap();
        assert_eq!(db.disabled_mirror_versions().await.unwrap(), vec!["9", "10"]);
    }
}
