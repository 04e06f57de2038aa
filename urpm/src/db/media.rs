// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use sqlx::FromRow;

use super::{unix_now, Database, Error};

/// How a media participates in LAN replication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicationPolicy {
    #[default]
    None,
    OnDemand,
    Seed,
}

impl ReplicationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationPolicy::None => "none",
            ReplicationPolicy::OnDemand => "on_demand",
            ReplicationPolicy::Seed => "seed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ReplicationPolicy::None),
            "on_demand" => Some(ReplicationPolicy::OnDemand),
            "seed" => Some(ReplicationPolicy::Seed),
            _ => None,
        }
    }
}

impl TryFrom<String> for ReplicationPolicy {
    type Error = InvalidPolicy;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(InvalidPolicy(value))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid replication policy: {0}")]
pub struct InvalidPolicy(String);

/// A named repository source
#[derive(Debug, Clone, FromRow)]
pub struct Media {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub version: String,
    pub architecture: String,
    pub relative_path: String,
    pub is_official: bool,
    pub enabled: bool,
    pub update_media: bool,
    pub priority: i64,
    pub sync_files: bool,
    pub shared: bool,
    #[sqlx(try_from = "String")]
    pub replication_policy: ReplicationPolicy,
    pub quota_mb: Option<i64>,
    pub retention_days: Option<i64>,
    pub last_sync: Option<i64>,
    pub synthesis_md5: Option<String>,
}

const MEDIA_COLUMNS: &str = "id, name, short_name, version, architecture, relative_path, \
     is_official, enabled, update_media, priority, sync_files, shared, \
     replication_policy, quota_mb, retention_days, last_sync, synthesis_md5";

/// Parameters for [`Database::add_media`]
#[derive(Debug, Clone)]
pub struct NewMedia<'a> {
    pub name: &'a str,
    pub short_name: &'a str,
    pub version: &'a str,
    pub architecture: &'a str,
    pub relative_path: &'a str,
    pub is_official: bool,
    pub enabled: bool,
    pub update_media: bool,
    pub priority: i64,
}

/// Mirror/replication knobs, applied selectively
#[derive(Debug, Clone, Default)]
pub struct MirrorSettings {
    pub shared: Option<bool>,
    pub replication_policy: Option<ReplicationPolicy>,
    pub quota_mb: Option<Option<i64>>,
    pub retention_days: Option<Option<i64>>,
}

impl Database {
    pub async fn add_media(&self, new: NewMedia<'_>) -> Result<i64, Error> {
        let _guard = self.writer().await;
        let result = sqlx::query(
            "
            INSERT INTO media (name, short_name, version, architecture, relative_path,
                               is_official, enabled, update_media, priority, added_timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(new.name)
        .bind(new.short_name)
        .bind(new.version)
        .bind(new.architecture)
        .bind(new.relative_path)
        .bind(new.is_official)
        .bind(new.enabled)
        .bind(new.update_media)
        .bind(new.priority)
        .bind(unix_now())
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Remove a media and, via cascade, its packages, files, cache rows,
    /// server links and files-index state
    pub async fn remove_media(&self, name: &str) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("DELETE FROM media WHERE name = ?")
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn get_media(&self, name: &str) -> Result<Option<Media>, Error> {
        Ok(
            sqlx::query_as::<_, Media>(&format!(
                "SELECT {MEDIA_COLUMNS} FROM media WHERE name = ?"
            ))
            .bind(name)
            .fetch_optional(self.pool())
            .await?,
        )
    }

    pub async fn get_media_by_id(&self, id: i64) -> Result<Option<Media>, Error> {
        Ok(
            sqlx::query_as::<_, Media>(&format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = ?"))
                .bind(id)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    /// Lookup by the (version, architecture, short_name) unique key
    pub async fn get_media_by_key(
        &self,
        version: &str,
        architecture: &str,
        short_name: &str,
    ) -> Result<Option<Media>, Error> {
        Ok(sqlx::query_as::<_, Media>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media
             WHERE version = ? AND architecture = ? AND short_name = ?"
        ))
        .bind(version)
        .bind(architecture)
        .bind(short_name)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn list_media(&self) -> Result<Vec<Media>, Error> {
        Ok(sqlx::query_as::<_, Media>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media ORDER BY priority DESC, name"
        ))
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn enabled_media(&self) -> Result<Vec<Media>, Error> {
        Ok(sqlx::query_as::<_, Media>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE enabled = 1 ORDER BY priority DESC, name"
        ))
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn enable_media(&self, name: &str, enabled: bool) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("UPDATE media SET enabled = ? WHERE name = ?")
            .bind(enabled)
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_media_sync_files(&self, name: &str, enabled: bool) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("UPDATE media SET sync_files = ? WHERE name = ?")
            .bind(enabled)
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_all_media_sync_files(
        &self,
        enabled: bool,
        enabled_only: bool,
    ) -> Result<u64, Error> {
        let _guard = self.writer().await;
        let query = if enabled_only {
            "UPDATE media SET sync_files = ? WHERE enabled = 1"
        } else {
            "UPDATE media SET sync_files = ?"
        };
        let result = sqlx::query(query).bind(enabled).execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    pub async fn media_with_sync_files(&self) -> Result<Vec<Media>, Error> {
        Ok(sqlx::query_as::<_, Media>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE sync_files = 1 ORDER BY priority DESC, name"
        ))
        .fetch_all(self.pool())
        .await?)
    }

    /// Stamp a successful synthesis sync
    pub async fn update_media_sync_info(
        &self,
        media_id: i64,
        synthesis_md5: &str,
    ) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("UPDATE media SET last_sync = ?, synthesis_md5 = ? WHERE id = ?")
            .bind(unix_now())
            .bind(synthesis_md5)
            .bind(media_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_media_mirror_settings(
        &self,
        media_id: i64,
        settings: MirrorSettings,
    ) -> Result<(), Error> {
        let _guard = self.writer().await;
        if let Some(shared) = settings.shared {
            sqlx::query("UPDATE media SET shared = ? WHERE id = ?")
                .bind(shared)
                .bind(media_id)
                .execute(self.pool())
                .await?;
        }
        if let Some(policy) = settings.replication_policy {
            sqlx::query("UPDATE media SET replication_policy = ? WHERE id = ?")
                .bind(policy.as_str())
                .bind(media_id)
                .execute(self.pool())
                .await?;
        }
        if let Some(quota) = settings.quota_mb {
            sqlx::query("UPDATE media SET quota_mb = ? WHERE id = ?")
                .bind(quota.filter(|q| *q > 0))
                .bind(media_id)
                .execute(self.pool())
                .await?;
        }
        if let Some(days) = settings.retention_days {
            sqlx::query("UPDATE media SET retention_days = ? WHERE id = ?")
                .bind(days)
                .bind(media_id)
                .execute(self.pool())
                .await?;
        }
        Ok(())
    }

    /// Media that may be served to peers: shared, enabled, mirror mode on,
    /// and the version not globally disabled
    pub async fn list_media_for_sharing(
        &self,
        version: Option<&str>,
        architecture: Option<&str>,
    ) -> Result<Vec<Media>, Error> {
        if !self.is_mirror_enabled().await? {
            return Ok(Vec::new());
        }
        let disabled = self.disabled_mirror_versions().await?;

        let mut media = sqlx::query_as::<_, Media>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media
             WHERE enabled = 1 AND shared = 1
             ORDER BY priority DESC, name"
        ))
        .fetch_all(self.pool())
        .await?;

        media.retain(|m| {
            version.map(|v| m.version == v).unwrap_or(true)
                && architecture.map(|a| m.architecture == a).unwrap_or(true)
                && !disabled.contains(&m.version)
        });

        Ok(media)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn core(name: &str, short_name: &str) -> NewMedia<'static> {
        // Leaked so tests can build 'static params tersely
        NewMedia {
            name: Box::leak(name.to_owned().into_boxed_str()),
            short_name: Box::leak(short_name.to_owned().into_boxed_str()),
            version: "10",
            architecture: "x86_64",
            relative_path: "10/x86_64/media/core/release",
            is_official: true,
            enabled: true,
            update_media: false,
            priority: 50,
        }
    }

    #[tokio::test]
    async fn crud_roundtrip() {
        let db = Database::memory().await.unwrap();

        let id = db.add_media(core("Core Release", "core_release")).await.unwrap();
        let media = db.get_media("Core Release").await.unwrap().unwrap();
        assert_eq!(media.id, id);
        assert_eq!(media.replication_policy, ReplicationPolicy::None);
        assert!(media.enabled);

        db.enable_media("Core Release", false).await.unwrap();
        assert!(!db.get_media("Core Release").await.unwrap().unwrap().enabled);

        db.remove_media("Core Release").await.unwrap();
        assert!(db.get_media("Core Release").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unique_key_lookup() {
        let db = Database::memory().await.unwrap();
        db.add_media(core("Core Release", "core_release")).await.unwrap();

        let found = db
            .get_media_by_key("10", "x86_64", "core_release")
            .await
            .unwrap();
        assert!(found.is_some());
        assert!(db
            .get_media_by_key("9", "x86_64", "core_release")
            .await
            .unwrap()
            .is_none());

        // Duplicate key must be rejected by the schema
        assert!(db.add_media(core("Other Name", "core_release")).await.is_err());
    }

    #[tokio::test]
    async fn sharing_respects_mirror_config() {
        let db = Database::memory().await.unwrap();
        let id = db.add_media(core("Core Release", "core_release")).await.unwrap();
        db.update_media_mirror_settings(
            id,
            MirrorSettings {
                shared: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Mirror mode defaults to off
        assert!(db.list_media_for_sharing(None, None).await.unwrap().is_empty());

        db.set_mirror_config("enabled", "1").await.unwrap();
        assert_eq!(db.list_media_for_sharing(None, None).await.unwrap().len(), 1);
        assert_eq!(
            db.list_media_for_sharing(Some("10"), Some("x86_64"))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(db
            .list_media_for_sharing(Some("9"), None)
            .await
            .unwrap()
            .is_empty());

        db.set_mirror_config("disabled_versions", "10, 11").await.unwrap();
        assert!(db.list_media_for_sharing(None, None).await.unwrap().is_empty());
    }
}
