// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Cache accounting
//!
//! Tracks every RPM written into the cache so eviction can run under
//! quota or age pressure. `is_referenced` flips to 0 when a file drops out
//! of its media's current synthesis.

use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::{unix_now, Database, Error};

#[derive(Debug, Clone, FromRow)]
pub struct CacheFile {
    pub filename: String,
    pub media_id: i64,
    pub file_path: String,
    pub file_size: i64,
    pub added_time: i64,
    pub last_accessed: i64,
    pub is_referenced: bool,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct CacheStats {
    pub total_files: i64,
    pub total_size: i64,
    pub referenced_files: i64,
    pub unreferenced_files: i64,
    pub referenced_size: i64,
    pub unreferenced_size: i64,
}

const CACHE_COLUMNS: &str =
    "filename, media_id, file_path, file_size, added_time, last_accessed, is_referenced";

impl Database {
    pub async fn register_cache_file(
        &self,
        filename: &str,
        media_id: i64,
        file_path: &str,
        file_size: i64,
    ) -> Result<(), Error> {
        let _guard = self.writer().await;
        let now = unix_now();
        sqlx::query(
            "INSERT OR REPLACE INTO cache_files
             (filename, media_id, file_path, file_size, added_time, last_accessed, is_referenced)
             VALUES (?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(filename)
        .bind(media_id)
        .bind(file_path)
        .bind(file_size)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_cache_file(
        &self,
        filename: &str,
        media_id: Option<i64>,
    ) -> Result<Option<CacheFile>, Error> {
        let row = match media_id {
            Some(id) => {
                sqlx::query_as::<_, CacheFile>(&format!(
                    "SELECT {CACHE_COLUMNS} FROM cache_files WHERE filename = ? AND media_id = ?"
                ))
                .bind(filename)
                .bind(id)
                .fetch_optional(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, CacheFile>(&format!(
                    "SELECT {CACHE_COLUMNS} FROM cache_files WHERE filename = ?"
                ))
                .bind(filename)
                .fetch_optional(self.pool())
                .await?
            }
        };
        Ok(row)
    }

    pub async fn touch_cache_file(&self, filename: &str, media_id: i64) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("UPDATE cache_files SET last_accessed = ? WHERE filename = ? AND media_id = ?")
            .bind(unix_now())
            .bind(filename)
            .bind(media_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_cache_files(
        &self,
        media_id: Option<i64>,
        referenced_only: bool,
    ) -> Result<Vec<CacheFile>, Error> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {CACHE_COLUMNS} FROM cache_files WHERE 1 = 1"
        ));
        if let Some(id) = media_id {
            query.push(" AND media_id = ");
            query.push_bind(id);
        }
        if referenced_only {
            query.push(" AND is_referenced = 1");
        }
        query.push(" ORDER BY added_time");
        Ok(query
            .build_query_as::<CacheFile>()
            .fetch_all(self.pool())
            .await?)
    }

    /// After a sync: only filenames still present in the media's synthesis
    /// keep their `is_referenced` flag
    pub async fn mark_cache_files_unreferenced(
        &self,
        media_id: i64,
        referenced_filenames: &[String],
    ) -> Result<(), Error> {
        let _guard = self.writer().await;
        sqlx::query("UPDATE cache_files SET is_referenced = 0 WHERE media_id = ?")
            .bind(media_id)
            .execute(self.pool())
            .await?;

        for chunk in referenced_filenames.chunks(500) {
            let mut query = QueryBuilder::<Sqlite>::new(
                "UPDATE cache_files SET is_referenced = 1 WHERE media_id = ",
            );
            query.push_bind(media_id);
            query.push(" AND filename IN (");
            let mut separated = query.separated(", ");
            for name in chunk {
                separated.push_bind(name);
            }
            separated.push_unseparated(")");
            query.build().execute(self.pool()).await?;
        }
        Ok(())
    }

    pub async fn delete_cache_file(&self, filename: &str, media_id: i64) -> Result<bool, Error> {
        let _guard = self.writer().await;
        let result = sqlx::query("DELETE FROM cache_files WHERE filename = ? AND media_id = ?")
            .bind(filename)
            .bind(media_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn cache_stats(&self, media_id: Option<i64>) -> Result<CacheStats, Error> {
        let select = "
            SELECT COUNT(*) AS total_files,
                   COALESCE(SUM(file_size), 0) AS total_size,
                   COALESCE(SUM(CASE WHEN is_referenced = 1 THEN 1 ELSE 0 END), 0)
                       AS referenced_files,
                   COALESCE(SUM(CASE WHEN is_referenced = 0 THEN 1 ELSE 0 END), 0)
                       AS unreferenced_files,
                   COALESCE(SUM(CASE WHEN is_referenced = 1 THEN file_size ELSE 0 END), 0)
                       AS referenced_size,
                   COALESCE(SUM(CASE WHEN is_referenced = 0 THEN file_size ELSE 0 END), 0)
                       AS unreferenced_size
            FROM cache_files";
        let stats = match media_id {
            Some(id) => {
                sqlx::query_as::<_, CacheStats>(&format!("{select} WHERE media_id = ?"))
                    .bind(id)
                    .fetch_one(self.pool())
                    .await?
            }
            None => {
                sqlx::query_as::<_, CacheStats>(select)
                    .fetch_one(self.pool())
                    .await?
            }
        };
        Ok(stats)
    }

    /// Eviction candidates: unreferenced files first, then least recently
    /// accessed. With `max_bytes`, stops once enough space is covered.
    pub async fn files_to_evict(
        &self,
        media_id: Option<i64>,
        max_bytes: Option<i64>,
        max_age_days: Option<i64>,
    ) -> Result<Vec<CacheFile>, Error> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {CACHE_COLUMNS} FROM cache_files WHERE 1 = 1"
        ));
        if let Some(id) = media_id {
            query.push(" AND media_id = ");
            query.push_bind(id);
        }
        if let Some(days) = max_age_days {
            query.push(" AND added_time < ");
            query.push_bind(unix_now() - days * 86_400);
        }
        query.push(" ORDER BY is_referenced ASC, last_accessed ASC");

        let files = query
            .build_query_as::<CacheFile>()
            .fetch_all(self.pool())
            .await?;

        Ok(match max_bytes {
            Some(target) => {
                let mut out = Vec::new();
                let mut total = 0;
                for file in files {
                    total += file.file_size;
                    out.push(file);
                    if total >= target {
                        break;
                    }
                }
                out
            }
            None => files,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::media::NewMedia;

    async fn seed(db: &Database) -> i64 {
        db.add_media(NewMedia {
            name: "Core",
            short_name: "core",
            version: "10",
            architecture: "x86_64",
            relative_path: "core",
            is_official: true,
            enabled: true,
            update_media: false,
            priority: 50,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn register_and_stats() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;

        db.register_cache_file("a.rpm", media, "official/core/a.rpm", 100)
            .await
            .unwrap();
        db.register_cache_file("b.rpm", media, "official/core/b.rpm", 900)
            .await
            .unwrap();

        let stats = db.cache_stats(Some(media)).await.unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_size, 1000);
        assert_eq!(stats.referenced_files, 2);

        db.mark_cache_files_unreferenced(media, &["b.rpm".to_owned()])
            .await
            .unwrap();
        let stats = db.cache_stats(Some(media)).await.unwrap();
        assert_eq!(stats.referenced_files, 1);
        assert_eq!(stats.unreferenced_size, 100);
    }

    #[tokio::test]
    async fn eviction_prefers_unreferenced() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;

        db.register_cache_file("old.rpm", media, "p/old.rpm", 500).await.unwrap();
        db.register_cache_file("new.rpm", media, "p/new.rpm", 500).await.unwrap();
        db.mark_cache_files_unreferenced(media, &["new.rpm".to_owned()])
            .await
            .unwrap();

        let evict = db.files_to_evict(Some(media), Some(400), None).await.unwrap();
        assert_eq!(evict.len(), 1);
        assert_eq!(evict[0].filename, "old.rpm");

        let all = db.files_to_evict(Some(media), None, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn cascade_with_media() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;
        db.register_cache_file("a.rpm", media, "p/a.rpm", 1).await.unwrap();
        db.remove_media("Core").await.unwrap();
        assert_eq!(db.cache_stats(None).await.unwrap().total_files, 0);
    }
}
