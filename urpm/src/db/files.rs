// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Files index and its trigram FTS mirror
//!
//! `package_files` answers "which package owns this path". The FTS5
//! trigram table shadows (dir_path, filename) for accelerated substring
//! search; `fts_state.is_current` says whether the mirror can be trusted.
//! Whenever it can't (corruption, full reimport), queries fall back to a
//! base-table LIKE scan until the next rebuild.

use sqlx::{QueryBuilder, Sqlite};

use super::{is_corruption, unix_now, Database, Error};
use crate::environment;

const FTS_TABLE: &str = "package_files_fts";

/// One file-search hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHit {
    pub file_path: String,
    pub pkg_nevra: String,
    pub media_id: i64,
    pub media_name: String,
}

/// Sync bookkeeping of one media's files index
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FilesXmlState {
    pub media_id: i64,
    pub files_md5: Option<String>,
    pub last_sync: i64,
    pub file_count: i64,
    pub pkg_count: i64,
    pub compressed_size: Option<i64>,
}

impl Database {
    /// Full replacement of one media's files: drop indexes, delete, batch
    /// insert, recreate indexes, update the sync state. The FTS mirror is
    /// marked stale; callers follow up with [`Self::rebuild_fts_index`].
    pub async fn import_files(
        &self,
        media_id: i64,
        entries: impl IntoIterator<Item = (String, Vec<String>)>,
        files_md5: Option<&str>,
        compressed_size: Option<i64>,
        mut progress: impl FnMut(u64, u64),
        batch_size: usize,
    ) -> Result<(u64, u64), Error> {
        let _guard = self.writer().await;
        let batch_size = if batch_size == 0 {
            environment::FILES_IMPORT_BATCH
        } else {
            batch_size
        };

        // Indexes cost more than they help during a bulk load
        sqlx::query("DROP INDEX IF EXISTS idx_pf_filename")
            .execute(self.pool())
            .await?;
        sqlx::query("DROP INDEX IF EXISTS idx_pf_dir_filename")
            .execute(self.pool())
            .await?;

        sqlx::query("DELETE FROM package_files WHERE media_id = ?")
            .bind(media_id)
            .execute(self.pool())
            .await?;

        let mut total_files = 0u64;
        let mut total_packages = 0u64;
        let mut batch: Vec<(String, String, String)> = Vec::with_capacity(batch_size);

        for (nevra, files) in entries {
            total_packages += 1;
            for path in files {
                let (dir, file) = split_path(&path);
                batch.push((nevra.clone(), dir, file));
                total_files += 1;

                if batch.len() >= batch_size {
                    self.flush_file_batch(media_id, &mut batch).await?;
                    progress(total_files, total_packages);
                }
            }
        }
        if !batch.is_empty() {
            self.flush_file_batch(media_id, &mut batch).await?;
        }

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pf_filename ON package_files (filename)")
            .execute(self.pool())
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pf_dir_filename ON package_files (dir_path, filename)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "INSERT OR REPLACE INTO files_xml_state
             (media_id, files_md5, last_sync, file_count, pkg_count, compressed_size)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(media_id)
        .bind(files_md5)
        .bind(unix_now())
        .bind(total_files as i64)
        .bind(total_packages as i64)
        .bind(compressed_size)
        .execute(self.pool())
        .await?;

        self.fts_mark_dirty().await?;
        progress(total_files, total_packages);

        Ok((total_files, total_packages))
    }

    /// Staging-table variant: load into `package_files_staging`, then swap
    /// the media's rows in a single transaction
    pub async fn import_files_staged(
        &self,
        media_id: i64,
        entries: impl IntoIterator<Item = (String, Vec<String>)>,
        files_md5: Option<&str>,
        compressed_size: Option<i64>,
    ) -> Result<(u64, u64), Error> {
        let _guard = self.writer().await;

        sqlx::query("DROP TABLE IF EXISTS package_files_staging")
            .execute(self.pool())
            .await?;
        sqlx::query(
            "CREATE TABLE package_files_staging (
                 pkg_nevra TEXT NOT NULL,
                 dir_path TEXT NOT NULL,
                 filename TEXT NOT NULL
             )",
        )
        .execute(self.pool())
        .await?;

        let mut total_files = 0u64;
        let mut total_packages = 0u64;
        let mut batch: Vec<(String, String, String)> = Vec::new();

        for (nevra, files) in entries {
            total_packages += 1;
            for path in files {
                let (dir, file) = split_path(&path);
                batch.push((nevra.clone(), dir, file));
                total_files += 1;
                if batch.len() >= environment::FILES_IMPORT_BATCH {
                    flush_staging(self, &mut batch).await?;
                }
            }
        }
        if !batch.is_empty() {
            flush_staging(self, &mut batch).await?;
        }

        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM package_files WHERE media_id = ?")
            .bind(media_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO package_files (media_id, pkg_nevra, dir_path, filename)
             SELECT ?, pkg_nevra, dir_path, filename FROM package_files_staging",
        )
        .bind(media_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT OR REPLACE INTO files_xml_state
             (media_id, files_md5, last_sync, file_count, pkg_count, compressed_size)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(media_id)
        .bind(files_md5)
        .bind(unix_now())
        .bind(total_files as i64)
        .bind(total_packages as i64)
        .bind(compressed_size)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        sqlx::query("DROP TABLE IF EXISTS package_files_staging")
            .execute(self.pool())
            .await?;
        self.fts_mark_dirty().await?;

        Ok((total_files, total_packages))
    }

    /// Differential sync: drop files of disappeared packages, FTS kept in
    /// step inline
    pub async fn delete_package_files_by_nevra(
        &self,
        media_id: i64,
        nevras: &[String],
    ) -> Result<(), Error> {
        if nevras.is_empty() {
            return Ok(());
        }
        let _guard = self.writer().await;
        let fts_live = self.is_fts_current_unlocked().await?;
        let mut fts_failed = false;

        for chunk in nevras.chunks(500) {
            // External-content FTS rows must go before their base rows
            if fts_live && !fts_failed {
                let mut query = QueryBuilder::<Sqlite>::new(format!(
                    "DELETE FROM {FTS_TABLE} WHERE rowid IN (
                         SELECT id FROM package_files WHERE media_id = "
                ));
                query.push_bind(media_id);
                query.push(" AND pkg_nevra IN (");
                let mut separated = query.separated(", ");
                for nevra in chunk {
                    separated.push_bind(nevra);
                }
                separated.push_unseparated("))");

                if let Err(e) = query.build().execute(self.pool()).await {
                    if is_corruption(&e) {
                        log::warn!("FTS corrupted during delete, marking dirty");
                        fts_failed = true;
                    } else {
                        return Err(e.into());
                    }
                }
            }

            let mut query =
                QueryBuilder::<Sqlite>::new("DELETE FROM package_files WHERE media_id = ");
            query.push_bind(media_id);
            query.push(" AND pkg_nevra IN (");
            let mut separated = query.separated(", ");
            for nevra in chunk {
                separated.push_bind(nevra);
            }
            separated.push_unseparated(")");
            query.build().execute(self.pool()).await?;
        }

        if fts_failed {
            self.fts_mark_dirty().await?;
        }
        Ok(())
    }

    /// Differential sync: add one package's files, FTS kept in step inline
    pub async fn insert_package_files_batch(
        &self,
        media_id: i64,
        nevra: &str,
        files: &[String],
    ) -> Result<(), Error> {
        if files.is_empty() {
            return Ok(());
        }
        let _guard = self.writer().await;
        let fts_live = self.is_fts_current_unlocked().await?;

        let last_id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM package_files")
            .fetch_one(self.pool())
            .await?;
        let last_id = last_id.unwrap_or(0);

        for chunk in files.chunks(500) {
            QueryBuilder::<Sqlite>::new(
                "INSERT INTO package_files (media_id, pkg_nevra, dir_path, filename) ",
            )
            .push_values(chunk, |mut b, path| {
                let (dir, file) = split_path(path);
                b.push_bind(media_id).push_bind(nevra).push_bind(dir).push_bind(file);
            })
            .build()
            .execute(self.pool())
            .await?;
        }

        if fts_live {
            let result = sqlx::query(&format!(
                "INSERT INTO {FTS_TABLE} (rowid, dir_path, filename)
                 SELECT id, dir_path, filename FROM package_files WHERE id > ?"
            ))
            .bind(last_id)
            .execute(self.pool())
            .await;
            if let Err(e) = result {
                if is_corruption(&e) {
                    log::warn!("FTS corrupted during insert, marking dirty");
                    self.fts_mark_dirty().await?;
                } else {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Files of one package, full paths, sorted
    pub async fn package_files(&self, nevra: &str) -> Result<Vec<String>, Error> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT DISTINCT dir_path, filename FROM package_files
             WHERE pkg_nevra = ? ORDER BY dir_path, filename",
        )
        .bind(nevra)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(d, f)| join_path(&d, &f)).collect())
    }

    /// Search the files index. FTS path when the mirror is current;
    /// otherwise a base-table LIKE scan. FTS corruption degrades
    /// transparently to the scan and flags the mirror for rebuild.
    pub async fn search_files(
        &self,
        pattern: &str,
        media_ids: Option<&[i64]>,
        limit: i64,
    ) -> Result<Vec<FileHit>, Error> {
        if self.is_fts_index_current().await? {
            match self.search_files_fts(pattern, media_ids, limit).await {
                Ok(hits) => return Ok(hits),
                Err(Error::Sqlx(e)) if is_corruption(&e) => {
                    log::warn!("FTS index corrupted, falling back to table scan");
                    self.fts_mark_dirty().await?;
                }
                Err(e) => return Err(e),
            }
        }
        self.search_files_like(pattern, media_ids, limit).await
    }

    async fn search_files_like(
        &self,
        pattern: &str,
        media_ids: Option<&[i64]>,
        limit: i64,
    ) -> Result<Vec<FileHit>, Error> {
        let full_pattern = sql_pattern(pattern);
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT pf.dir_path, pf.filename, pf.pkg_nevra, pf.media_id,
                    m.name AS media_name
             FROM package_files pf
             JOIN media m ON pf.media_id = m.id
             WHERE (pf.dir_path || '/' || pf.filename) LIKE ",
        );
        query.push_bind(&full_pattern);
        push_media_filter(&mut query, media_ids);
        query.push(" ORDER BY pf.filename, pf.dir_path");
        if limit > 0 {
            query.push(format!(" LIMIT {limit}"));
        }

        let rows = query
            .build_query_as::<encoding::Hit>()
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(encoding::Hit::into_hit).collect())
    }

    async fn search_files_fts(
        &self,
        pattern: &str,
        media_ids: Option<&[i64]>,
        limit: i64,
    ) -> Result<Vec<FileHit>, Error> {
        let full_pattern = sql_pattern(pattern);

        // Trigram acceleration wants a literal of at least three chars;
        // take the longest one and post-filter on the full path
        let best_term = full_pattern
            .split(['%', '_', '/'])
            .filter(|t| t.len() >= 3)
            .max_by_key(|t| t.len())
            .map(|t| format!("%{t}%"));

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT pf.dir_path, pf.filename, pf.pkg_nevra, pf.media_id,
                    m.name AS media_name
             FROM package_files pf
             JOIN media m ON pf.media_id = m.id
             WHERE pf.id IN (SELECT rowid FROM ",
        );
        query.push(FTS_TABLE);
        match &best_term {
            Some(term) => {
                query.push(" WHERE dir_path LIKE ");
                query.push_bind(term);
                query.push(" OR filename LIKE ");
                query.push_bind(term);
            }
            None => {}
        }
        query.push(") AND (pf.dir_path || '/' || pf.filename) LIKE ");
        query.push_bind(&full_pattern);
        push_media_filter(&mut query, media_ids);
        query.push(" ORDER BY pf.filename, pf.dir_path");
        if limit > 0 {
            query.push(format!(" LIMIT {limit}"));
        }

        let rows = query
            .build_query_as::<encoding::Hit>()
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(encoding::Hit::into_hit).collect())
    }

    pub async fn get_files_xml_state(&self, media_id: i64) -> Result<Option<FilesXmlState>, Error> {
        Ok(sqlx::query_as::<_, FilesXmlState>(
            "SELECT media_id, files_md5, last_sync, file_count, pkg_count, compressed_size
             FROM files_xml_state WHERE media_id = ?",
        )
        .bind(media_id)
        .fetch_optional(self.pool())
        .await?)
    }

    /// files-per-compressed-byte across synced media, to estimate progress
    /// of a first-time import
    pub async fn files_xml_ratio(&self) -> Result<Option<f64>, Error> {
        let row: (Option<i64>, Option<i64>) = sqlx::query_as(
            "SELECT SUM(file_count), SUM(compressed_size)
             FROM files_xml_state WHERE file_count > 0 AND compressed_size > 0",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(match row {
            (Some(files), Some(bytes)) if bytes > 0 => Some(files as f64 / bytes as f64),
            _ => None,
        })
    }

    /// Distinct NEVRAs currently indexed for a media, the differential
    /// sync baseline
    pub async fn package_nevras_for_media(
        &self,
        media_id: i64,
    ) -> Result<Vec<String>, Error> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT pkg_nevra FROM package_files WHERE media_id = ?",
        )
        .bind(media_id)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn files_stats(&self) -> Result<(i64, i64), Error> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT pkg_nevra) FROM package_files",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    // -- FTS mirror lifecycle ------------------------------------------------

    pub async fn is_fts_index_current(&self) -> Result<bool, Error> {
        self.is_fts_current_unlocked().await
    }

    async fn is_fts_current_unlocked(&self) -> Result<bool, Error> {
        let state: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT is_current FROM fts_state WHERE table_name = '{FTS_TABLE}'"
        ))
        .fetch_optional(self.pool())
        .await?;

        match state {
            Some(flag) => Ok(flag == 1),
            None => {
                // No state row: only an entirely empty index counts as current
                let any: Option<i64> = sqlx::query_scalar("SELECT 1 FROM package_files LIMIT 1")
                    .fetch_optional(self.pool())
                    .await?;
                Ok(any.is_none())
            }
        }
    }

    pub async fn fts_mark_dirty(&self) -> Result<(), Error> {
        sqlx::query(&format!(
            "INSERT INTO fts_state (table_name, is_current) VALUES ('{FTS_TABLE}', 0)
             ON CONFLICT (table_name) DO UPDATE SET is_current = 0"
        ))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Rebuild the FTS mirror from the base table. Batched with commits in
    /// between so readers keep going; corruption mid-rebuild drops the
    /// mirror and restarts from the beginning.
    pub async fn rebuild_fts_index(
        &self,
        mut progress: impl FnMut(i64, i64),
    ) -> Result<i64, Error> {
        let _guard = self.writer().await;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM package_files")
            .fetch_one(self.pool())
            .await?;

        if total == 0 {
            self.mark_fts_current(0).await?;
            return Ok(0);
        }

        self.recreate_fts_table().await?;

        let bounds: (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT MIN(id), MAX(id) FROM package_files")
                .fetch_one(self.pool())
                .await?;
        let (Some(min_id), Some(max_id)) = bounds else {
            self.mark_fts_current(0).await?;
            return Ok(0);
        };

        let mut indexed = 0i64;
        let mut current = min_id;
        while current <= max_id {
            let result = sqlx::query(&format!(
                "INSERT INTO {FTS_TABLE} (rowid, dir_path, filename)
                 SELECT id, dir_path, filename FROM package_files
                 WHERE id >= ? AND id < ?"
            ))
            .bind(current)
            .bind(current + environment::FTS_REBUILD_BATCH)
            .execute(self.pool())
            .await;

            match result {
                Ok(done) => {
                    indexed += done.rows_affected() as i64;
                    current += environment::FTS_REBUILD_BATCH;
                    progress(indexed, total);
                }
                Err(e) if is_corruption(&e) => {
                    log::warn!("FTS corruption during rebuild, restarting");
                    self.recreate_fts_table().await?;
                    indexed = 0;
                    current = min_id;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.mark_fts_current(indexed).await?;
        Ok(indexed)
    }

    async fn recreate_fts_table(&self) -> Result<(), Error> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {FTS_TABLE}"))
            .execute(self.pool())
            .await?;
        sqlx::query(&format!(
            "CREATE VIRTUAL TABLE {FTS_TABLE} USING fts5 (
                 dir_path, filename,
                 tokenize = 'trigram',
                 content = 'package_files',
                 content_rowid = 'id'
             )"
        ))
        .execute(self.pool())
        .await?;
        sqlx::query(&format!(
            "DELETE FROM fts_state WHERE table_name = '{FTS_TABLE}'"
        ))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn mark_fts_current(&self, rows: i64) -> Result<(), Error> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO fts_state (table_name, last_rebuild, row_count, is_current)
             VALUES ('{FTS_TABLE}', ?, ?, 1)"
        ))
        .bind(unix_now())
        .bind(rows)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn flush_file_batch(
        &self,
        media_id: i64,
        batch: &mut Vec<(String, String, String)>,
    ) -> Result<(), Error> {
        for chunk in batch.chunks(500) {
            QueryBuilder::<Sqlite>::new(
                "INSERT INTO package_files (media_id, pkg_nevra, dir_path, filename) ",
            )
            .push_values(chunk, |mut b, (nevra, dir, file)| {
                b.push_bind(media_id).push_bind(nevra).push_bind(dir).push_bind(file);
            })
            .build()
            .execute(self.pool())
            .await?;
        }
        batch.clear();
        Ok(())
    }
}

async fn flush_staging(
    db: &Database,
    batch: &mut Vec<(String, String, String)>,
) -> Result<(), Error> {
    for chunk in batch.chunks(500) {
        QueryBuilder::<Sqlite>::new(
            "INSERT INTO package_files_staging (pkg_nevra, dir_path, filename) ",
        )
        .push_values(chunk, |mut b, (nevra, dir, file)| {
            b.push_bind(nevra).push_bind(dir).push_bind(file);
        })
        .build()
        .execute(db.pool())
        .await?;
    }
    batch.clear();
    Ok(())
}

/// Wildcards become SQL LIKE; a bare filename is anchored to a path
/// component so `nvim` matches `/usr/bin/nvim`, not any substring
fn sql_pattern(pattern: &str) -> String {
    let sql = pattern.replace('*', "%").replace('?', "_");
    let has_wildcards = sql.contains('%') || sql.contains('_');
    if sql.starts_with('/') || has_wildcards {
        sql
    } else {
        format!("%/{sql}")
    }
}

fn push_media_filter(query: &mut QueryBuilder<'_, Sqlite>, media_ids: Option<&[i64]>) {
    if let Some(ids) = media_ids {
        if !ids.is_empty() {
            query.push(" AND pf.media_id IN (");
            let mut separated = query.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
    }
}

fn split_path(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some(("", file)) => ("/".to_owned(), file.to_owned()),
        Some((dir, file)) => (dir.to_owned(), file.to_owned()),
        None => (String::new(), path.to_owned()),
    }
}

fn join_path(dir: &str, file: &str) -> String {
    if dir == "/" {
        format!("/{file}")
    } else {
        format!("{dir}/{file}")
    }
}

mod encoding {
    use sqlx::FromRow;

    #[derive(FromRow)]
    pub struct Hit {
        pub dir_path: String,
        pub filename: String,
        pub pkg_nevra: String,
        pub media_id: i64,
        pub media_name: String,
    }

    impl Hit {
        pub fn into_hit(self) -> super::FileHit {
            super::FileHit {
                file_path: super::join_path(&self.dir_path, &self.filename),
                pkg_nevra: self.pkg_nevra,
                media_id: self.media_id,
                media_name: self.media_name,
            }
        }
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

    fn sample() -> Vec<(String, Vec<String>)> {
        vec![
            (
                "neovim-0.9.5-1.mga10.x86_64".to_owned(),
                vec![
                    "/usr/bin/nvim".to_owned(),
                    "/usr/share/nvim/runtime/init.lua".to_owned(),
                ],
            ),
            (
                "wget-1.21-1.mga10.x86_64".to_owned(),
                vec!["/usr/bin/wget".to_owned()],
            ),
        ]
    }

    #[tokio::test]
    async fn import_and_like_search() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;

        let (files, packages) = db
            .import_files(media, sample(), Some("abc"), Some(1000), |_, _| {}, 0)
            .await
            .unwrap();
        assert_eq!((files, packages), (3, 2));

        // Mirror is stale after a full import: LIKE path serves queries
        assert!(!db.is_fts_index_current().await.unwrap());
        let hits = db.search_files("nvim", None, 0).await.unwrap();
        assert_eq!(hits.len(), 1, "bare name anchors to a path component");
        assert_eq!(hits[0].file_path, "/usr/bin/nvim");
        assert_eq!(hits[0].media_name, "Core");

        let hits = db.search_files("*nvim*", None, 0).await.unwrap();
        assert_eq!(hits.len(), 2, "explicit wildcards search substrings");

        let state = db.get_files_xml_state(media).await.unwrap().unwrap();
        assert_eq!(state.file_count, 3);
        assert_eq!(state.files_md5.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn fts_rebuild_matches_like() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;
        db.import_files(media, sample(), None, None, |_, _| {}, 0)
            .await
            .unwrap();

        let indexed = db.rebuild_fts_index(|_, _| {}).await.unwrap();
        assert_eq!(indexed, 3);
        assert!(db.is_fts_index_current().await.unwrap());

        for pattern in ["nvim", "*nvim*", "/usr/bin/*", "wget"] {
            let fts = db.search_files(pattern, None, 0).await.unwrap();
            let like = db.search_files_like(pattern, None, 0).await.unwrap();
            assert_eq!(fts, like, "FTS and LIKE disagree for {pattern}");
        }
    }

    #[tokio::test]
    async fn fts_corruption_falls_back() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;
        db.import_files(media, sample(), None, None, |_, _| {}, 0)
            .await
            .unwrap();
        db.rebuild_fts_index(|_, _| {}).await.unwrap();

        // Dropping the virtual table mid-flight simulates corruption:
        // the query must degrade to the LIKE scan with identical results
        sqlx::query("DROP TABLE package_files_fts")
            .execute(db.pool())
            .await
            .unwrap();

        let hits = db.search_files("nvim", None, 0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(!db.is_fts_index_current().await.unwrap());
    }

    #[tokio::test]
    async fn differential_sync_keeps_fts_in_step() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;
        db.import_files(media, sample(), None, None, |_, _| {}, 0)
            .await
            .unwrap();
        db.rebuild_fts_index(|_, _| {}).await.unwrap();

        db.delete_package_files_by_nevra(media, &["wget-1.21-1.mga10.x86_64".to_owned()])
            .await
            .unwrap();
        db.insert_package_files_batch(
            media,
            "curl-8.6.0-1.mga10.x86_64",
            &["/usr/bin/curl".to_owned()],
        )
        .await
        .unwrap();

        assert!(db.is_fts_index_current().await.unwrap());
        assert!(db.search_files("wget", None, 0).await.unwrap().is_empty());
        assert_eq!(db.search_files("curl", None, 0).await.unwrap().len(), 1);

        let nevras = db.package_nevras_for_media(media).await.unwrap();
        assert_eq!(nevras.len(), 2);
    }

    #[tokio::test]
    async fn staged_import_is_atomic() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;
        db.import_files(media, sample(), None, None, |_, _| {}, 0)
            .await
            .unwrap();

        let (files, packages) = db
            .import_files_staged(
                media,
                vec![("only-1.0-1.mga10.noarch".to_owned(), vec!["/opt/only".to_owned()])],
                Some("new"),
                Some(10),
            )
            .await
            .unwrap();
        assert_eq!((files, packages), (1, 1));
        assert!(db.search_files("nvim", None, 0).await.unwrap().is_empty());
        assert_eq!(db.search_files("only", None, 0).await.unwrap().len(), 1);
    }

    #[test]
    fn pattern_rewrites() {
        assert_eq!(sql_pattern("nvim"), "%/nvim");
        assert_eq!(sql_pattern("/usr/bin/nvim"), "/usr/bin/nvim");
        assert_eq!(sql_pattern("*nvim*"), "%nvim%");
        assert_eq!(sql_pattern("lib?.so"), "lib_.so");
    }
}
