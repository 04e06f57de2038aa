// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite};

use super::{Database, Error};
use crate::dependency::Capability;
use crate::evr::{Evr, Nevra};
use crate::package::Meta;

/// Keeps batched inserts under SQLite's bind-parameter limit
const INSERT_CHUNK: usize = 500;

/// One package row joined with its owning media
#[derive(Debug, Clone)]
pub struct Record {
    pub meta: Meta,
    pub media_id: i64,
    pub media_name: String,
    pub media_priority: i64,
}

impl Database {
    /// Atomically replace the package index of one media with a fresh
    /// synthesis import. Either everything lands or nothing does.
    pub async fn import_packages(&self, media_id: i64, packages: &[Meta]) -> Result<(), Error> {
        let _guard = self.writer().await;
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM packages WHERE media_id = ?")
            .bind(media_id)
            .execute(&mut *tx)
            .await?;

        for chunk in packages.chunks(INSERT_CHUNK / 11) {
            QueryBuilder::<Sqlite>::new(
                "INSERT INTO packages (media_id, name, nevra, epoch, version, release,
                                       arch, summary, pkg_group, filesize, size) ",
            )
            .push_values(chunk, |mut b, meta| {
                b.push_bind(media_id)
                    .push_bind(meta.name().to_lowercase())
                    .push_bind(meta.nevra.to_string())
                    .push_bind(meta.evr().epoch as i64)
                    .push_bind(&meta.evr().version)
                    .push_bind(&meta.evr().release)
                    .push_bind(meta.arch())
                    .push_bind(&meta.summary)
                    .push_bind(&meta.group)
                    .push_bind(meta.filesize as i64)
                    .push_bind(meta.size as i64);
            })
            .build()
            .execute(&mut *tx)
            .await?;
        }

        // Package ids for the capability tables
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, nevra FROM packages WHERE media_id = ?",
        )
        .bind(media_id)
        .fetch_all(&mut *tx)
        .await?;
        let ids: HashMap<String, i64> = rows.into_iter().map(|(id, nevra)| (nevra, id)).collect();

        let mut caps: Vec<(i64, &'static str, String, String)> = Vec::new();
        for meta in packages {
            let Some(&id) = ids.get(&meta.nevra.to_string()) else {
                continue;
            };
            for (kind, list) in [
                ("provides", &meta.provides),
                ("requires", &meta.requires),
                ("recommends", &meta.recommends),
                ("suggests", &meta.suggests),
                ("conflicts", &meta.conflicts),
                ("obsoletes", &meta.obsoletes),
            ] {
                for cap in list {
                    caps.push((id, kind, cap.name.clone(), cap.to_string()));
                }
            }
        }

        for chunk in caps.chunks(INSERT_CHUNK / 4) {
            QueryBuilder::<Sqlite>::new(
                "INSERT INTO package_caps (package_id, kind, name, capability) ",
            )
            .push_values(chunk, |mut b, (id, kind, name, capability)| {
                b.push_bind(id).push_bind(*kind).push_bind(name).push_bind(capability);
            })
            .build()
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Case-folded name lookup across enabled media, best EVR first
    pub async fn get_package(&self, name: &str) -> Result<Vec<Record>, Error> {
        let entries = sqlx::query_as::<_, encoding::Entry>(&format!(
            "{SELECT_RECORD} WHERE p.name = ? AND m.enabled = 1"
        ))
        .bind(name.to_lowercase())
        .fetch_all(self.pool())
        .await?;
        self.finish_records(entries).await
    }

    /// Accepts a bare name or a full NEVRA
    pub async fn get_package_smart(&self, spec: &str) -> Result<Vec<Record>, Error> {
        let by_nevra = sqlx::query_as::<_, encoding::Entry>(&format!(
            "{SELECT_RECORD} WHERE p.nevra = ? AND m.enabled = 1"
        ))
        .bind(spec)
        .fetch_all(self.pool())
        .await?;
        if !by_nevra.is_empty() {
            return self.finish_records(by_nevra).await;
        }
        self.get_package(spec).await
    }

    /// All packages across enabled media providing a capability name
    pub async fn whatprovides(&self, capability: &str) -> Result<Vec<Record>, Error> {
        let entries = sqlx::query_as::<_, encoding::Entry>(&format!(
            "{SELECT_RECORD}
             WHERE m.enabled = 1
               AND (p.name = ? OR p.id IN
                    (SELECT package_id FROM package_caps
                     WHERE kind = 'provides' AND name = ?))"
        ))
        .bind(capability.to_lowercase())
        .bind(capability)
        .fetch_all(self.pool())
        .await?;
        self.finish_records(entries).await
    }

    /// Substring search over package names, for the query surface
    pub async fn search_packages(&self, term: &str, limit: i64) -> Result<Vec<Record>, Error> {
        let pattern = format!("%{}%", term.to_lowercase());
        let limit_clause = if limit > 0 {
            format!(" LIMIT {limit}")
        } else {
            String::new()
        };
        let entries = sqlx::query_as::<_, encoding::Entry>(&format!(
            "{SELECT_RECORD} WHERE p.name LIKE ? AND m.enabled = 1 ORDER BY p.name{limit_clause}"
        ))
        .bind(pattern)
        .fetch_all(self.pool())
        .await?;
        self.finish_records(entries).await
    }

    /// Load the whole available pool of enabled media, capabilities included.
    /// This is the resolver's input.
    pub async fn load_pool(&self) -> Result<Vec<Record>, Error> {
        let entries = sqlx::query_as::<_, encoding::Entry>(&format!(
            "{SELECT_RECORD} WHERE m.enabled = 1"
        ))
        .fetch_all(self.pool())
        .await?;
        self.finish_records(entries).await
    }

    async fn finish_records(&self, entries: Vec<encoding::Entry>) -> Result<Vec<Record>, Error> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut caps_by_package: HashMap<i64, Vec<(String, Capability)>> = HashMap::new();
        for chunk in entries.chunks(INSERT_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new(
                "SELECT package_id, kind, capability FROM package_caps WHERE package_id IN (",
            );
            let mut separated = query.separated(", ");
            for entry in chunk {
                separated.push_bind(entry.id);
            }
            separated.push_unseparated(")");

            let rows = query
                .build_query_as::<encoding::Cap>()
                .fetch_all(self.pool())
                .await?;
            for row in rows {
                if let Ok(cap) = row.capability.parse::<Capability>() {
                    caps_by_package
                        .entry(row.package_id)
                        .or_default()
                        .push((row.kind, cap));
                }
            }
        }

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut meta = Meta::new(Nevra::new(
                entry.real_name(),
                Evr::new(entry.epoch as u64, entry.version, entry.release),
                entry.arch,
            ));
            meta.summary = entry.summary;
            meta.group = entry.pkg_group;
            meta.filesize = entry.filesize as u64;
            meta.size = entry.size as u64;

            for (kind, cap) in caps_by_package.remove(&entry.id).unwrap_or_default() {
                match kind.as_str() {
                    "provides" => meta.provides.push(cap),
                    "requires" => meta.requires.push(cap),
                    "recommends" => meta.recommends.push(cap),
                    "suggests" => meta.suggests.push(cap),
                    "conflicts" => meta.conflicts.push(cap),
                    "obsoletes" => meta.obsoletes.push(cap),
                    _ => {}
                }
            }

            records.push(Record {
                meta,
                media_id: entry.media_id,
                media_name: entry.media_name,
                media_priority: entry.media_priority,
            });
        }

        // Deterministic output: best EVR first, then media priority
        records.sort_by(|a, b| {
            a.meta
                .name()
                .cmp(b.meta.name())
                .then_with(|| b.meta.evr().cmp(a.meta.evr()))
                .then_with(|| b.media_priority.cmp(&a.media_priority))
                .then_with(|| a.media_name.cmp(&b.media_name))
        });

        Ok(records)
    }
}

const SELECT_RECORD: &str = "
    SELECT p.id, p.media_id, p.nevra, p.epoch, p.version, p.release, p.arch,
           p.summary, p.pkg_group, p.filesize, p.size,
           m.name AS media_name, m.priority AS media_priority
    FROM packages p
    JOIN media m ON p.media_id = m.id";

mod encoding {
    use sqlx::FromRow;

    #[derive(FromRow)]
    pub struct Entry {
        pub id: i64,
        pub media_id: i64,
        pub nevra: String,
        pub epoch: i64,
        pub version: String,
        pub release: String,
        pub arch: String,
        pub summary: String,
        pub pkg_group: String,
        pub filesize: i64,
        pub size: i64,
        pub media_name: String,
        pub media_priority: i64,
    }

    impl Entry {
        /// The stored `name` column is case-folded for lookup; recover the
        /// real casing from the nevra
        pub fn real_name(&self) -> String {
            crate::evr::Nevra::parse(&self.nevra)
                .map(|n| n.name)
                .unwrap_or_else(|_| self.nevra.clone())
        }
    }

    #[derive(FromRow)]
    pub struct Cap {
        pub package_id: i64,
        pub kind: String,
        pub capability: String,
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

    fn meta(nevra: &str, provides: &[&str], requires: &[&str]) -> Meta {
        let mut meta = Meta::new(Nevra::parse(nevra).unwrap());
        meta.provides = provides.iter().map(|p| p.parse().unwrap()).collect();
        meta.requires = requires.iter().map(|r| r.parse().unwrap()).collect();
        meta.filesize = 1000;
        meta.size = 4000;
        meta
    }

    #[tokio::test]
    async fn import_and_query() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;

        db.import_packages(
            media,
            &[
                meta("wget-1.21-1.mga10.x86_64", &["webclient"], &["libc.so.6"]),
                meta("curl-8.6.0-1.mga10.x86_64", &["webclient"], &[]),
            ],
        )
        .await
        .unwrap();

        let wget = db.get_package("Wget").await.unwrap();
        assert_eq!(wget.len(), 1, "lookup is case folded");
        assert_eq!(wget[0].meta.requires.len(), 1);
        assert_eq!(wget[0].media_name, "Core");

        let providers = db.whatprovides("webclient").await.unwrap();
        assert_eq!(providers.len(), 2);

        let smart = db.get_package_smart("wget-1.21-1.mga10.x86_64").await.unwrap();
        assert_eq!(smart.len(), 1);
    }

    #[tokio::test]
    async fn import_replaces_atomically() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;

        db.import_packages(media, &[meta("old-1.0-1.mga10.x86_64", &[], &[])])
            .await
            .unwrap();
        db.import_packages(media, &[meta("new-2.0-1.mga10.x86_64", &[], &[])])
            .await
            .unwrap();

        assert!(db.get_package("old").await.unwrap().is_empty());
        assert_eq!(db.get_package("new").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn media_removal_cascades_to_packages() {
        let db = Database::memory().await.unwrap();
        let media = seed(&db).await;
        db.import_packages(media, &[meta("wget-1.21-1.mga10.x86_64", &[], &[])])
            .await
            .unwrap();
        db.remove_media("Core").await.unwrap();
        assert!(db.load_pool().await.unwrap().is_empty());

        let orphans: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM package_caps")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(orphans.0, 0, "capability rows cascade with the package");
    }
}
