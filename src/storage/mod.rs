//! Persistent fingerprint cache
//!
//! SQLite-backed store mapping source page ids to the version and content
//! fingerprint last indexed. Used to decide whether re-indexing is needed
//! at all: the version field tracks what upstream claims, the fingerprint
//! tracks what the content actually was, since upstream version tokens are
//! not always trustworthy.

mod schema;

pub use schema::SCHEMA;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// One cached record per source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_id: String,
    pub last_version: String,
    pub fingerprint: String,
    pub last_indexed_at: String,
}

/// Aggregate cache statistics for reporting.
#[derive(Debug, Clone, Default)]
pub struct CacheStatus {
    pub entries: usize,
    pub newest_entry: Option<String>,
    pub oldest_entry: Option<String>,
}

/// Fingerprint cache connection wrapper
pub struct Cache {
    conn: Connection,
}

impl Cache {
    /// Open or create the cache database inside the given directory.
    pub fn open<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        std::fs::create_dir_all(cache_dir.as_ref()).with_context(|| {
            format!("Failed to create cache directory {:?}", cache_dir.as_ref())
        })?;
        let db_path = cache_dir.as_ref().join("document_cache.db");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open cache database at {:?}", db_path))?;

        let cache = Self { conn };
        cache.initialize()?;
        Ok(cache)
    }

    /// Open an in-memory cache (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory cache")?;
        let cache = Self { conn };
        cache.initialize()?;
        Ok(cache)
    }

    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to initialize cache schema")?;
        Ok(())
    }

    /// Look up the cache entry for a source page.
    pub fn lookup(&self, source_id: &str) -> Result<Option<CacheEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT source_id, last_version, fingerprint, last_indexed_at
                 FROM document_cache WHERE source_id = ?1",
                params![source_id],
                |row| {
                    Ok(CacheEntry {
                        source_id: row.get(0)?,
                        last_version: row.get(1)?,
                        fingerprint: row.get(2)?,
                        last_indexed_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to look up cache entry")?;

        Ok(entry)
    }

    /// Decide whether a page needs processing.
    ///
    /// Skips only when not forced AND an entry exists AND both the upstream
    /// version and the content fingerprint are unchanged. A fingerprint
    /// mismatch always wins over a version match: upstream version tokens
    /// can be stale. Lookup failures fail open to "process": skipping a
    /// page the user asked for is the worse failure mode.
    pub fn should_process(
        &self,
        source_id: &str,
        version: &str,
        fingerprint: &str,
        force: bool,
    ) -> bool {
        if force {
            return true;
        }
        match self.lookup(source_id) {
            Ok(Some(entry)) => {
                let unchanged =
                    entry.last_version == version && entry.fingerprint == fingerprint;
                if unchanged {
                    tracing::info!(
                        "page {} unchanged (version {}), skipping",
                        source_id,
                        version
                    );
                }
                !unchanged
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("cache lookup failed for {}: {:#}; processing anyway", source_id, e);
                true
            }
        }
    }

    /// Record a successful index of a page. Idempotent overwrite.
    pub fn commit(&self, source_id: &str, version: &str, fingerprint: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO document_cache (source_id, last_version, fingerprint, last_indexed_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(source_id) DO UPDATE SET
                     last_version = excluded.last_version,
                     fingerprint = excluded.fingerprint,
                     last_indexed_at = excluded.last_indexed_at",
                params![source_id, version, fingerprint, Utc::now().to_rfc3339()],
            )
            .context("Failed to commit cache entry")?;
        Ok(())
    }

    /// Remove one entry. Returns true when an entry was deleted.
    pub fn delete(&self, source_id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM document_cache WHERE source_id = ?1",
                params![source_id],
            )
            .context("Failed to delete cache entry")?;
        Ok(changed > 0)
    }

    /// Drop all entries. Returns the number cleared.
    pub fn clear(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM document_cache", [], |row| row.get(0))?;
        self.conn
            .execute("DELETE FROM document_cache", [])
            .context("Failed to clear cache")?;
        Ok(count as usize)
    }

    /// Aggregate statistics for reporting.
    pub fn status(&self) -> Result<CacheStatus> {
        let entries: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM document_cache", [], |row| row.get(0))?;
        let newest_entry = self
            .conn
            .query_row(
                "SELECT last_indexed_at FROM document_cache ORDER BY last_indexed_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let oldest_entry = self
            .conn
            .query_row(
                "SELECT last_indexed_at FROM document_cache ORDER BY last_indexed_at ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(CacheStatus {
            entries: entries as usize,
            newest_entry,
            oldest_entry,
        })
    }

    /// All entries, ordered by source id, for status listings.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, last_version, fingerprint, last_indexed_at
             FROM document_cache ORDER BY source_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CacheEntry {
                source_id: row.get(0)?,
                last_version: row.get(1)?,
                fingerprint: row.get(2)?,
                last_indexed_at: row.get(3)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_missing_is_none() {
        let cache = Cache::open_in_memory().unwrap();
        assert!(cache.lookup("12345").unwrap().is_none());
    }

    #[test]
    fn test_commit_and_lookup_roundtrip() {
        let cache = Cache::open_in_memory().unwrap();
        cache.commit("12345", "3", "abc123").unwrap();

        let entry = cache.lookup("12345").unwrap().unwrap();
        assert_eq!(entry.source_id, "12345");
        assert_eq!(entry.last_version, "3");
        assert_eq!(entry.fingerprint, "abc123");
        assert!(!entry.last_indexed_at.is_empty());
    }

    #[test]
    fn test_commit_is_idempotent_overwrite() {
        let cache = Cache::open_in_memory().unwrap();
        cache.commit("12345", "3", "abc").unwrap();
        cache.commit("12345", "4", "def").unwrap();
        cache.commit("12345", "4", "def").unwrap();

        let entry = cache.lookup("12345").unwrap().unwrap();
        assert_eq!(entry.last_version, "4");
        assert_eq!(entry.fingerprint, "def");
        assert_eq!(cache.status().unwrap().entries, 1);
    }

    #[test]
    fn test_should_process_decision_matrix() {
        let cache = Cache::open_in_memory().unwrap();

        // No entry yet: process.
        assert!(cache.should_process("12345", "3", "abc", false));

        cache.commit("12345", "3", "abc").unwrap();

        // Version and fingerprint both unchanged: skip.
        assert!(!cache.should_process("12345", "3", "abc", false));
        // Changed content behind an unchanged version token: process.
        assert!(cache.should_process("12345", "3", "zzz", false));
        // New version token: process, even with identical content.
        assert!(cache.should_process("12345", "9", "abc", false));
        // Both changed: process.
        assert!(cache.should_process("12345", "9", "zzz", false));
        // Force always processes.
        assert!(cache.should_process("12345", "3", "abc", true));
    }

    #[test]
    fn test_clear_returns_count() {
        let cache = Cache::open_in_memory().unwrap();
        cache.commit("a", "1", "x").unwrap();
        cache.commit("b", "1", "y").unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert_eq!(cache.status().unwrap().entries, 0);
    }

    #[test]
    fn test_delete_single_entry() {
        let cache = Cache::open_in_memory().unwrap();
        cache.commit("a", "1", "x").unwrap();
        assert!(cache.delete("a").unwrap());
        assert!(!cache.delete("a").unwrap());
        assert!(cache.lookup("a").unwrap().is_none());
    }

    #[test]
    fn test_entries_listing_is_ordered() {
        let cache = Cache::open_in_memory().unwrap();
        cache.commit("b", "1", "y").unwrap();
        cache.commit("a", "2", "x").unwrap();
        let entries = cache.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source_id, "a");
        assert_eq!(entries[1].source_id, "b");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = Cache::open(dir.path()).unwrap();
            cache.commit("12345", "3", "abc").unwrap();
        }
        let cache = Cache::open(dir.path()).unwrap();
        let entry = cache.lookup("12345").unwrap().unwrap();
        assert_eq!(entry.last_version, "3");
    }

    #[test]
    fn test_status_reports_newest_and_oldest() {
        let cache = Cache::open_in_memory().unwrap();
        assert!(cache.status().unwrap().newest_entry.is_none());
        cache.commit("a", "1", "x").unwrap();
        let status = cache.status().unwrap();
        assert_eq!(status.entries, 1);
        assert!(status.newest_entry.is_some());
        assert_eq!(status.newest_entry, status.oldest_entry);
    }
}
