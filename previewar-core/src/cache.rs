use std::path::Path;

use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use tracing::info;
use url::Url;

use crate::selector::ProductReport;

/// File name of the report cache inside the cache directory.
pub const CACHE_DB_FILE: &str = "product_cache.db";

/// Product reports keyed by URL, kept in SQLite until they expire.
/// Blocking; async callers go through `spawn_blocking`.
pub struct ProductCache {
    conn: Connection,
}

impl ProductCache {
    /// Opens the database, creating the file, its directory and the table as needed.
    pub fn new(db_path: &Path) -> Result<Self, String> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create cache directory {:?}: {}", parent, e))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| format!("Cannot open report cache {:?}: {}", db_path, e))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS product_cache (
                url_key TEXT PRIMARY KEY,
                report_json TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_product_cache_expires ON product_cache(expires_at);",
        )
        .map_err(|e| format!("Cannot initialise report cache schema: {}", e))?;

        Ok(Self { conn })
    }

    /// Cached report for `url`, or None if absent or expired.
    pub fn get(&self, url: &str) -> Result<Option<ProductReport>, String> {
        let key = normalize_url_key(url);
        let now = Utc::now().to_rfc3339();

        let mut stmt = self
            .conn
            .prepare("SELECT report_json FROM product_cache WHERE url_key = ?1 AND expires_at > ?2")
            .map_err(|e| format!("Invalid report cache query: {}", e))?;

        match stmt.query_row(params![key, now], |row| row.get::<_, String>(0)) {
            Ok(json) => {
                let report: ProductReport = serde_json::from_str(&json)
                    .map_err(|e| format!("Failed to deserialize cached report: {}", e))?;
                info!("Cache hit for '{}'", key);
                Ok(Some(report))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(format!("Report cache read failed: {}", e)),
        }
    }

    /// Store a report, replacing any existing entry for the same URL.
    pub fn put(&self, url: &str, report: &ProductReport, ttl_days: i64) -> Result<(), String> {
        let key = normalize_url_key(url);
        let now = Utc::now();
        let expires = Duration::try_days(ttl_days)
            .filter(|_| ttl_days > 0)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| format!("Invalid cache TTL of {} days", ttl_days))?;
        let json = serde_json::to_string(report)
            .map_err(|e| format!("Failed to serialize report for cache: {}", e))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO product_cache (url_key, report_json, cached_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key, json, now.to_rfc3339(), expires.to_rfc3339()],
            )
            .map_err(|e| format!("Failed to store report in cache: {}", e))?;

        info!("Cached report for '{}' (expires in {} days)", key, ttl_days);
        Ok(())
    }

    /// Delete expired entries. Returns the number of deleted rows.
    pub fn clear_expired(&self) -> Result<usize, String> {
        let now = Utc::now().to_rfc3339();
        let count = self
            .conn
            .execute("DELETE FROM product_cache WHERE expires_at <= ?1", params![now])
            .map_err(|e| format!("Cannot purge expired reports: {}", e))?;

        info!("Purged {} expired reports", count);
        Ok(count)
    }

    pub fn clear_all(&self) -> Result<usize, String> {
        let count = self
            .conn
            .execute("DELETE FROM product_cache", [])
            .map_err(|e| format!("Cannot purge report cache: {}", e))?;

        info!("Purged all {} cached reports", count);
        Ok(count)
    }
}

/// Cache key for a URL: trimmed, fragment dropped, scheme and host
/// lowercased. Path and query are significant and kept as-is.
pub fn normalize_url_key(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.split('#').next().unwrap_or(trimmed).to_string(),
    }
}
