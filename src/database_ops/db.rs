//! SQLite entity store: stores, their dated flavors and the snapshot history.
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::database_ops::custard::{Flavor, Store, StoreDetail};
use crate::database_ops::segments::Segment;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stores (
    slug TEXT PRIMARY KEY,
    name TEXT,
    city TEXT,
    state TEXT,
    first_seen_at TEXT,
    last_seen_at TEXT
);
CREATE TABLE IF NOT EXISTS store_flavors (
    store_slug TEXT,
    flavor_date TEXT,
    title TEXT,
    description TEXT,
    first_seen_at TEXT,
    last_seen_at TEXT,
    PRIMARY KEY (store_slug, flavor_date)
);
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fetched_at TEXT,
    segment TEXT,
    store_slug TEXT,
    flavor_count INTEGER,
    min_date TEXT,
    max_date TEXT,
    raw_json TEXT
);
"#;

/// What one persisted fetch contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub slug: String,
    pub count: usize,
    pub min_date: Option<String>,
    pub max_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionCount {
    pub state: String,
    pub count: i64,
}

pub struct FlavorDb {
    conn: Connection,
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl FlavorDb {
    /// Open (creating if needed) the database and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an existing database without creating it or touching the schema.
    /// Returns `None` when the file is absent.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open {} read-only", path.display()))?;
        Ok(Some(Self { conn }))
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("failed to create flavor schema")
    }

    /// Persist one successful detail fetch atomically: store row, every dated
    /// flavor, and one snapshot row.
    pub fn record_fetch(
        &mut self,
        segment: Segment,
        store: &Store,
        detail: &StoreDetail,
        seen_at: DateTime<Utc>,
    ) -> Result<FetchSummary> {
        let (min_date, max_date) = detail.date_range();
        let raw_json = serde_json::to_string(&detail.raw).context("failed to encode raw payload")?;
        let tx = self.conn.transaction()?;

        upsert_store(&tx, store, seen_at)?;
        for flavor in &detail.flavors {
            if flavor.date.is_empty() {
                debug!(slug = %store.slug, title = %flavor.title, "skipping undated flavor");
                continue;
            }
            upsert_flavor(&tx, &store.slug, flavor, seen_at)?;
        }
        tx.execute(
            "INSERT INTO snapshots(fetched_at, segment, store_slug, flavor_count, min_date, max_date, raw_json)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ts(seen_at),
                segment.label(),
                store.slug,
                detail.flavors.len() as i64,
                min_date,
                max_date,
                raw_json,
            ],
        )?;
        tx.commit()
            .with_context(|| format!("failed to commit fetch for {}", store.slug))?;

        Ok(FetchSummary {
            slug: store.slug.clone(),
            count: detail.flavors.len(),
            min_date,
            max_date,
        })
    }

    /// Row count for `table`, or 0 when the table does not exist.
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        match self.conn.query_row(&sql, [], |row| row.get(0)) {
            Ok(n) => Ok(n),
            Err(e) if is_missing_table(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores per region, largest first.
    pub fn top_regions(&self, limit: usize) -> Result<Vec<RegionCount>> {
        let mut stmt = match self.conn.prepare(
            "SELECT COALESCE(state, ''), COUNT(*) FROM stores
             GROUP BY state ORDER BY COUNT(*) DESC, state ASC LIMIT ?1",
        ) {
            Ok(stmt) => stmt,
            Err(e) if is_missing_table(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(RegionCount {
                state: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        let out = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(out)
    }

    #[cfg(test)]
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn upsert_store(conn: &Connection, store: &Store, seen_at: DateTime<Utc>) -> Result<()> {
    let at = ts(seen_at);
    conn.execute(
        "INSERT INTO stores(slug, name, city, state, first_seen_at, last_seen_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(slug) DO UPDATE SET
            name=excluded.name,
            city=excluded.city,
            state=excluded.state,
            last_seen_at=excluded.last_seen_at",
        params![store.slug, store.name, store.city, store.state, at],
    )?;
    Ok(())
}

fn upsert_flavor(conn: &Connection, slug: &str, flavor: &Flavor, seen_at: DateTime<Utc>) -> Result<()> {
    let at = ts(seen_at);
    conn.execute(
        "INSERT INTO store_flavors(store_slug, flavor_date, title, description, first_seen_at, last_seen_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(store_slug, flavor_date) DO UPDATE SET
            title=excluded.title,
            description=excluded.description,
            last_seen_at=excluded.last_seen_at",
        params![slug, flavor.date, flavor.title, flavor.description, at],
    )?;
    Ok(())
}

fn is_missing_table(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.contains("no such table"),
        _ => false,
    }
}
