//! Durable cache tier backed by SQLite.
//!
//! A namespace-unaware key-value store over a single `entries` table,
//! accessed through a tokio-rusqlite connection that runs operations on a
//! background thread. The store owns per-key expiry: every read filters out
//! rows whose `expires_at` has passed, so callers never see entries the
//! storage layer considers stale. The entry-level TTL carried inside each
//! record is still re-checked by the facade, since the two lifetimes are set
//! independently at write time.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use tokio_rusqlite::rusqlite;
use tokio_rusqlite::{Connection, params};

use super::entry::CacheEntry;
use super::migrations;
use crate::Error;

/// Handle to the persistent cache database.
///
/// Cloning shares the same underlying connection.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open the database at `path`, creating the file if needed, and run
    /// pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database, for tests.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;",
            )?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }

    /// Fetch the entry stored under `key`.
    ///
    /// Rows past their store-level expiry are filtered out. Returns
    /// [`Error::MalformedRecord`] when a row cannot be decoded.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let key = key.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT content, cached_at, ttl_seconds, version, namespace, source_kind
                     FROM entries WHERE key = ?1 AND expires_at > ?2",
                )?;

                let row = stmt.query_row(params![key, now], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                });

                match row {
                    Ok((content, cached_at, ttl, version, namespace, source_kind)) => {
                        let cached_at = DateTime::parse_from_rfc3339(&cached_at)
                            .map_err(|e| Error::MalformedRecord { key: key.clone(), reason: e.to_string() })?
                            .with_timezone(&Utc);
                        Ok(Some(CacheEntry { content, cached_at, ttl, version, namespace, source_kind }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace the entry under `key`.
    ///
    /// `expire_seconds` sets the store-level expiry; the entry's own TTL
    /// travels inside the record.
    pub async fn put(&self, key: &str, entry: &CacheEntry, expire_seconds: i64) -> Result<(), Error> {
        let key = key.to_string();
        let entry = entry.clone();
        let expires_at = (Utc::now() + Duration::seconds(expire_seconds)).to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (
                        key, content, cached_at, ttl_seconds, version, namespace, source_kind, expires_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(key) DO UPDATE SET
                        content = excluded.content,
                        cached_at = excluded.cached_at,
                        ttl_seconds = excluded.ttl_seconds,
                        version = excluded.version,
                        namespace = excluded.namespace,
                        source_kind = excluded.source_kind,
                        expires_at = excluded.expires_at",
                    params![
                        key,
                        entry.content,
                        entry.cached_at.to_rfc3339(),
                        entry.ttl,
                        entry.version,
                        entry.namespace,
                        entry.source_kind,
                        expires_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the entry under `key`. Returns whether a row was removed.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let removed = conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a store-level-fresh entry exists under `key`.
    pub async fn contains(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let present: bool = conn
                    .query_row(
                        "SELECT EXISTS(SELECT 1 FROM entries WHERE key = ?1 AND expires_at > ?2)",
                        params![key, now],
                        |row| row.get(0),
                    )
                    .map_err(Error::from)?;
                Ok(present)
            })
            .await
            .map_err(Error::from)
    }

    /// All keys with a store-level-fresh entry.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT key FROM entries WHERE expires_at > ?1")?;
                let keys = stmt
                    .query_map(params![now], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of store-level-fresh entries.
    pub async fn len(&self) -> Result<u64, Error> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM entries WHERE expires_at > ?1", params![now], |row| {
                        row.get(0)
                    })
                    .map_err(Error::from)?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Bytes occupied by the database.
    pub async fn volume_bytes(&self) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let volume: i64 = conn
                    .query_row(
                        "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                        [],
                        |row| row.get(0),
                    )
                    .map_err(Error::from)?;
                Ok(volume as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry, expired rows included. Returns the number removed.
    pub async fn clear(&self) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let removed = conn.execute("DELETE FROM entries", [])?;
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete rows whose store-level expiry has passed.
    ///
    /// Expiry is otherwise only enforced on access, so unread stale rows
    /// accumulate until something calls this. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let removed = conn.execute("DELETE FROM entries WHERE expires_at <= ?1", params![now])?;
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }
}
