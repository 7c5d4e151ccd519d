//! SQLite-backed implementation of [`EventSink`].
//!
//! Uses a single `Mutex<Option<Connection>>` and runs every statement on
//! the blocking pool. `close` drops the connection; later calls fail with
//! [`SinkError::Closed`].

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use snafu::prelude::*;
use tracing::{debug, warn};

use super::schema::{self, Dialect};
use super::{EventSink, dedupe_last_wins};
use crate::error::{ClosedSnafu, CreateDirSnafu, SinkError, SqliteSnafu, TaskJoinSnafu};
use crate::event::Event;

/// Owned row in SQLite storage form.
struct SqliteRow {
    event_id: String,
    event_type: &'static str,
    user_id: Option<String>,
    product_id: Option<String>,
    session_id: Option<String>,
    timestamp: String,
    ingestion_timestamp: String,
    device: String,
    browser: String,
    location: String,
    price: String,
    quantity: i32,
    discount_applied: bool,
    product_category: Option<String>,
}

/// Timestamps are stored as RFC 3339 text with microseconds and a `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl From<&Event> for SqliteRow {
    fn from(e: &Event) -> Self {
        Self {
            event_id: e.event_id.clone(),
            event_type: e.event_type.as_str(),
            user_id: e.user_id.clone(),
            product_id: e.product_id.clone(),
            session_id: e.session_id.clone(),
            timestamp: format_timestamp(&e.timestamp),
            ingestion_timestamp: format_timestamp(&e.ingestion_timestamp),
            device: e.device.clone(),
            browser: e.browser.clone(),
            location: e.location.clone(),
            price: e.price.to_string(),
            quantity: e.quantity,
            discount_applied: e.discount_applied,
            product_category: e.product_category.clone(),
        }
    }
}

/// Upsert sink writing to a local SQLite database file.
pub struct SqliteSink {
    conn: Arc<Mutex<Option<Connection>>>,
    table: String,
    upsert_sql: Arc<str>,
}

impl SqliteSink {
    /// Open or create the database at `path`.
    pub async fn open(path: &Path, table: String) -> Result<Self, SinkError> {
        let path = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })?;
            }
            Connection::open(&path).context(SqliteSnafu { operation: "open" })
        })
        .await
        .context(TaskJoinSnafu)??;

        let upsert_sql = schema::upsert_sql(Dialect::Sqlite, &table, 1);
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            table,
            upsert_sql: upsert_sql.into(),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, SinkError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, SinkError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| SinkError::LockPoisoned)?;
            let conn = guard.as_mut().context(ClosedSnafu)?;
            f(conn)
        })
        .await
        .context(TaskJoinSnafu)?
    }
}

#[async_trait]
impl EventSink for SqliteSink {
    async fn ensure_table(&self) -> Result<(), SinkError> {
        let ddl = schema::create_table_sql(Dialect::Sqlite, &self.table);
        self.with_conn(move |conn| {
            conn.execute_batch(&ddl)
                .context(SqliteSnafu { operation: "create table" })
        })
        .await
    }

    async fn apply(&self, events: &[Event]) -> Result<u64, SinkError> {
        let rows: Vec<SqliteRow> = dedupe_last_wins(events)
            .into_iter()
            .map(SqliteRow::from)
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = Arc::clone(&self.upsert_sql);
        let applied = self
            .with_conn(move |conn| {
                let tx = conn
                    .transaction()
                    .context(SqliteSnafu { operation: "begin" })?;
                {
                    let mut stmt = tx
                        .prepare_cached(&sql)
                        .context(SqliteSnafu { operation: "prepare" })?;
                    for row in &rows {
                        stmt.execute(params![
                            row.event_id,
                            row.event_type,
                            row.user_id,
                            row.product_id,
                            row.session_id,
                            row.timestamp,
                            row.ingestion_timestamp,
                            row.device,
                            row.browser,
                            row.location,
                            row.price,
                            row.quantity,
                            row.discount_applied,
                            row.product_category,
                        ])
                        .context(SqliteSnafu { operation: "execute" })?;
                    }
                }
                tx.commit().context(SqliteSnafu { operation: "commit" })?;
                Ok(rows.len() as u64)
            })
            .await?;

        debug!(table = %self.table, rows = applied, "Applied batch to SQLite");
        Ok(applied)
    }

    async fn close(&self) {
        let conn = Arc::clone(&self.conn);
        let closed = tokio::task::spawn_blocking(move || {
            let taken = conn.lock().map_err(|_| SinkError::LockPoisoned)?.take();
            match taken {
                Some(conn) => conn
                    .close()
                    .map(|()| true)
                    .map_err(|(_, source)| SinkError::Sqlite {
                        operation: "close",
                        source,
                    }),
                None => Ok(false),
            }
        })
        .await
        .context(TaskJoinSnafu);

        match closed {
            Ok(Ok(true)) => debug!(table = %self.table, "Closed SQLite connection"),
            Ok(Ok(false)) => {}
            Ok(Err(e)) | Err(e) => warn!(error = %e, "Failed to close SQLite connection"),
        }
    }
}
