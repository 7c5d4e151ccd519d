//! PostgreSQL-backed implementation of [`EventSink`].
//!
//! The connection is opened lazily on first use and dropped after any
//! error, so the next batch reconnects from scratch.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snafu::prelude::*;
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use super::schema::{self, Dialect};
use super::{EventSink, dedupe_last_wins};
use crate::config::PostgresConfig;
use crate::error::{PostgresSnafu, SinkError};
use crate::event::Event;

/// Rows per multi-value `INSERT`. Keeps each statement well under the
/// 65535 bind parameter limit.
const INSERT_CHUNK_SIZE: usize = 1000;

/// One bind parameter, typed to match the cast in the statement.
enum PgParam {
    Text(String),
    NullableText(Option<String>),
    Timestamp(DateTime<Utc>),
    Int(i32),
    Bool(bool),
}

impl PgParam {
    fn as_tosql(&self) -> &(dyn ToSql + Sync) {
        match self {
            PgParam::Text(v) => v,
            PgParam::NullableText(v) => v,
            PgParam::Timestamp(v) => v,
            PgParam::Int(v) => v,
            PgParam::Bool(v) => v,
        }
    }
}

/// Parameters for one row, in [`schema::COLUMNS`] order.
fn row_params(e: &Event) -> [PgParam; 14] {
    [
        PgParam::Text(e.event_id.clone()),
        PgParam::Text(e.event_type.as_str().to_string()),
        PgParam::NullableText(e.user_id.clone()),
        PgParam::NullableText(e.product_id.clone()),
        PgParam::NullableText(e.session_id.clone()),
        PgParam::Timestamp(e.timestamp),
        PgParam::Timestamp(e.ingestion_timestamp),
        PgParam::Text(e.device.clone()),
        PgParam::Text(e.browser.clone()),
        PgParam::Text(e.location.clone()),
        // Bound as text and cast server side to keep exact decimal digits
        PgParam::Text(e.price.to_string()),
        PgParam::Int(e.quantity),
        PgParam::Bool(e.discount_applied),
        PgParam::NullableText(e.product_category.clone()),
    ]
}

/// Upsert sink writing to a PostgreSQL table.
pub struct PostgresSink {
    config: PostgresConfig,
    table: String,
    client: Mutex<Option<Client>>,
}

impl PostgresSink {
    pub fn new(config: PostgresConfig, table: String) -> Self {
        Self {
            config,
            table,
            client: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<Client, SinkError> {
        let secs = self.config.connect_timeout_secs;
        let timeout = Duration::from_secs(secs);

        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.config.host)
            .port(self.config.port)
            .user(&self.config.user)
            .dbname(&self.config.database)
            .connect_timeout(timeout);
        if !self.config.password.is_empty() {
            pg.password(&self.config.password);
        }

        let (client, connection) = tokio::time::timeout(timeout, pg.connect(NoTls))
            .await
            .map_err(|_| SinkError::ConnectTimeout { secs })?
            .context(PostgresSnafu {
                operation: "connect",
            })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!(
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.database,
            "Connected to PostgreSQL"
        );
        Ok(client)
    }

    /// Reuse the cached client if it is still open, otherwise reconnect.
    async fn connected<'a>(&self, slot: &'a mut Option<Client>) -> Result<&'a mut Client, SinkError> {
        let client = match slot.take() {
            Some(client) if !client.is_closed() => client,
            _ => self.connect().await?,
        };
        Ok(slot.insert(client))
    }

    async fn write_rows(client: &mut Client, table: &str, rows: &[&Event]) -> Result<(), SinkError> {
        let tx = client.transaction().await.context(PostgresSnafu {
            operation: "begin",
        })?;

        for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
            let sql = schema::upsert_sql(Dialect::Postgres, table, chunk.len());
            let params: Vec<PgParam> = chunk.iter().flat_map(|e| row_params(e)).collect();
            let param_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(PgParam::as_tosql).collect();

            tx.execute(&sql, &param_refs).await.context(PostgresSnafu {
                operation: "upsert",
            })?;
        }

        tx.commit().await.context(PostgresSnafu {
            operation: "commit",
        })
    }
}

#[async_trait]
impl EventSink for PostgresSink {
    async fn ensure_table(&self) -> Result<(), SinkError> {
        let ddl = schema::create_table_sql(Dialect::Postgres, &self.table);
        let mut slot = self.client.lock().await;
        let client = self.connected(&mut slot).await?;

        let result = client.batch_execute(&ddl).await.context(PostgresSnafu {
            operation: "create table",
        });
        if result.is_err() {
            *slot = None;
        }
        result
    }

    async fn apply(&self, events: &[Event]) -> Result<u64, SinkError> {
        let rows = dedupe_last_wins(events);
        if rows.is_empty() {
            return Ok(0);
        }

        let mut slot = self.client.lock().await;
        let client = self.connected(&mut slot).await?;

        if let Err(e) = Self::write_rows(client, &self.table, &rows).await {
            // The transaction rolled back on drop; start clean next time
            *slot = None;
            return Err(e);
        }

        debug!(table = %self.table, rows = rows.len(), "Applied batch to PostgreSQL");
        Ok(rows.len() as u64)
    }

    async fn close(&self) {
        if self.client.lock().await.take().is_some() {
            debug!("Closed PostgreSQL connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::sink::schema::COLUMNS;
    use crate::sink::test_support::event;

    fn unreachable_config() -> PostgresConfig {
        PostgresConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout_secs: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_row_params_match_column_count() {
        let params = row_params(&event("E1", EventType::Purchase, "19.99"));
        assert_eq!(params.len(), COLUMNS.len());
        assert!(matches!(&params[0], PgParam::Text(id) if id == "E1"));
        assert!(matches!(&params[1], PgParam::Text(t) if t == "purchase"));
        assert!(matches!(&params[10], PgParam::Text(p) if p == "19.99"));
        assert!(matches!(params[11], PgParam::Int(1)));
        assert!(matches!(params[12], PgParam::Bool(false)));
        assert!(matches!(&params[3], PgParam::NullableText(None)));
    }

    #[tokio::test]
    async fn test_empty_batch_does_not_connect() {
        let sink = PostgresSink::new(unreachable_config(), "ecommerce_events".into());
        assert_eq!(sink.apply(&[]).await.unwrap(), 0);
        assert!(sink.client.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_batch() {
        let sink = PostgresSink::new(unreachable_config(), "ecommerce_events".into());
        let result = sink.apply(&[event("E1", EventType::View, "1.00")]).await;
        assert!(result.is_err());
        assert!(sink.client.lock().await.is_none());
    }
}
