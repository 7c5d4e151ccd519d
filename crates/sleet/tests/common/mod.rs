//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use rusqlite::Connection;
use tempfile::TempDir;

use sleet::Pipeline;
use sleet::checkpoint::{CheckpointStore, FileCheckpointStore};
use sleet::config::SourceConfig;
use sleet::error::{CheckpointError, SinkError, StorageError};
use sleet::event::Event;
use sleet::sink::{EventSink, SqliteSink};
use sleet::source::FileSource;
use sleet::storage::StorageProvider;

pub const PIPELINE: &str = "test";
pub const TABLE: &str = "ecommerce_events";

/// One NDJSON event line.
pub fn line(event_id: &str, event_type: &str, price: &str) -> String {
    format!(
        r#"{{"event_id":"{event_id}","event_type":"{event_type}","user_id":"u-1","timestamp":"2024-05-01T10:00:00Z","price":"{price}","quantity":1,"metadata":{{"device":"mobile","browser":"firefox","location":"Oslo"}}}}"#
    )
}

/// Input, checkpoint and database directories under one temp dir.
pub struct Harness {
    dir: TempDir,
    pub max_files: usize,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("input")).unwrap();
        Self { dir, max_files: 10 }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.dir.path().join("input")
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.dir.path().join("checkpoint")
    }

    pub fn reject_dir(&self) -> PathBuf {
        self.dir.path().join("rejects")
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("events.db")
    }

    pub fn checkpoint_file(&self) -> PathBuf {
        self.checkpoint_dir()
            .join(format!("{PIPELINE}_checkpoint.json"))
    }

    pub fn write(&self, name: &str, lines: &[String]) {
        let mut contents = lines.join("\n");
        contents.push('\n');
        std::fs::write(self.input_dir().join(name), contents).unwrap();
    }

    pub async fn source(&self) -> FileSource {
        let storage = StorageProvider::for_path(self.input_dir()).await.unwrap();
        let config = SourceConfig {
            path: self.input_dir().display().to_string(),
            max_files_per_trigger: self.max_files,
            trigger_interval_secs: 1,
            max_concurrent_files: 2,
            suffixes: vec![".jsonl".to_string()],
        };
        FileSource::new(Arc::new(storage), config, PIPELINE.to_string())
    }

    pub async fn checkpoint(&self) -> FileCheckpointStore {
        let storage = StorageProvider::for_path(self.checkpoint_dir()).await.unwrap();
        FileCheckpointStore::new(Arc::new(storage), PIPELINE.to_string())
    }

    pub async fn sqlite(&self) -> SqliteSink {
        SqliteSink::open(&self.db_path(), TABLE.to_string())
            .await
            .unwrap()
    }

    /// SQLite sink and file checkpoint, table created on first apply.
    pub async fn pipeline(&self) -> Pipeline {
        self.pipeline_with(Box::new(self.checkpoint().await), Box::new(self.sqlite().await))
            .await
    }

    pub async fn pipeline_with(
        &self,
        checkpoint: Box<dyn CheckpointStore>,
        sink: Box<dyn EventSink>,
    ) -> Pipeline {
        Pipeline::new(PIPELINE.to_string(), self.source().await, checkpoint, sink)
            .with_table_setup(true)
    }

    /// `(event_id, event_type, price)` for every row, ordered by id.
    pub fn rows(&self) -> Vec<(String, String, String)> {
        let conn = Connection::open(self.db_path()).unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT event_id, event_type, price FROM {TABLE} ORDER BY event_id"
            ))
            .unwrap();
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    /// Every column except `ingestion_timestamp`, ordered by id.
    pub fn row_snapshot(&self) -> Vec<Vec<Option<String>>> {
        let conn = Connection::open(self.db_path()).unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT event_id, event_type, user_id, product_id, session_id, \"timestamp\", \
                 device, browser, location, price, CAST(quantity AS TEXT), \
                 CAST(discount_applied AS TEXT), product_category \
                 FROM {TABLE} ORDER BY event_id"
            ))
            .unwrap();
        stmt.query_map([], |r| {
            (0..13)
                .map(|i| r.get::<_, Option<String>>(i))
                .collect::<Result<Vec<_>, _>>()
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
    }

    pub fn committed_on_disk(&self) -> BTreeSet<String> {
        let json = std::fs::read_to_string(self.checkpoint_file()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["committed_files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }
}

/// Sink that fails every apply while its switch is on.
pub struct FlakySink {
    inner: SqliteSink,
    pub failing: Arc<AtomicBool>,
    pub calls: Arc<AtomicUsize>,
}

impl FlakySink {
    pub fn new(inner: SqliteSink, failing: bool) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(failing)),
            calls: Arc::default(),
        }
    }
}

#[async_trait]
impl EventSink for FlakySink {
    async fn ensure_table(&self) -> Result<(), SinkError> {
        self.inner.ensure_table().await
    }

    async fn apply(&self, events: &[Event]) -> Result<u64, SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::ConnectTimeout { secs: 0 });
        }
        self.inner.apply(events).await
    }
}

fn disk_error(message: &str) -> CheckpointError {
    CheckpointError::CheckpointStorage {
        source: StorageError::Io {
            source: std::io::Error::other(message.to_string()),
        },
    }
}

/// Checkpoint store whose writes fail while its switch is on, and whose
/// first `load_failures` loads fail.
pub struct FlakyCheckpoint {
    inner: FileCheckpointStore,
    pub failing: Arc<AtomicBool>,
    pub load_failures: Arc<AtomicUsize>,
}

impl FlakyCheckpoint {
    pub fn new(inner: FileCheckpointStore, failing: bool) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(failing)),
            load_failures: Arc::default(),
        }
    }

    pub fn failing_loads(self, count: usize) -> Self {
        self.load_failures.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl CheckpointStore for FlakyCheckpoint {
    async fn load(&mut self) -> Result<bool, CheckpointError> {
        let remaining = self.load_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.load_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(disk_error("checkpoint unreadable"));
        }
        self.inner.load().await
    }

    fn committed(&self) -> &BTreeSet<String> {
        self.inner.committed()
    }

    fn last_batch_id(&self) -> u64 {
        self.inner.last_batch_id()
    }

    async fn mark_committed(
        &mut self,
        files: &[String],
        batch_id: u64,
    ) -> Result<(), CheckpointError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(disk_error("disk full"));
        }
        self.inner.mark_committed(files, batch_id).await
    }
}
