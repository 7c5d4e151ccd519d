//! Directory-rooted file access through `object_store`.
//!
//! A [`StorageProvider`] is opened on one local directory. Every path it
//! accepts or returns is relative to that directory, so checkpoint entries
//! and reject records never carry absolute paths.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;
use tracing::debug;

use crate::emit;
use crate::error::{InvalidLocationSnafu, IoSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{StorageOperation, StorageRequest};

pub type StorageProviderRef = Arc<StorageProvider>;

#[derive(Clone)]
pub struct StorageProvider {
    store: Arc<dyn ObjectStore>,
    root: std::path::PathBuf,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StorageProvider")
            .field(&self.root.display())
            .finish()
    }
}

/// Time one object store call and report it.
async fn timed<T>(
    operation: StorageOperation,
    call: impl Future<Output = object_store::Result<T>>,
) -> Result<T, StorageError> {
    let start = Instant::now();
    let result = call.await;
    emit!(StorageRequest {
        operation,
        succeeded: result.is_ok(),
        duration: start.elapsed(),
    });
    result.context(ObjectStoreSnafu)
}

impl StorageProvider {
    /// Open `path`, creating the directory when it does not exist yet.
    pub async fn for_path(path: impl AsRef<std::path::Path>) -> Result<Self, StorageError> {
        let root = path.as_ref();
        ensure!(
            !root.as_os_str().is_empty(),
            InvalidLocationSnafu {
                location: String::new(),
            }
        );

        tokio::fs::create_dir_all(root).await.context(IoSnafu)?;
        let store = LocalFileSystem::new_with_prefix(root).context(ObjectStoreSnafu)?;

        Ok(Self {
            store: Arc::new(store),
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Every file below the root, at any depth, whose name ends with one of
    /// `suffixes`. Sorted by path.
    ///
    /// The returned paths are the store's own encoded locations. Hand them
    /// back to [`get`](Self::get) as they are: re-parsing their string form
    /// encodes characters such as `%` a second time.
    pub async fn list_files_with_suffixes(
        &self,
        suffixes: &[String],
    ) -> Result<Vec<Path>, StorageError> {
        let listed: Vec<Path> = timed(
            StorageOperation::List,
            self.store
                .list(None)
                .map_ok(|meta| meta.location)
                .try_collect(),
        )
        .await?;
        let total = listed.len();

        let mut files: Vec<Path> = listed
            .into_iter()
            .filter(|path| {
                let name = path.as_ref();
                suffixes.iter().any(|s| name.ends_with(s.as_str()))
            })
            .collect();
        files.sort();

        debug!(
            listed = total,
            matched = files.len(),
            root = %self.root.display(),
            "Listed input files"
        );
        Ok(files)
    }

    /// Whole contents of one file.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let response = timed(StorageOperation::Get, self.store.get(&path)).await?;
        response.bytes().await.context(ObjectStoreSnafu)
    }

    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        timed(StorageOperation::Put, self.store.put(path, payload)).await?;
        Ok(())
    }

    /// Replace `path` with `content` so readers see either the old or the
    /// new file, never a partial one.
    ///
    /// The bytes go to `{path}.tmp` first and are then renamed over `path`.
    /// A failure at either step leaves the existing file untouched.
    pub async fn atomic_write(&self, path: &Path, content: Vec<u8>) -> Result<(), StorageError> {
        let staged = Path::from(format!("{path}.tmp"));
        self.put_payload(&staged, PutPayload::from(Bytes::from(content)))
            .await?;
        timed(StorageOperation::Rename, self.store.rename(&staged, path)).await
    }
}
