//! File-backed key/value storage.
//!
//! Each key lives in `<dir>/<key>.json`. Reads are served from an in-memory
//! cache loaded once at open; writes update the cache immediately and are
//! flushed to disk by a background task, so callers never wait on the disk.
//! `flush` waits for that task to catch up.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

use futures::future::{BoxFuture, FutureExt};
use scholarflow_core::{KeyValueStore, StoreError};
use tokio::sync::{mpsc, oneshot};

enum WriteOp {
    Set { key: String, value: String },
    Remove { key: String },
    Flush(oneshot::Sender<()>),
}

/// File-backed storage implementation.
pub struct FileStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, String>>,
    writer: mpsc::UnboundedSender<WriteOp>,
}

impl FileStore {
    /// Default data directory (`<local data dir>/scholarflow`).
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("scholarflow"))
    }

    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or read, or if no
    /// runtime is available for the writer task.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        std::fs::create_dir_all(&dir)?;
        let cache = load_dir(&dir)?;
        tracing::debug!(dir = %dir.display(), keys = cache.len(), "Opened file store");

        let (writer, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_writer(dir.clone(), rx));

        Ok(Self {
            dir,
            cache: RwLock::new(cache),
            writer,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn enqueue(&self, op: WriteOp) -> Result<(), StoreError> {
        self.writer
            .send(op)
            .map_err(|_| StoreError::Unavailable("writer stopped".to_string()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .cache
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.cache
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .insert(key.to_owned(), value.clone());
        self.enqueue(WriteOp::Set {
            key: key.to_owned(),
            value,
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.cache
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .remove(key);
        self.enqueue(WriteOp::Remove {
            key: key.to_owned(),
        })
    }

    /// Resolves once every write issued so far has reached the disk.
    fn flush(&self) -> BoxFuture<'_, ()> {
        let (tx, rx) = oneshot::channel();
        let queued = self.writer.send(WriteOp::Flush(tx)).is_ok();
        async move {
            if queued {
                let _ = rx.await;
            }
        }
        .boxed()
    }
}

fn file_name(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.json")
}

fn load_dir(dir: &Path) -> Result<HashMap<String, String>, StoreError> {
    let mut cache = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(value) => {
                cache.insert(key.to_owned(), value);
            }
            Err(e) => tracing::warn!(path = %path.display(), "Skipping unreadable file: {e}"),
        }
    }
    Ok(cache)
}

async fn run_writer(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Set { key, value } => {
                let path = dir.join(file_name(&key));
                let tmp = path.with_extension("json.tmp");
                let result = async {
                    tokio::fs::write(&tmp, value.as_bytes()).await?;
                    tokio::fs::rename(&tmp, &path).await
                }
                .await;
                if let Err(e) = result {
                    tracing::warn!(path = %path.display(), "Failed to write: {e}");
                }
            }
            WriteOp::Remove { key } => {
                let path = dir.join(file_name(&key));
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!(path = %path.display(), "Failed to remove: {e}"),
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
