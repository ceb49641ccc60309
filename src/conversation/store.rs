//! Thread persistence as a single JSON document.
//!
//! The whole mapping is the unit of persistence: loaded once at startup,
//! written after every mutation and at shutdown. Writes go to a sibling
//! temp file that is renamed over the target, so a failed write never
//! clobbers the previous document.

use crate::conversation::history::{Thread, ThreadKey, Turn};
use crate::error::StoreError;

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

type ThreadMap = BTreeMap<ThreadKey, Vec<Turn>>;

/// In-memory threads backed by a JSON file.
#[derive(Debug)]
pub struct ThreadStore {
    path: PathBuf,
    max_turns: usize,
    threads: RwLock<ThreadMap>,
    /// One lock per key, held for a whole exchange.
    key_locks: Mutex<HashMap<ThreadKey, Arc<Mutex<()>>>>,
    write_lock: Mutex<()>,
}

impl ThreadStore {
    /// Load the store from `path`. Missing or unreadable files yield an empty store.
    pub fn load(path: impl Into<PathBuf>, max_turns: usize) -> Self {
        let path = path.into();
        let threads = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<ThreadMap>(&raw) {
                Ok(threads) => threads
                    .into_iter()
                    .map(|(key, turns)| (key, Thread::from_turns(turns, max_turns).into_turns()))
                    .collect(),
                Err(error) => {
                    tracing::error!(path = %path.display(), %error, "thread store is not valid JSON, starting empty");
                    ThreadMap::new()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no thread store on disk, starting empty");
                ThreadMap::new()
            }
            Err(error) => {
                tracing::error!(path = %path.display(), %error, "failed to read thread store, starting empty");
                ThreadMap::new()
            }
        };

        tracing::info!(path = %path.display(), threads = threads.len(), "thread store loaded");

        Self {
            path,
            max_turns,
            threads: RwLock::new(threads),
            key_locks: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Serialize access to one thread. Hold the guard across read-modify-write.
    pub async fn lock(&self, key: &ThreadKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut key_locks = self.key_locks.lock().await;
            key_locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Forget the lock for `key` once nobody holds or waits on it.
    pub async fn release_lock(&self, key: &ThreadKey) {
        let mut key_locks = self.key_locks.lock().await;
        if key_locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            key_locks.remove(key);
        }
    }

    /// Current turns for `key`; empty when the thread does not exist.
    pub async fn thread(&self, key: &ThreadKey) -> Thread {
        let threads = self.threads.read().await;
        match threads.get(key) {
            Some(turns) => Thread::from_turns(turns.clone(), self.max_turns),
            None => Thread::new(self.max_turns),
        }
    }

    /// Replace the stored thread for `key`.
    pub async fn commit(&self, key: ThreadKey, thread: Thread) {
        self.threads.write().await.insert(key, thread.into_turns());
    }

    /// Remove a thread. Returns whether it existed.
    pub async fn remove(&self, key: &ThreadKey) -> bool {
        self.threads.write().await.remove(key).is_some()
    }

    pub async fn contains(&self, key: &ThreadKey) -> bool {
        self.threads.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.read().await.is_empty()
    }

    /// Write the whole mapping to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let _write_guard = self.write_lock.lock().await;
        let json = {
            let threads = self.threads.read().await;
            serde_json::to_string_pretty(&*threads)?
        };
        write_atomic(&self.path, json.as_bytes()).await
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let io_error = |source: std::io::Error| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }

    let temp_path = temp_path_for(path);
    if let Err(error) = tokio::fs::write(&temp_path, contents).await {
        tokio::fs::remove_file(&temp_path).await.ok();
        return Err(io_error(error));
    }

    tokio::fs::rename(&temp_path, path).await.map_err(io_error)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
