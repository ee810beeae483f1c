use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use url::Url;

/// Sentinel stored under the scraping key while a run is in flight
pub const RUN_ACTIVE: &str = "active";
/// Sentinel stored under the scraping key once a run has finished or stopped
pub const RUN_INACTIVE: &str = "inactive";

/// Key for the captured target registry of an origin
pub fn targets_key(origin: &str) -> String {
    format!("{}-targets", origin)
}

/// Key for the pagination container path and traversal checkpoint of an origin
pub fn pagination_key(origin: &str) -> String {
    format!("{}-pagination", origin)
}

/// Key for the active-run flag of an origin
pub fn scraping_key(origin: &str) -> String {
    format!("{}-scraping", origin)
}

/// Key for the accumulated result set of an origin
pub fn data_key(origin: &str) -> String {
    format!("{}-data", origin)
}

/// Derives the origin string used to scope storage keys from a page URL
pub fn page_origin(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.origin().ascii_serialization(),
        Err(_) => url.to_string(),
    }
}

/// Async key-value persistence scoped by document origin.
///
/// Failures are absorbed by implementations: `get` yields None when nothing
/// was stored (or the backend failed), and `set`/`remove` log and carry on.
/// Callers must tolerate "nothing was saved" silently.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get the value stored under the given key, if any
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store a value under the given key
    async fn set(&self, key: &str, value: Value);

    /// Remove the value stored under the given key
    async fn remove(&self, key: &str);
}

/// In-memory store used by tests and single-process runs
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) {
        self.entries.lock().await.insert(key.to_string(), value);
    }

    async fn remove(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }
}

/// Store backed by a single JSON file on disk.
///
/// The whole map is rewritten on every mutation; this is the local stand-in
/// for the browser-profile storage the agent state has to outlive page
/// navigations in.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, Value>>,
}

impl FileStore {
    /// Open a file store, loading any previously persisted entries
    pub async fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    ::log::error!("Ignoring corrupt state file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    async fn flush(&self, entries: &HashMap<String, Value>) {
        let serialized = match serde_json::to_string(entries) {
            Ok(serialized) => serialized,
            Err(e) => {
                ::log::error!("Failed to serialize state: {}", e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.path, serialized).await {
            ::log::error!("Failed to write state file {}: {}", self.path.display(), e);
        }
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.flush(&entries).await;
    }

    async fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        self.flush(&entries).await;
    }
}
