mod file;

pub use file::JsonFileStore;

use log::info;
use std::collections::HashMap;
use std::sync::{ Arc, Mutex, PoisonError };
use thiserror::Error;

use crate::models::chat::Conversation;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store file IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored value for '{key}' is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store file {path} is not a JSON object of strings: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-user key/value string storage, the client-side counterpart of browser `localStorage`.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Opens the JSON file store at `path`, or an in-memory store when no path is given.
pub fn open_store(path: Option<&str>) -> Result<Arc<dyn LocalStore>, StorageError> {
    match path {
        Some(path) => {
            let store = JsonFileStore::open(path)?;
            info!("Widget preferences will be stored in: {}", store.path().display());
            Ok(Arc::new(store))
        }
        None => {
            info!("Widget preferences will be kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub fn save_history(store: &dyn LocalStore, key: &str, conversation: &Conversation) -> Result<(), StorageError> {
    let json = serde_json::to_string(conversation).map_err(|source| StorageError::Corrupt {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &json)
}

pub fn load_history(store: &dyn LocalStore, key: &str) -> Result<Option<Conversation>, StorageError> {
    match store.get(key)? {
        Some(json) =>
            serde_json::from_str(&json).map(Some).map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}
