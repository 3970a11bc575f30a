//! The key-value blob store holding saved progress and failed submissions.

use chrono::{DateTime, Utc};
use log::debug;
use snafu::prelude::*;
use std::collections::BTreeMap;

/// Where the current progress is saved.
pub const PROGRESS_KEY: &str = "survey_progress_v2";
/// Where progress was saved before versioned payloads.
pub const LEGACY_PROGRESS_KEY: &str = "survey_progress";
pub const BACKUP_KEY_PREFIX: &str = "survey_backup_";

/// The key under which an undelivered submission is kept.
pub fn backup_key(now: &DateTime<Utc>) -> String {
    format!("{}{}", BACKUP_KEY_PREFIX, now.timestamp_millis())
}

#[derive(Debug, Snafu)]
pub enum StoreError {
    #[snafu(display("cannot write '{key}': {message}"))]
    WriteRejected { key: String, message: String },
}

/// An opaque string store, such as the local storage of a browser.
pub trait BlobStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str);
}

/// A `BlobStore` in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// A store refusing every write, like a full browser storage.
    pub fn read_only() -> MemoryStore {
        MemoryStore {
            entries: BTreeMap::new(),
            read_only: true,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        ensure!(
            !self.read_only,
            WriteRejectedSnafu {
                key,
                message: "the store is read-only"
            }
        );
        debug!("MemoryStore::set: {} ({} bytes)", key, value.len());
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn backup_keys_use_milliseconds() {
        let t = Utc.timestamp_millis_opt(1_770_000_000_123).unwrap();
        assert_eq!(backup_key(&t), "survey_backup_1770000000123");
    }

    #[test]
    fn memory_store() {
        let mut s = MemoryStore::new();
        s.set(PROGRESS_KEY, "{}".to_string()).unwrap();
        assert_eq!(s.get(PROGRESS_KEY).as_deref(), Some("{}"));
        s.remove(PROGRESS_KEY);
        assert!(s.is_empty());

        let mut ro = MemoryStore::read_only();
        assert!(ro.set(PROGRESS_KEY, "{}".to_string()).is_err());
        assert_eq!(ro.get(PROGRESS_KEY), None);
    }
}
