//! Settings store adapter.
//!
//! A small key/value record with change notifications. The store never knows
//! who is listening; the synchronizer subscribes to it.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::models::{PartialSettings, SettingsKey};
use async_trait::async_trait;
use log::debug;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid stored value for '{key}': {source}")]
    Corrupt {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode '{key}': {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Settings storage unavailable: {0}")]
    Unavailable(String),
}

/// Keys written by one `set` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChange {
    pub keys: Vec<SettingsKey>,
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored values for `keys`; keys never written are absent.
    async fn get(&self, keys: &[SettingsKey]) -> Result<PartialSettings, StoreError>;

    /// Write the present fields and notify subscribers.
    async fn set(&self, patch: PartialSettings) -> Result<(), StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange>;
}

/// Fan-out for change notifications shared by store implementations.
#[derive(Debug)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<SettingsChange>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl ChangeNotifier {
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.tx.subscribe()
    }

    pub fn notify(&self, keys: Vec<SettingsKey>) {
        if keys.is_empty() {
            return;
        }
        // No subscribers is fine.
        if self.tx.send(SettingsChange { keys }).is_err() {
            debug!("Settings changed with no subscribers");
        }
    }
}

/// In-process settings record.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<PartialSettings>,
    changes: ChangeNotifier,
}

impl MemoryStore {
    pub fn new(initial: PartialSettings) -> Self {
        Self {
            record: Mutex::new(initial),
            changes: ChangeNotifier::default(),
        }
    }

    fn lock_record(&self) -> MutexGuard<'_, PartialSettings> {
        self.record.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, keys: &[SettingsKey]) -> Result<PartialSettings, StoreError> {
        Ok(self.lock_record().clone().retain_keys(keys))
    }

    async fn set(&self, patch: PartialSettings) -> Result<(), StoreError> {
        let keys = patch.keys();
        self.lock_record().merge(patch);
        self.changes.notify(keys);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }
}
