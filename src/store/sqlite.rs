use super::{ChangeNotifier, SettingsChange, SettingsStore, StoreError};
use crate::db::{migrations, Database};
use crate::models::{PartialSettings, SettingsKey};
use async_trait::async_trait;
use log::{debug, warn};
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Settings persisted one JSON value per key.
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
    changes: ChangeNotifier,
}

impl SqliteStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            db,
            changes: ChangeNotifier::default(),
        }
    }

    fn lock_db(&self) -> MutexGuard<'_, Database> {
        match self.db.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("SqliteStore: database mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// True until settings have been written for the first time.
    pub fn needs_install(&self) -> Result<bool, StoreError> {
        Ok(migrations::is_first_run(self.lock_db().connection())?)
    }

    fn read_value<T: DeserializeOwned>(db: &Database, key: SettingsKey) -> Result<Option<T>, StoreError> {
        let raw: Option<String> = db
            .connection()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                key: key.as_str(),
                source,
            })
        })
        .transpose()
    }

    fn encode<T: Serialize>(key: SettingsKey, value: &T) -> Result<String, StoreError> {
        serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.as_str(),
            source,
        })
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get(&self, keys: &[SettingsKey]) -> Result<PartialSettings, StoreError> {
        let db = self.lock_db();
        let mut partial = PartialSettings::default();

        for key in keys {
            match key {
                SettingsKey::IsBlocking => partial.is_blocking = Self::read_value(&db, *key)?,
                SettingsKey::Websites => partial.websites = Self::read_value(&db, *key)?,
                SettingsKey::Schedule => partial.schedule = Self::read_value(&db, *key)?,
            }
        }

        Ok(partial)
    }

    async fn set(&self, patch: PartialSettings) -> Result<(), StoreError> {
        let mut encoded = Vec::new();
        if let Some(is_blocking) = &patch.is_blocking {
            encoded.push((SettingsKey::IsBlocking, Self::encode(SettingsKey::IsBlocking, is_blocking)?));
        }
        if let Some(websites) = &patch.websites {
            encoded.push((SettingsKey::Websites, Self::encode(SettingsKey::Websites, websites)?));
        }
        if let Some(schedule) = &patch.schedule {
            encoded.push((SettingsKey::Schedule, Self::encode(SettingsKey::Schedule, schedule)?));
        }

        {
            let mut db = self.lock_db();
            let tx = db.connection_mut().transaction()?;
            for (key, value) in &encoded {
                tx.execute(
                    "INSERT INTO settings (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key.as_str(), value],
                )?;
            }
            tx.commit()?;
        }

        let keys: Vec<SettingsKey> = encoded.into_iter().map(|(key, _)| key).collect();
        debug!("Stored settings keys {keys:?}");
        self.changes.notify(keys);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }
}
