//! Shared test utilities for sitelock.
//!
//! This module provides common setup functions and scripted collaborators
//! used across test modules.

#![cfg(test)]

use crate::compiler::RuleCompiler;
use crate::db::{migrations, Database};
use crate::engine::{BlockingEngine, EngineError, MemoryEngine, RuleBatch};
use crate::models::{BlockingRule, PartialSettings, SettingsKey};
use crate::store::{ChangeNotifier, MemoryStore, SettingsChange, SettingsStore, StoreError};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::{tempdir, TempDir};
use tokio::sync::{broadcast, Semaphore};

/// Create a temporary test database with migrations applied.
///
/// Returns a tuple of (Database, TempDir). The TempDir must be kept alive
/// for the duration of the test to prevent the database file from being deleted.
pub fn setup_test_db() -> (Database, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let db = Database::open(&db_path).expect("Failed to open test database");
    migrations::run(db.connection()).expect("Failed to run migrations on test DB");
    (db, dir)
}

/// Local time on the given weekday of the week starting Monday 2024-01-01.
pub fn at(day: &str, time: &str) -> NaiveDateTime {
    let offset = match day {
        "Monday" => 0,
        "Tuesday" => 1,
        "Wednesday" => 2,
        "Thursday" => 3,
        "Friday" => 4,
        "Saturday" => 5,
        "Sunday" => 6,
        other => panic!("unknown weekday {other}"),
    };
    let date = NaiveDate::from_ymd_opt(2024, 1, 1 + offset).expect("valid date");
    let time = NaiveTime::parse_from_str(time, "%H:%M").expect("valid HH:MM");
    date.and_time(time)
}

/// Let spawned tasks on the current-thread runtime run to their next
/// suspension point.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// A [`MemoryEngine`] with scripted failures, batch recording and an
/// optional gate that holds every `list_installed_rules` call until released.
#[derive(Default)]
pub struct ScriptedEngine {
    inner: MemoryEngine,
    gate: Option<Semaphore>,
    install_failures: Mutex<VecDeque<EngineError>>,
    list_failure: Mutex<Option<(usize, EngineError)>>,
    ignore_remove: AtomicBool,
    list_calls: AtomicUsize,
    batches: Mutex<Vec<RuleBatch>>,
}

impl ScriptedEngine {
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Let one gated call through.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Fail the next batch that adds rules.
    pub fn fail_next_install(&self, err: EngineError) {
        self.install_failures.lock().unwrap().push_back(err);
    }

    /// Fail the `nth` (1-based) call to `list_installed_rules`.
    pub fn fail_list_call(&self, nth: usize, err: EngineError) {
        *self.list_failure.lock().unwrap() = Some((nth, err));
    }

    /// Report success for the next remove-only batch without removing anything.
    pub fn ignore_next_remove(&self) {
        self.ignore_remove.store(true, Ordering::SeqCst);
    }

    /// Install rules for `sites` directly, bypassing recording and scripts.
    pub async fn preload(&self, sites: &[&str]) {
        let sites: Vec<String> = sites.iter().map(|s| (*s).to_string()).collect();
        let rules = RuleCompiler::default().compile(&sites);
        self.inner.apply_batch(RuleBatch::add(rules)).await.unwrap();
    }

    pub async fn installed(&self) -> Vec<BlockingRule> {
        self.inner.list_installed_rules().await.unwrap()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<RuleBatch> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockingEngine for ScriptedEngine {
    async fn list_installed_rules(&self) -> Result<Vec<BlockingRule>, EngineError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let scripted = {
            let mut failure = self.list_failure.lock().unwrap();
            match failure.take() {
                Some((nth, err)) if nth == call => Some(err),
                other => {
                    *failure = other;
                    None
                }
            }
        };
        if let Some(err) = scripted {
            return Err(err);
        }

        self.inner.list_installed_rules().await
    }

    async fn apply_batch(&self, batch: RuleBatch) -> Result<(), EngineError> {
        self.batches.lock().unwrap().push(batch.clone());

        if batch.add.is_empty() && self.ignore_remove.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if !batch.add.is_empty() {
            let failure = self.install_failures.lock().unwrap().pop_front();
            if let Some(err) = failure {
                return Err(err);
            }
        }

        self.inner.apply_batch(batch).await
    }
}

/// A [`MemoryStore`] whose reads and writes can be switched to fail, and
/// whose change channel can be closed.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    changes: Mutex<Option<ChangeNotifier>>,
}

impl FlakyStore {
    pub fn new(initial: PartialSettings) -> Self {
        Self {
            inner: MemoryStore::new(initial),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            changes: Mutex::new(Some(ChangeNotifier::default())),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Drop the only sender; subscribers see the channel close.
    pub fn close_notifications(&self) {
        self.changes.lock().unwrap().take();
    }
}

#[async_trait]
impl SettingsStore for FlakyStore {
    async fn get(&self, keys: &[SettingsKey]) -> Result<PartialSettings, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("storage read failed".into()));
        }
        self.inner.get(keys).await
    }

    async fn set(&self, patch: PartialSettings) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("storage write failed".into()));
        }
        let keys = patch.keys();
        self.inner.set(patch).await?;
        if let Some(changes) = self.changes.lock().unwrap().as_ref() {
            changes.notify(keys);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        match self.changes.lock().unwrap().as_ref() {
            Some(changes) => changes.subscribe(),
            None => broadcast::channel(1).1,
        }
    }
}
