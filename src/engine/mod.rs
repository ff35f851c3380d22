//! The blocking engine: whatever actually intercepts navigations.
//!
//! The synchronizer only talks to the [`BlockingEngine`] trait. [`MemoryEngine`]
//! keeps the installed rules in-process and enforces the same batch semantics
//! as the browser's dynamic rule set.

use crate::constants::MAX_DYNAMIC_RULES;
use crate::models::BlockingRule;
use async_trait::async_trait;
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Rule with id {id} does not have a unique ID.")]
    DuplicateId { id: u32 },

    #[error("Rule count {requested} exceeds the limit of {limit} dynamic rules")]
    QuotaExceeded { requested: usize, limit: usize },

    #[error("Blocking engine unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    /// Identifier collision on install, recoverable by a full clear.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::DuplicateId { .. })
    }
}

/// One atomic engine update: `remove` is applied before `add`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleBatch {
    pub remove: Vec<u32>,
    pub add: Vec<BlockingRule>,
}

impl RuleBatch {
    pub fn remove(ids: Vec<u32>) -> Self {
        Self { remove: ids, add: Vec::new() }
    }

    pub fn add(rules: Vec<BlockingRule>) -> Self {
        Self { remove: Vec::new(), add: rules }
    }
}

#[async_trait]
pub trait BlockingEngine: Send + Sync {
    async fn list_installed_rules(&self) -> Result<Vec<BlockingRule>, EngineError>;

    /// Fails with [`EngineError::DuplicateId`] if `add` carries an id that is
    /// already installed and not removed by the same batch.
    async fn apply_batch(&self, batch: RuleBatch) -> Result<(), EngineError>;
}

/// In-process rule set, ordered by id.
#[derive(Debug)]
pub struct MemoryEngine {
    rules: Mutex<BTreeMap<u32, BlockingRule>>,
    max_rules: usize,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(MAX_DYNAMIC_RULES)
    }
}

impl MemoryEngine {
    pub fn new(max_rules: usize) -> Self {
        Self {
            rules: Mutex::new(BTreeMap::new()),
            max_rules,
        }
    }

    fn lock_rules(&self) -> MutexGuard<'_, BTreeMap<u32, BlockingRule>> {
        self.rules.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn installed_count(&self) -> usize {
        self.lock_rules().len()
    }

    fn validate(&self, rules: &BTreeMap<u32, BlockingRule>, batch: &RuleBatch) -> Result<(), EngineError> {
        let removed: HashSet<u32> = batch.remove.iter().copied().collect();
        let mut adding = HashSet::with_capacity(batch.add.len());

        for rule in &batch.add {
            let still_installed = rules.contains_key(&rule.id) && !removed.contains(&rule.id);
            if still_installed || !adding.insert(rule.id) {
                return Err(EngineError::DuplicateId { id: rule.id });
            }
        }

        let surviving = rules.keys().filter(|id| !removed.contains(*id)).count();
        let requested = surviving + batch.add.len();
        if requested > self.max_rules {
            return Err(EngineError::QuotaExceeded {
                requested,
                limit: self.max_rules,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BlockingEngine for MemoryEngine {
    async fn list_installed_rules(&self) -> Result<Vec<BlockingRule>, EngineError> {
        Ok(self.lock_rules().values().cloned().collect())
    }

    async fn apply_batch(&self, batch: RuleBatch) -> Result<(), EngineError> {
        let mut rules = self.lock_rules();
        self.validate(&rules, &batch)?;

        for id in &batch.remove {
            rules.remove(id);
        }
        let added = batch.add.len();
        for rule in batch.add {
            rules.insert(rule.id, rule);
        }

        debug!(
            "Applied rule batch: -{} +{} ({} installed)",
            batch.remove.len(),
            added,
            rules.len()
        );
        Ok(())
    }
}
