//! Rule synchronization.
//!
//! [`RuleSynchronizer`] reconciles the engine's installed rules with the
//! rules the current settings call for. At most one pass runs at a time:
//! a trigger that arrives while a pass is in flight is dropped, not queued.
//! Every settings change produces a fresh trigger, so the next one picks up
//! the latest state.

use crate::compiler::RuleCompiler;
use crate::engine::{BlockingEngine, EngineError, RuleBatch};
use crate::models::{BlockingRule, PartialSettings, Settings, SettingsKey};
use crate::schedule::{should_block_now, Clock};
use crate::store::{SettingsStore, StoreError};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Reconciling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveReason {
    Disabled,
    OutsideSchedule,
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass was in flight; nothing happened.
    AlreadyReconciling,
    /// Rules cleared and none installed.
    Inactive { removed: usize, reason: InactiveReason },
    Installed { removed: usize, added: usize },
    /// An id collision aborted the pass and all rules were force-cleared.
    ConflictRecovery { removed: usize, fully_cleared: bool },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to read settings: {0}")]
    Store(#[from] StoreError),

    #[error("Blocking engine error: {0}")]
    Engine(#[from] EngineError),
}

/// What started a pass. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Install,
    Startup,
    SettingsChanged,
    ScheduleTick,
}

/// Current settings plus whether blocking is active right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(flatten)]
    pub settings: PartialSettings,
    pub should_block: bool,
}

fn lock_state(state: &Mutex<SyncState>) -> MutexGuard<'_, SyncState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Holds the synchronizer in `Reconciling`; dropping it returns to `Idle`.
struct ReconcileGuard<'a> {
    state: &'a Mutex<SyncState>,
}

impl<'a> ReconcileGuard<'a> {
    fn try_acquire(state: &'a Mutex<SyncState>) -> Option<Self> {
        let mut current = lock_state(state);
        match *current {
            SyncState::Reconciling => None,
            SyncState::Idle => {
                *current = SyncState::Reconciling;
                Some(Self { state })
            }
        }
    }
}

impl Drop for ReconcileGuard<'_> {
    fn drop(&mut self) {
        *lock_state(self.state) = SyncState::Idle;
    }
}

pub struct RuleSynchronizer {
    store: Arc<dyn SettingsStore>,
    engine: Arc<dyn BlockingEngine>,
    clock: Arc<dyn Clock>,
    compiler: RuleCompiler,
    state: Mutex<SyncState>,
}

impl RuleSynchronizer {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        engine: Arc<dyn BlockingEngine>,
        clock: Arc<dyn Clock>,
        compiler: RuleCompiler,
    ) -> Self {
        Self {
            store,
            engine,
            clock,
            compiler,
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn state(&self) -> SyncState {
        *lock_state(&self.state)
    }

    /// Run one reconciliation pass unless one is already running.
    ///
    /// Id conflicts are recovered here by clearing every installed rule and
    /// reported as [`PassOutcome::ConflictRecovery`]. Store failures and other
    /// engine failures are returned.
    pub async fn reconcile(&self) -> Result<PassOutcome, SyncError> {
        let Some(_guard) = ReconcileGuard::try_acquire(&self.state) else {
            debug!("Already updating rules, skipping");
            return Ok(PassOutcome::AlreadyReconciling);
        };

        match self.run_pass().await {
            Err(SyncError::Engine(err)) if err.is_conflict() => {
                warn!("Duplicate rule id ({err}), clearing all rules");
                match self.clear_installed().await {
                    Ok(removed) => {
                        info!("Force cleared {removed} rules after id conflict");
                        Ok(PassOutcome::ConflictRecovery {
                            removed,
                            fully_cleared: true,
                        })
                    }
                    Err(clear_err) => {
                        error!("Error force clearing rules: {clear_err}");
                        Ok(PassOutcome::ConflictRecovery {
                            removed: 0,
                            fully_cleared: false,
                        })
                    }
                }
            }
            Err(err) => {
                error!("Error updating blocking rules: {err}");
                Err(err)
            }
            Ok(outcome) => Ok(outcome),
        }
    }

    async fn run_pass(&self) -> Result<PassOutcome, SyncError> {
        let settings = self.store.get(SettingsKey::ALL).await?.into_settings();

        let removed = self.clear_installed().await?;

        if !settings.blocking_enabled {
            info!("Blocking disabled, no rules added");
            return Ok(PassOutcome::Inactive {
                removed,
                reason: InactiveReason::Disabled,
            });
        }

        if !should_block_now(settings.schedule.as_ref(), self.clock.now()) {
            info!("Outside schedule, no rules added");
            return Ok(PassOutcome::Inactive {
                removed,
                reason: InactiveReason::OutsideSchedule,
            });
        }

        let rules = self.compiler.compile(&settings.websites);
        let added = rules.len();
        if added > 0 {
            self.engine.apply_batch(RuleBatch::add(rules)).await?;
        }

        info!(
            "Installed {added} blocking rules for {} websites",
            settings.websites.len()
        );
        Ok(PassOutcome::Installed { removed, added })
    }

    /// Remove every installed rule in one batch. Returns how many were removed.
    async fn clear_installed(&self) -> Result<usize, EngineError> {
        let installed = self.engine.list_installed_rules().await?;
        if installed.is_empty() {
            return Ok(0);
        }

        let ids: Vec<u32> = installed.iter().map(|rule| rule.id).collect();
        let removed = ids.len();
        debug!("Clearing {removed} existing rules");
        self.engine.apply_batch(RuleBatch::remove(ids)).await?;
        Ok(removed)
    }

    /// Settings as stored, plus the schedule evaluated against the clock.
    pub async fn status(&self) -> Result<Status, StoreError> {
        let settings = self.store.get(SettingsKey::ALL).await?;
        let should_block = should_block_now(settings.schedule.as_ref(), self.clock.now());
        Ok(Status {
            settings,
            should_block,
        })
    }

    pub async fn installed_rules(&self) -> Result<Vec<BlockingRule>, EngineError> {
        self.engine.list_installed_rules().await
    }

    /// First activation: seed default settings, then reconcile.
    ///
    /// The pass runs even if seeding fails, against whatever is stored.
    pub async fn on_installed(&self) -> Result<PassOutcome, SyncError> {
        info!("Seeding default settings");
        if let Err(err) = self.store.set(Settings::install_defaults().into()).await {
            error!("Failed to seed default settings: {err}");
        }
        self.reconcile().await
    }

    /// Startup sequence: install hook on first run, otherwise one pass, then
    /// start listening for settings changes.
    pub async fn start(self: &Arc<Self>, first_run: bool) -> JoinHandle<()> {
        let result = if first_run {
            self.on_installed().await
        } else {
            self.reconcile().await
        };
        let trigger = if first_run { Trigger::Install } else { Trigger::Startup };
        log_outcome(trigger, &result);

        self.spawn_change_listener()
    }

    /// Spawn a pass in its own task. Passive triggers only log the result.
    pub fn trigger(self: &Arc<Self>, trigger: Trigger) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            let result = sync.reconcile().await;
            log_outcome(trigger, &result);
        })
    }

    /// Reconcile on every settings change.
    ///
    /// Each notification spawns its own pass so notifications that arrive
    /// mid-pass are dropped by the state guard rather than buffered here.
    pub fn spawn_change_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.store.subscribe();
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        debug!("Settings changed: {:?}", change.keys);
                        sync.trigger(Trigger::SettingsChanged);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {skipped} settings notifications");
                        sync.trigger(Trigger::SettingsChanged);
                    }
                    Err(RecvError::Closed) => {
                        debug!("Settings store closed, change listener exiting");
                        break;
                    }
                }
            }
        })
    }

    /// Reconcile every `period` so schedule boundaries take effect without a
    /// settings change.
    pub fn spawn_schedule_ticker(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; startup already reconciled.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sync.trigger(Trigger::ScheduleTick);
            }
        })
    }
}

fn log_outcome(trigger: Trigger, result: &Result<PassOutcome, SyncError>) {
    match result {
        Ok(PassOutcome::AlreadyReconciling) => {
            debug!("{trigger:?}: pass already in flight, trigger dropped");
        }
        Ok(outcome) => debug!("{trigger:?}: {outcome:?}"),
        Err(err) => error!("{trigger:?}: reconciliation failed: {err}"),
    }
}
