// State management module
//
// This module provides the StateManager which wraps RelinkStatus with thread-safe access
// using Arc<RwLock<T>> and emits change events for progress displays.

use crate::models::{AssetKind, ItemResult, RelinkOutcome, RelinkPhase, RelinkStatus};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when the relink status is modified
///
/// These events let a UI or CLI follow a run without polling the status.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A run has been accepted
    RunStarted { total: usize },

    /// The run moved to another phase
    PhaseChanged { from: RelinkPhase, to: RelinkPhase },

    /// The cursor advanced
    ProgressUpdated {
        cursor: usize,
        total: usize,
        progress: f64,
    },

    /// The status line changed
    StatusChanged { text: String },

    /// A worklist item has been processed
    ItemProcessed {
        identity: String,
        kind: AssetKind,
        relinked: bool,
        message: String,
    },

    /// The run reached a terminal phase
    RunFinished {
        phase: RelinkPhase,
        relinked: usize,
        processed: usize,
        total: usize,
    },

    /// Status has been reset to idle
    StateReset,
}

/// Thread-safe progress sink with event emission
///
/// This is the central state component that:
/// - Provides thread-safe access to [`RelinkStatus`] via `Arc<RwLock<T>>`
/// - Detects status changes and emits [`StateChange`] events
/// - Rejects phase transitions that would move a run backwards
/// - Supports subscribing to changes via tokio broadcast channels
///
/// # Usage
///
/// Always use `StateManager` instead of touching [`RelinkStatus`] directly:
/// - [`read()`](Self::read) for reading individual fields
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to changes
///
/// The [`RelinkCoordinator`](crate::coordinator::RelinkCoordinator) is the only
/// writer during a run.
pub struct StateManager {
    status: Arc<RwLock<RelinkStatus>>,

    /// Multiple subscribers can listen for changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with an idle status
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            status: Arc::new(RwLock::new(RelinkStatus::default())),
            state_tx,
        }
    }

    /// Clone of the current status, safe to use without holding locks.
    pub fn snapshot(&self) -> RelinkStatus {
        self.status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Execute a function with read access to the status
    ///
    /// # Example
    /// ```ignore
    /// let percent = state_manager.read(|status| status.percent());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RelinkStatus) -> R,
    {
        let status = self.status.read().unwrap_or_else(PoisonError::into_inner);
        f(&status)
    }

    /// Update the status and emit change events
    ///
    /// Captures the old status, applies `update_fn`, then emits one event per
    /// detected change. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut RelinkStatus),
    {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        let old_status = status.clone();

        update_fn(&mut status);

        let changes = Self::detect_changes(&old_status, &status);
        for change in &changes {
            // Nobody listening is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, change: StateChange, changes: &mut Vec<StateChange>) {
        let _ = self.state_tx.send(change.clone());
        changes.push(change);
    }

    fn detect_changes(old: &RelinkStatus, new: &RelinkStatus) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.phase != new.phase {
            changes.push(StateChange::PhaseChanged {
                from: old.phase,
                to: new.phase,
            });
        }

        if old.cursor != new.cursor || old.total != new.total {
            changes.push(StateChange::ProgressUpdated {
                cursor: new.cursor,
                total: new.total,
                progress: new.progress,
            });
        }

        if old.status_text != new.status_text {
            changes.push(StateChange::StatusChanged {
                text: new.status_text.clone(),
            });
        }

        changes
    }

    // Convenience methods used by the coordinator

    /// Reset per-run fields and enter `BuildingIndex`.
    pub fn begin_run(&self, total: usize) -> Vec<StateChange> {
        let mut changes = Vec::new();
        self.emit(StateChange::RunStarted { total }, &mut changes);

        changes.extend(self.update(|status| {
            status.reset_run();
            status.phase = RelinkPhase::BuildingIndex;
            status.total = total;
            status.status_text = "Building file index...".to_string();
        }));

        changes
    }

    /// Move to `phase`, ignoring transitions that would go backwards.
    pub fn set_phase(&self, phase: RelinkPhase, text: impl Into<String>) -> Vec<StateChange> {
        let current = self.read(|status| status.phase);
        if current != phase && !current.can_advance_to(phase) {
            tracing::warn!("Ignoring phase change {} -> {}", current, phase);
            return Vec::new();
        }

        let text = text.into();
        self.update(|status| {
            status.phase = phase;
            status.status_text = text;
        })
    }

    /// Show which item is about to be processed.
    pub fn set_current_item(&self, identity: &str) -> Vec<StateChange> {
        self.update(|status| {
            status.current_item = Some(identity.to_string());
            status.status_text = format!("Searching for: {}", identity);
        })
    }

    /// Record a processed item and advance the cursor.
    pub fn record_item(&self, result: &ItemResult, cursor: usize) -> Vec<StateChange> {
        let mut changes = self.update(|status| {
            status.cursor = cursor;
            status.progress = if status.total == 0 {
                1.0
            } else {
                cursor as f64 / status.total as f64
            };
            if result.is_relinked() {
                status.relinked_count += 1;
            }
        });

        self.emit(
            StateChange::ItemProcessed {
                identity: result.reference.identity.clone(),
                kind: result.reference.kind,
                relinked: result.is_relinked(),
                message: result.message(),
            },
            &mut changes,
        );

        changes
    }

    /// Enter the outcome's terminal phase and keep the outcome for display.
    pub fn finish_run(&self, outcome: &RelinkOutcome) -> Vec<StateChange> {
        let mut changes = self.update(|status| {
            status.phase = outcome.phase;
            status.status_text = outcome.summary();
            status.current_item = None;
            status.relinked_count = outcome.relinked;
            status.last_outcome = Some(outcome.clone());
        });

        self.emit(
            StateChange::RunFinished {
                phase: outcome.phase,
                relinked: outcome.relinked,
                processed: outcome.processed,
                total: outcome.total,
            },
            &mut changes,
        );

        changes
    }

    /// Return to `Idle`, keeping the last outcome.
    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(|status| {
            status.reset_run();
            status.status_text = "Ready".to_string();
        });

        self.emit(StateChange::StateReset, &mut changes);
        changes
    }

    /// Shared handle to the status for readers on other threads.
    pub fn status_arc(&self) -> Arc<RwLock<RelinkStatus>> {
        Arc::clone(&self.status)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            status: Arc::clone(&self.status),
            state_tx: self.state_tx.clone(),
        }
    }
}
