use crate::models::{AssetKind, MissingReference};
use camino::Utf8PathBuf;
use serde::Serialize;
use std::fmt;

/// Phase of a relink run.
///
/// Phases only move forward:
/// `Idle → BuildingIndex → Searching → {Done | Cancelled | Failed}`.
/// A finished run hands control back to `Idle` before another may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RelinkPhase {
    Idle,
    BuildingIndex,
    Searching,
    Done,
    Cancelled,
    Failed,
}

impl RelinkPhase {
    /// A run is in progress (index build or search).
    pub fn is_active(self) -> bool {
        matches!(self, RelinkPhase::BuildingIndex | RelinkPhase::Searching)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RelinkPhase::Done | RelinkPhase::Cancelled | RelinkPhase::Failed
        )
    }

    /// Check whether moving from `self` to `next` respects the state machine.
    pub fn can_advance_to(self, next: RelinkPhase) -> bool {
        use RelinkPhase::*;

        match (self, next) {
            (Idle, BuildingIndex) => true,
            (BuildingIndex, Searching | Cancelled | Failed) => true,
            (Searching, Done | Cancelled | Failed) => true,
            // Terminal states re-enter Idle, either directly or by starting a new run.
            (Done | Cancelled | Failed, Idle | BuildingIndex) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RelinkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RelinkPhase::Idle => "idle",
            RelinkPhase::BuildingIndex => "building index",
            RelinkPhase::Searching => "searching",
            RelinkPhase::Done => "done",
            RelinkPhase::Cancelled => "cancelled",
            RelinkPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// What happened to one worklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ItemStatus {
    /// Rebound to the new path and verified.
    Relinked,
    /// The reference has no usable file name, or nothing in the index matched it.
    NotFound,
    /// A candidate was found but the bind was rejected.
    Unbound { reason: String },
}

/// Result of processing a single worklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub reference: MissingReference,
    pub candidate: Option<Utf8PathBuf>,
    pub status: ItemStatus,
}

impl ItemResult {
    pub fn is_relinked(&self) -> bool {
        self.status == ItemStatus::Relinked
    }

    /// One-line description for logs and status events.
    pub fn message(&self) -> String {
        match (&self.status, &self.candidate) {
            (ItemStatus::Relinked, Some(path)) => format!("Relinked to {}", path),
            (ItemStatus::Relinked, None) => "Relinked".to_string(),
            (ItemStatus::NotFound, _) => match self.reference.basename() {
                Some(name) => format!("File not found: {}", name),
                None => "No file name to search for".to_string(),
            },
            (ItemStatus::Unbound { reason }, _) => format!("Not relinked: {}", reason),
        }
    }
}

/// Terminal summary of a relink run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelinkOutcome {
    /// One of `Done`, `Cancelled` or `Failed`.
    pub phase: RelinkPhase,
    pub relinked: usize,
    pub processed: usize,
    pub total: usize,
    pub results: Vec<ItemResult>,

    /// Missing references found by the rescan after a completed run.
    pub remaining: Vec<MissingReference>,

    /// Set when the run failed.
    pub error: Option<String>,
}

impl RelinkOutcome {
    /// Status line shown once the run has ended.
    pub fn summary(&self) -> String {
        match self.phase {
            RelinkPhase::Done => format!("Completed: Relinked {} assets", self.relinked),
            RelinkPhase::Cancelled => format!("Stopped: Relinked {} assets", self.relinked),
            RelinkPhase::Failed => format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("relink failed")
            ),
            other => format!("Relink {}", other),
        }
    }

    /// Count results per status as `(relinked, not_found, unbound)`.
    pub fn tally(&self) -> (usize, usize, usize) {
        self.results
            .iter()
            .fold((0, 0, 0), |(ok, missing, unbound), result| match result.status {
                ItemStatus::Relinked => (ok + 1, missing, unbound),
                ItemStatus::NotFound => (ok, missing + 1, unbound),
                ItemStatus::Unbound { .. } => (ok, missing, unbound + 1),
            })
    }

    /// Results for one asset kind.
    pub fn results_for(&self, kind: AssetKind) -> impl Iterator<Item = &ItemResult> {
        self.results
            .iter()
            .filter(move |result| result.reference.kind == kind)
    }
}

/// Live progress of the relink engine as seen by the foreground.
///
/// This is what a UI or CLI renders after every tick. Never mutate it
/// directly; [`StateManager`](crate::state::StateManager) owns it.
#[derive(Clone, Debug, PartialEq)]
pub struct RelinkStatus {
    pub phase: RelinkPhase,

    /// `cursor / total`, in `[0, 1]`.
    pub progress: f64,
    pub status_text: String,
    pub relinked_count: usize,
    pub cursor: usize,
    pub total: usize,
    pub current_item: Option<String>,

    /// Summary of the most recent finished run.
    pub last_outcome: Option<RelinkOutcome>,
}

impl Default for RelinkStatus {
    fn default() -> Self {
        Self {
            phase: RelinkPhase::Idle,
            progress: 0.0,
            status_text: "Ready".to_string(),
            relinked_count: 0,
            cursor: 0,
            total: 0,
            current_item: None,
            last_outcome: None,
        }
    }
}

impl RelinkStatus {
    /// Whole-number percentage for progress bars.
    pub fn percent(&self) -> u32 {
        (self.progress.clamp(0.0, 1.0) * 100.0).floor() as u32
    }

    /// Status text with the percentage appended while a run is active.
    pub fn display_text(&self) -> String {
        if self.phase.is_active() {
            format!("{} - {}%", self.status_text, self.percent())
        } else {
            self.status_text.clone()
        }
    }

    /// Clear per-run fields, keeping the last outcome.
    pub fn reset_run(&mut self) {
        self.phase = RelinkPhase::Idle;
        self.progress = 0.0;
        self.relinked_count = 0;
        self.cursor = 0;
        self.total = 0;
        self.current_item = None;
    }
}
