//! Cooperative, tick-driven relink loop.
//!
//! The host owns the cadence. It calls [`RelinkCoordinator::start`] once, then
//! [`RelinkCoordinator::on_tick`] at a fixed interval until a tick reports
//! [`TickOutcome::Finished`]. The file index is built on the tokio runtime and
//! polled without blocking; once it is ready, every tick processes exactly one
//! worklist item against the host's graph.
//!
//! Cancellation goes through a [`CancelHandle`], which may be cloned into a
//! signal handler or another thread. The flag is observed at the top of the
//! next tick.

use crate::graph::AssetGraph;
use crate::metrics::Metrics;
use crate::models::{ItemResult, ItemStatus, MissingReference, RelinkOutcome, RelinkPhase, RelinkStatus};
use crate::services::binder::{BindOutcome, binder_for};
use crate::services::file_index::{BuildPoll, FileIndex, IndexBuild, IndexBuildError, IndexOptions};
use crate::services::scanner::Rescan;
use crate::state::StateManager;
use camino::Utf8PathBuf;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Errors that stop a run from starting, or end it early.
#[derive(Error, Debug)]
pub enum RelinkError {
    /// Nothing to do
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The search directory is missing or unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Index build failed: {0}")]
    IndexBuild(#[from] IndexBuildError),
}

/// Answer to [`RelinkCoordinator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartResponse {
    /// A new run is building its index.
    Started { total: usize },
    /// A run was already active; it has been asked to stop instead.
    CancelRequested,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No run is active.
    Idle,
    /// The index is still being built.
    BuildingIndex,
    /// The index finished; items are processed from the next tick on.
    IndexReady { files: usize },
    /// One item was processed.
    Processed { cursor: usize, relinked: usize },
    /// The run ended on this tick.
    Finished(RelinkOutcome),
}

/// Cloneable cancel flag, backed by a watch channel.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask the active run to stop at the next tick.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn clear(&self) {
        self.tx.send_replace(false);
    }
}

enum Stage {
    Building(IndexBuild),
    Searching(FileIndex),
}

/// Live state of the one active run.
struct RelinkRun {
    worklist: Vec<MissingReference>,
    root: Utf8PathBuf,
    cursor: usize,
    relinked: usize,
    results: Vec<ItemResult>,
    stage: Stage,
}

impl RelinkRun {
    fn phase(&self) -> RelinkPhase {
        match self.stage {
            Stage::Building(_) => RelinkPhase::BuildingIndex,
            Stage::Searching(_) => RelinkPhase::Searching,
        }
    }
}

/// Drives relink runs one tick at a time.
///
/// Holding the run as `Option<RelinkRun>` is what keeps it to one active run:
/// a second [`start`](Self::start) while `Some` turns into a cancel request.
pub struct RelinkCoordinator {
    runtime: Handle,
    state: StateManager,
    metrics: Arc<Metrics>,
    options: IndexOptions,
    rescan: Box<dyn Rescan>,
    cancel: CancelHandle,
    run: Option<RelinkRun>,
}

impl RelinkCoordinator {
    pub fn new(
        runtime: Handle,
        state: StateManager,
        metrics: Arc<Metrics>,
        options: IndexOptions,
        rescan: Box<dyn Rescan>,
    ) -> Self {
        Self {
            runtime,
            state,
            metrics,
            options,
            rescan,
            cancel: CancelHandle::new(),
            run: None,
        }
    }

    /// Start a run over `worklist`, searching under `root`.
    ///
    /// While a run is active this requests its cancellation instead and
    /// returns [`StartResponse::CancelRequested`].
    pub fn start(&mut self, worklist: Vec<MissingReference>, root: &str) -> Result<StartResponse, RelinkError> {
        if self.run.is_some() {
            self.request_cancel();
            return Ok(StartResponse::CancelRequested);
        }

        if worklist.is_empty() {
            return Err(RelinkError::InvalidRequest("No missing assets to relink".to_string()));
        }

        let root = validate_root(root)?;
        let total = worklist.len();

        self.cancel.clear();
        self.state.begin_run(total);
        self.metrics.record_run_started();

        tracing::info!("Starting relink of {} assets under {}", total, root);
        let build = IndexBuild::spawn(&self.runtime, root.clone(), self.options.clone());

        self.run = Some(RelinkRun {
            worklist,
            root,
            cursor: 0,
            relinked: 0,
            results: Vec::with_capacity(total),
            stage: Stage::Building(build),
        });

        Ok(StartResponse::Started { total })
    }

    /// Ask the active run to stop. Harmless when idle.
    pub fn request_cancel(&self) {
        if self.run.is_some() {
            tracing::info!("Relink cancellation requested");
        }
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Perform one unit of work.
    pub fn on_tick(&mut self, graph: &mut dyn AssetGraph) -> TickOutcome {
        self.metrics.record_tick();

        let Some(mut run) = self.run.take() else {
            return TickOutcome::Idle;
        };

        if self.cancel.is_cancelled() {
            return TickOutcome::Finished(self.finish(run, RelinkPhase::Cancelled, None, graph));
        }

        let outcome = match &mut run.stage {
            Stage::Building(build) => match build.poll() {
                BuildPoll::Pending => TickOutcome::BuildingIndex,
                BuildPoll::Ready(Ok(index)) => {
                    let files = index.len();
                    self.metrics.record_index_build(files, build.elapsed());
                    tracing::info!(
                        "Indexed {} files under {} in {:.2}s",
                        files,
                        run.root,
                        build.elapsed().as_secs_f64()
                    );

                    run.stage = Stage::Searching(index);
                    self.state.set_phase(RelinkPhase::Searching, "Searching for assets...");
                    TickOutcome::IndexReady { files }
                }
                BuildPoll::Ready(Err(e)) => {
                    let error = RelinkError::from(e);
                    tracing::error!("{}", error);
                    return TickOutcome::Finished(self.finish(run, RelinkPhase::Failed, Some(error.to_string()), graph));
                }
            },
            Stage::Searching(index) => {
                let reference = run.worklist[run.cursor].clone();
                self.state.set_current_item(&reference.identity);

                let result = panic::catch_unwind(AssertUnwindSafe(|| process_item(index, &mut *graph, &reference)))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        tracing::error!("Error processing {} '{}': {}", reference.kind, reference.identity, message);
                        self.metrics.record_item_panic();
                        ItemResult {
                            reference: reference.clone(),
                            candidate: None,
                            status: ItemStatus::Unbound {
                                reason: format!("processing failed: {}", message),
                            },
                        }
                    });

                run.cursor += 1;
                match result.status {
                    ItemStatus::Relinked => {
                        run.relinked += 1;
                        self.metrics.record_relinked();
                    }
                    ItemStatus::NotFound => self.metrics.record_not_found(),
                    ItemStatus::Unbound { .. } => self.metrics.record_unbound(),
                }
                tracing::debug!("[{}/{}] {}: {}", run.cursor, run.worklist.len(), reference.identity, result.message());

                self.state.record_item(&result, run.cursor);
                run.results.push(result);

                if run.cursor == run.worklist.len() {
                    return TickOutcome::Finished(self.finish(run, RelinkPhase::Done, None, graph));
                }
                TickOutcome::Processed {
                    cursor: run.cursor,
                    relinked: run.relinked,
                }
            }
        };

        self.run = Some(run);
        outcome
    }

    /// Tick at `interval` until the active run finishes.
    ///
    /// Returns `None` when no run is active.
    pub async fn run_to_completion(&mut self, graph: &mut dyn AssetGraph, interval: Duration) -> Option<RelinkOutcome> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while self.run.is_some() {
            ticker.tick().await;
            if let TickOutcome::Finished(outcome) = self.on_tick(graph) {
                return Some(outcome);
            }
        }
        None
    }

    pub fn status(&self) -> RelinkStatus {
        self.state.snapshot()
    }

    /// Phase of the active run, or `Idle`.
    pub fn phase(&self) -> RelinkPhase {
        self.run.as_ref().map_or(RelinkPhase::Idle, RelinkRun::phase)
    }

    pub fn is_idle(&self) -> bool {
        self.run.is_none()
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    fn finish(
        &mut self,
        run: RelinkRun,
        phase: RelinkPhase,
        error: Option<String>,
        graph: &mut dyn AssetGraph,
    ) -> RelinkOutcome {
        let RelinkRun {
            worklist,
            cursor,
            relinked,
            results,
            stage,
            ..
        } = run;

        if let Stage::Building(build) = stage {
            // Outstanding scan results are discarded
            build.abandon();
        }

        let remaining = if phase == RelinkPhase::Done {
            self.rescan.rescan(graph)
        } else {
            Vec::new()
        };

        if phase == RelinkPhase::Cancelled {
            self.metrics.record_run_cancelled();
        }
        self.cancel.clear();

        let outcome = RelinkOutcome {
            phase,
            relinked,
            processed: cursor,
            total: worklist.len(),
            results,
            remaining,
            error,
        };

        tracing::info!("{} ({} of {} processed)", outcome.summary(), outcome.processed, outcome.total);
        self.state.finish_run(&outcome);
        outcome
    }
}

impl Drop for RelinkCoordinator {
    fn drop(&mut self) {
        if let Some(RelinkRun {
            stage: Stage::Building(build),
            ..
        }) = self.run.take()
        {
            build.abandon();
        }
    }
}

fn validate_root(root: &str) -> Result<Utf8PathBuf, RelinkError> {
    let root = root.trim();
    if root.is_empty() {
        return Err(RelinkError::Configuration("No search directory specified".to_string()));
    }

    let path = Utf8PathBuf::from(root);
    let metadata = std::fs::metadata(&path)
        .map_err(|e| RelinkError::Configuration(format!("Search directory not accessible: {} ({})", path, e)))?;
    if !metadata.is_dir() {
        return Err(RelinkError::Configuration(format!("Search path is not a directory: {}", path)));
    }
    std::fs::read_dir(&path)
        .map_err(|e| RelinkError::Configuration(format!("Search directory unreadable: {} ({})", path, e)))?;

    Ok(path)
}

fn process_item(index: &FileIndex, graph: &mut dyn AssetGraph, reference: &MissingReference) -> ItemResult {
    let not_found = || ItemResult {
        reference: reference.clone(),
        candidate: None,
        status: ItemStatus::NotFound,
    };

    let Some(name) = reference.basename() else {
        return not_found();
    };
    let Some(candidate) = index.lookup(name) else {
        return not_found();
    };

    let status = match binder_for(reference.kind).bind(graph, &reference.identity, candidate) {
        BindOutcome::Bound => ItemStatus::Relinked,
        BindOutcome::Unbound(reason) => ItemStatus::Unbound {
            reason: reason.to_string(),
        },
    };

    ItemResult {
        reference: reference.clone(),
        candidate: Some(candidate.to_path_buf()),
        status,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AssetEntry, GraphError, Manifest, ManifestGraph, MockAssetGraph};
    use crate::models::AssetKind;
    use tempfile::TempDir;

    fn coordinator() -> RelinkCoordinator {
        RelinkCoordinator::new(
            Handle::current(),
            StateManager::new(),
            Arc::new(Metrics::new()),
            IndexOptions::default(),
            Box::new(|_: &dyn AssetGraph| Vec::<MissingReference>::new()),
        )
    }

    fn one_item() -> Vec<MissingReference> {
        vec![MissingReference::new("tex1", AssetKind::Image, Some("old/tex1.png"))]
    }

    #[tokio::test]
    async fn test_empty_worklist_rejected() {
        let mut coordinator = coordinator();
        let result = coordinator.start(Vec::new(), "/tmp");
        assert!(matches!(result, Err(RelinkError::InvalidRequest(_))));
        assert!(coordinator.is_idle());
    }

    #[tokio::test]
    async fn test_bad_root_rejected() {
        let mut coordinator = coordinator();

        assert!(matches!(coordinator.start(one_item(), "   "), Err(RelinkError::Configuration(_))));
        assert!(matches!(
            coordinator.start(one_item(), "/definitely/not/here"),
            Err(RelinkError::Configuration(_))
        ));

        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            coordinator.start(one_item(), file.to_str().unwrap()),
            Err(RelinkError::Configuration(_))
        ));
        assert_eq!(coordinator.status().phase, RelinkPhase::Idle);
    }

    #[tokio::test]
    async fn test_tick_when_idle() {
        let mut coordinator = coordinator();
        let mut graph = MockAssetGraph::new();
        assert_eq!(coordinator.on_tick(&mut graph), TickOutcome::Idle);
    }

    #[tokio::test]
    async fn test_second_start_cancels() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_str().unwrap().to_string();
        let mut coordinator = coordinator();
        let mut graph = MockAssetGraph::new();

        assert_eq!(coordinator.start(one_item(), &root).unwrap(), StartResponse::Started { total: 1 });
        assert_eq!(coordinator.start(one_item(), &root).unwrap(), StartResponse::CancelRequested);

        match coordinator.on_tick(&mut graph) {
            TickOutcome::Finished(outcome) => {
                assert_eq!(outcome.phase, RelinkPhase::Cancelled);
                assert_eq!(outcome.processed, 0);
                assert_eq!(outcome.summary(), "Stopped: Relinked 0 assets");
            }
            other => panic!("expected a finished run, got {:?}", other),
        }
        assert!(coordinator.is_idle());
        assert!(!coordinator.cancel_handle().is_cancelled());
    }

    /// Delegates to a manifest graph but panics when asked about `a`.
    struct ExplodingGraph(ManifestGraph);

    impl AssetGraph for ExplodingGraph {
        fn entries(&self, kind: AssetKind) -> Vec<AssetEntry> {
            self.0.entries(kind)
        }

        fn contains(&self, kind: AssetKind, identity: &str) -> bool {
            if identity == "a" {
                panic!("graph exploded");
            }
            self.0.contains(kind, identity)
        }

        fn path(&self, kind: AssetKind, identity: &str) -> Option<String> {
            self.0.path(kind, identity)
        }

        fn set_path(&mut self, kind: AssetKind, identity: &str, path: &str) -> Result<(), GraphError> {
            self.0.set_path(kind, identity, path)
        }

        fn reload(&mut self, kind: AssetKind, identity: &str) -> Result<(), GraphError> {
            self.0.reload(kind, identity)
        }

        fn has_data(&self, kind: AssetKind, identity: &str) -> bool {
            self.0.has_data(kind, identity)
        }

        fn mark_dirty(&mut self, kind: AssetKind, identity: &str) -> Result<(), GraphError> {
            self.0.mark_dirty(kind, identity)
        }

        fn remove(&mut self, kind: AssetKind, identity: &str) -> Result<(), GraphError> {
            self.0.remove(kind, identity)
        }

        fn resolve_path(&self, path: &str) -> Utf8PathBuf {
            self.0.resolve_path(path)
        }

        fn has_modifier(&self, kind: AssetKind, container: &str, child: &str) -> bool {
            self.0.has_modifier(kind, container, child)
        }

        fn set_modifier_path(
            &mut self,
            kind: AssetKind,
            container: &str,
            child: &str,
            path: &str,
        ) -> Result<(), GraphError> {
            self.0.set_modifier_path(kind, container, child, path)
        }

        fn mark_container_dirty(&mut self, container: &str) -> Result<(), GraphError> {
            self.0.mark_container_dirty(container)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_item_does_not_abort_run() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        std::fs::create_dir(root.join("found")).unwrap();
        std::fs::write(root.join("found/a.png"), b"PNG").unwrap();
        std::fs::write(root.join("found/b.png"), b"PNG").unwrap();

        let mut manifest = Manifest::default();
        manifest.add_image("a", "a.png").add_image("b", "b.png");
        let mut graph = ExplodingGraph(ManifestGraph::new(manifest, root.join("scene")));

        let worklist = vec![
            MissingReference::new("a", AssetKind::Image, Some("a.png")),
            MissingReference::new("b", AssetKind::Image, Some("b.png")),
        ];

        let mut coordinator = coordinator();
        coordinator.start(worklist, root.join("found").as_str()).unwrap();
        let outcome = coordinator
            .run_to_completion(&mut graph, Duration::from_millis(5))
            .await
            .unwrap();

        assert_eq!(outcome.phase, RelinkPhase::Done);
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.relinked, 1);
        assert!(matches!(outcome.results[0].status, ItemStatus::Unbound { .. }));
        assert!(outcome.results[1].is_relinked());
        assert_eq!(coordinator.metrics.item_panics.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
