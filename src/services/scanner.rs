//! Missing-reference scan over an [`AssetGraph`].
//!
//! The scan is synchronous and cheap: it only inspects entry flags and checks
//! whether resolved paths exist. Its output is the worklist handed to the
//! relink coordinator, and the same scan runs again after a completed run.

use crate::graph::{AssetEntry, AssetGraph};
use crate::models::{AssetFilters, AssetKind, MissingReference};
use std::fs::File;

/// Collaborator that recomputes the missing-reference list after a run.
pub trait Rescan: Send {
    fn rescan(&mut self, graph: &dyn AssetGraph) -> Vec<MissingReference>;
}

impl<F> Rescan for F
where
    F: FnMut(&dyn AssetGraph) -> Vec<MissingReference> + Send,
{
    fn rescan(&mut self, graph: &dyn AssetGraph) -> Vec<MissingReference> {
        self(graph)
    }
}

/// [`Rescan`] backed by [`scan_missing`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingScan {
    pub filters: AssetFilters,
}

impl MissingScan {
    pub fn new(filters: AssetFilters) -> Self {
        Self { filters }
    }
}

impl Rescan for MissingScan {
    fn rescan(&mut self, graph: &dyn AssetGraph) -> Vec<MissingReference> {
        scan_missing(graph, &self.filters)
    }
}

/// Collect every entry whose backing file is missing, in kind order.
pub fn scan_missing(graph: &dyn AssetGraph, filters: &AssetFilters) -> Vec<MissingReference> {
    let mut missing = Vec::new();

    for kind in AssetKind::ALL {
        if !filters.allows(kind) {
            continue;
        }

        let before = missing.len();
        missing.extend(
            graph
                .entries(kind)
                .into_iter()
                .filter(|entry| is_missing(graph, entry))
                .map(|entry| MissingReference::new(entry.identity, kind, entry.path.as_deref())),
        );

        let found = missing.len() - before;
        if found > 0 {
            tracing::debug!("Found {} missing {} references", found, kind.label().to_lowercase());
        }
    }

    if missing.is_empty() {
        tracing::info!("No missing assets found");
    } else {
        tracing::warn!("Found {} missing assets", missing.len());
    }

    missing
}

fn is_missing(graph: &dyn AssetGraph, entry: &AssetEntry) -> bool {
    match entry.kind {
        AssetKind::Image => entry.active && !entry.has_data,
        AssetKind::Library => match entry.path.as_deref() {
            None => true,
            Some(path) => !graph.resolve_path(path).is_file(),
        },
        AssetKind::Sound => match entry.path.as_deref() {
            Some(path) if !entry.packed => !graph.resolve_path(path).is_file(),
            _ => false,
        },
        // Caches only count when the modifier actually reads its file.
        AssetKind::MeshCache | AssetKind::OceanCache => match entry.path.as_deref() {
            Some(path) if entry.active => File::open(graph.resolve_path(path)).is_err(),
            _ => false,
        },
    }
}

/// Remove every file-backed image that has no data. Returns how many were removed.
///
/// Only images are ever removed; other kinds are left for the user to fix.
pub fn remove_missing_images(graph: &mut dyn AssetGraph) -> usize {
    let doomed: Vec<String> = graph
        .entries(AssetKind::Image)
        .into_iter()
        .filter(|entry| entry.active && !entry.has_data)
        .map(|entry| entry.identity)
        .collect();

    let mut removed = 0;
    for identity in doomed {
        match graph.remove(AssetKind::Image, &identity) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("Failed to remove image '{}': {}", identity, e),
        }
    }

    tracing::info!("Removed {} missing images", removed);
    removed
}
