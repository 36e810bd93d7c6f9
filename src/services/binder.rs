//! Per-kind strategies that rebind a missing reference to a replacement file.
//!
//! Every binder follows the same contract: given the identity of a graph
//! entry and a candidate path, either leave the entry pointing at the new file
//! (verified as far as the kind allows) and report [`BindOutcome::Bound`], or
//! leave no lasting change and report [`BindOutcome::Unbound`]. A vanished
//! entry is a benign miss, not an error.

use crate::graph::AssetGraph;
use crate::models::asset::split_modifier_identity;
use crate::models::AssetKind;
use camino::Utf8Path;
use std::fmt;

/// Why a bind did not take effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnboundReason {
    /// The entry is no longer in the graph.
    EntryMissing,
    /// The reload succeeded but produced no data.
    VerificationFailed,
    /// The reload reported an error.
    ReloadFailed(String),
    /// A modifier-cache identity without a `container - child` split.
    MalformedIdentity,
    /// The graph rejected the path change.
    Rejected(String),
}

impl fmt::Display for UnboundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnboundReason::EntryMissing => f.write_str("entry no longer exists"),
            UnboundReason::VerificationFailed => f.write_str("reloaded file has no data"),
            UnboundReason::ReloadFailed(reason) => write!(f, "reload failed: {}", reason),
            UnboundReason::MalformedIdentity => f.write_str("malformed modifier identity"),
            UnboundReason::Rejected(reason) => write!(f, "path rejected: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Bound,
    Unbound(UnboundReason),
}

impl BindOutcome {
    pub fn is_bound(&self) -> bool {
        matches!(self, BindOutcome::Bound)
    }
}

/// Rebind-and-verify strategy for one [`AssetKind`].
pub trait AssetBinder: Send + Sync {
    fn kind(&self) -> AssetKind;

    fn bind(&self, graph: &mut dyn AssetGraph, identity: &str, new_path: &Utf8Path) -> BindOutcome;
}

/// Images are reloaded and must come back with data; otherwise the old path is restored.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageBinder;

/// Libraries are reloaded; a reload error restores the old path.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryBinder;

/// Sounds cannot be reloaded, so setting the path is the whole bind.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoundBinder;

/// Mesh-cache and ocean-cache modifiers, addressed as `container - child`.
#[derive(Debug, Clone, Copy)]
pub struct ModifierCacheBinder {
    kind: AssetKind,
}

static IMAGE_BINDER: ImageBinder = ImageBinder;
static LIBRARY_BINDER: LibraryBinder = LibraryBinder;
static SOUND_BINDER: SoundBinder = SoundBinder;
static MESH_CACHE_BINDER: ModifierCacheBinder = ModifierCacheBinder {
    kind: AssetKind::MeshCache,
};
static OCEAN_CACHE_BINDER: ModifierCacheBinder = ModifierCacheBinder {
    kind: AssetKind::OceanCache,
};

/// The binder responsible for `kind`.
pub fn binder_for(kind: AssetKind) -> &'static dyn AssetBinder {
    match kind {
        AssetKind::Image => &IMAGE_BINDER,
        AssetKind::Library => &LIBRARY_BINDER,
        AssetKind::Sound => &SOUND_BINDER,
        AssetKind::MeshCache => &MESH_CACHE_BINDER,
        AssetKind::OceanCache => &OCEAN_CACHE_BINDER,
    }
}

/// Put the previous path back after a failed bind.
fn restore_path(graph: &mut dyn AssetGraph, kind: AssetKind, identity: &str, old_path: &str) {
    if let Err(e) = graph.set_path(kind, identity, old_path) {
        tracing::error!("Failed to restore path of {} '{}': {}", kind, identity, e);
    }
}

impl AssetBinder for ImageBinder {
    fn kind(&self) -> AssetKind {
        AssetKind::Image
    }

    fn bind(&self, graph: &mut dyn AssetGraph, identity: &str, new_path: &Utf8Path) -> BindOutcome {
        let kind = AssetKind::Image;
        if !graph.contains(kind, identity) {
            return BindOutcome::Unbound(UnboundReason::EntryMissing);
        }

        let old_path = graph.path(kind, identity).unwrap_or_default();
        if let Err(e) = graph.set_path(kind, identity, new_path.as_str()) {
            return BindOutcome::Unbound(UnboundReason::Rejected(e.to_string()));
        }

        let reason = match graph.reload(kind, identity) {
            Ok(()) if graph.has_data(kind, identity) => {
                tracing::info!("Successfully relinked image '{}' to {}", identity, new_path);
                return BindOutcome::Bound;
            }
            Ok(()) => UnboundReason::VerificationFailed,
            Err(e) => UnboundReason::ReloadFailed(e.to_string()),
        };

        tracing::warn!("Failed to relink image '{}' to {}: {}", identity, new_path, reason);
        restore_path(graph, kind, identity, &old_path);
        BindOutcome::Unbound(reason)
    }
}

impl AssetBinder for LibraryBinder {
    fn kind(&self) -> AssetKind {
        AssetKind::Library
    }

    fn bind(&self, graph: &mut dyn AssetGraph, identity: &str, new_path: &Utf8Path) -> BindOutcome {
        let kind = AssetKind::Library;
        if !graph.contains(kind, identity) {
            return BindOutcome::Unbound(UnboundReason::EntryMissing);
        }

        let old_path = graph.path(kind, identity).unwrap_or_default();
        if let Err(e) = graph.set_path(kind, identity, new_path.as_str()) {
            return BindOutcome::Unbound(UnboundReason::Rejected(e.to_string()));
        }

        match graph.reload(kind, identity) {
            Ok(()) => {
                tracing::info!("Successfully relinked library '{}' to {}", identity, new_path);
                BindOutcome::Bound
            }
            Err(e) => {
                tracing::warn!("Error relinking library '{}': {}", identity, e);
                restore_path(graph, kind, identity, &old_path);
                BindOutcome::Unbound(UnboundReason::ReloadFailed(e.to_string()))
            }
        }
    }
}

impl AssetBinder for SoundBinder {
    fn kind(&self) -> AssetKind {
        AssetKind::Sound
    }

    fn bind(&self, graph: &mut dyn AssetGraph, identity: &str, new_path: &Utf8Path) -> BindOutcome {
        let kind = AssetKind::Sound;
        if !graph.contains(kind, identity) {
            return BindOutcome::Unbound(UnboundReason::EntryMissing);
        }

        if let Err(e) = graph.set_path(kind, identity, new_path.as_str()) {
            return BindOutcome::Unbound(UnboundReason::Rejected(e.to_string()));
        }
        if let Err(e) = graph.mark_dirty(kind, identity) {
            tracing::debug!("Could not tag sound '{}' for update: {}", identity, e);
        }

        tracing::info!("Successfully relinked sound '{}' to {}", identity, new_path);
        BindOutcome::Bound
    }
}

impl AssetBinder for ModifierCacheBinder {
    fn kind(&self) -> AssetKind {
        self.kind
    }

    fn bind(&self, graph: &mut dyn AssetGraph, identity: &str, new_path: &Utf8Path) -> BindOutcome {
        let Some((container, child)) = split_modifier_identity(identity) else {
            tracing::warn!("Cannot split {} identity '{}'", self.kind, identity);
            return BindOutcome::Unbound(UnboundReason::MalformedIdentity);
        };

        if !graph.has_modifier(self.kind, container, child) {
            return BindOutcome::Unbound(UnboundReason::EntryMissing);
        }

        if let Err(e) = graph.set_modifier_path(self.kind, container, child, new_path.as_str()) {
            return BindOutcome::Unbound(UnboundReason::Rejected(e.to_string()));
        }
        if let Err(e) = graph.mark_container_dirty(container) {
            tracing::debug!("Could not tag '{}' for update: {}", container, e);
        }

        tracing::info!("Successfully relinked {} '{}' to {}", self.kind.label().to_lowercase(), identity, new_path);
        BindOutcome::Bound
    }
}
