//! The asset graph the relink engine operates on.
//!
//! The graph is owned by the host application. The engine reaches it only
//! through [`AssetGraph`], and only from the foreground tick, one item at a
//! time, so implementations never need internal locking.

pub mod manifest;

pub use manifest::{ImageSource, Manifest, ManifestGraph, ModifierBlock, ModifierType};

use crate::models::AssetKind;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors reported by an [`AssetGraph`] implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("{kind} '{identity}' not found")]
    EntryNotFound { kind: AssetKind, identity: String },

    #[error("Failed to reload {kind} '{identity}': {reason}")]
    ReloadFailed {
        kind: AssetKind,
        identity: String,
        reason: String,
    },

    #[error("Operation not supported for {0}")]
    UnsupportedKind(AssetKind),
}

/// One entry of the graph, as seen by the missing-reference scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    pub identity: String,
    pub kind: AssetKind,

    /// Path as stored in the graph, possibly relative to the graph's file.
    pub path: Option<String>,

    /// The entry currently holds loaded data.
    pub has_data: bool,

    /// The data is embedded in the graph, so no external file is needed.
    pub packed: bool,

    /// The entry actually consumes its external file: images with a
    /// file-like source, mesh caches, oceans that bake foam to a named layer.
    pub active: bool,
}

/// Query and mutation interface of the host's asset graph.
///
/// Datablock kinds (image, library, sound) are addressed by name. Modifier
/// caches are addressed either by their composite `"<object> - <modifier>"`
/// identity through the generic methods, or by `(container, child)` through
/// the modifier-specific ones.
#[cfg_attr(test, mockall::automock)]
pub trait AssetGraph: Send {
    /// Enumerate every entry of `kind`.
    fn entries(&self, kind: AssetKind) -> Vec<AssetEntry>;

    fn contains(&self, kind: AssetKind, identity: &str) -> bool;

    /// Stored path of an entry.
    fn path(&self, kind: AssetKind, identity: &str) -> Option<String>;

    fn set_path(&mut self, kind: AssetKind, identity: &str, path: &str) -> Result<(), GraphError>;

    /// Reload the entry's data from its current path.
    fn reload(&mut self, kind: AssetKind, identity: &str) -> Result<(), GraphError>;

    fn has_data(&self, kind: AssetKind, identity: &str) -> bool;

    /// Flag the entry so the host re-evaluates it.
    fn mark_dirty(&mut self, kind: AssetKind, identity: &str) -> Result<(), GraphError>;

    fn remove(&mut self, kind: AssetKind, identity: &str) -> Result<(), GraphError>;

    /// Turn a stored path into an absolute filesystem path.
    fn resolve_path(&self, path: &str) -> Utf8PathBuf;

    /// True when `container` has a modifier named `child` of the given cache kind.
    fn has_modifier(&self, kind: AssetKind, container: &str, child: &str) -> bool;

    fn set_modifier_path(
        &mut self,
        kind: AssetKind,
        container: &str,
        child: &str,
        path: &str,
    ) -> Result<(), GraphError>;

    fn mark_container_dirty(&mut self, container: &str) -> Result<(), GraphError>;
}
