use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder recorded when an entry has no last-known path.
pub const NO_PATH: &str = "No path";

/// Separator between the container and child names of a modifier cache identity.
///
/// Mesh-cache and ocean-cache references live on a modifier of an object, so
/// their identity is `"<object> - <modifier>"`.
pub const MODIFIER_SEPARATOR: &str = " - ";

/// Kind of external asset a graph entry refers to.
///
/// The kind selects which [`AssetBinder`](crate::services::binder::AssetBinder)
/// strategy performs the rebind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Library,
    Sound,
    MeshCache,
    OceanCache,
}

impl AssetKind {
    /// Every kind, in scan order.
    pub const ALL: [AssetKind; 5] = [
        AssetKind::Image,
        AssetKind::Library,
        AssetKind::Sound,
        AssetKind::MeshCache,
        AssetKind::OceanCache,
    ];

    /// Human-readable label used in status text and reports.
    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Image => "Image",
            AssetKind::Library => "Library",
            AssetKind::Sound => "Sound",
            AssetKind::MeshCache => "Mesh Cache",
            AssetKind::OceanCache => "Ocean Cache",
        }
    }

    /// True for kinds that live on an object modifier rather than as a datablock.
    pub fn is_modifier_cache(self) -> bool {
        matches!(self, AssetKind::MeshCache | AssetKind::OceanCache)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A graph entry whose backing file could not be loaded.
///
/// Produced by the missing-reference scan and consumed by the relink engine.
/// `identity` together with `kind` uniquely names the graph entry; the engine
/// only ever looks at the file name component of `original_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingReference {
    pub identity: String,
    pub kind: AssetKind,
    pub original_path: String,
}

impl MissingReference {
    /// Create a reference, recording [`NO_PATH`] when the path is absent or empty.
    pub fn new(identity: impl Into<String>, kind: AssetKind, original_path: Option<&str>) -> Self {
        let original_path = match original_path {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => NO_PATH.to_string(),
        };

        Self {
            identity: identity.into(),
            kind,
            original_path,
        }
    }

    /// Create a modifier-cache reference with a composite `container - child` identity.
    pub fn modifier(container: &str, child: &str, kind: AssetKind, original_path: Option<&str>) -> Self {
        Self::new(format!("{container}{MODIFIER_SEPARATOR}{child}"), kind, original_path)
    }

    /// File name used to search the index, if the reference has one.
    ///
    /// Both `/` and `\` count as separators so that paths written on another
    /// platform still yield their file name.
    pub fn basename(&self) -> Option<&str> {
        if self.original_path == NO_PATH {
            return None;
        }

        self.original_path
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .filter(|name| !name.is_empty())
    }
}

/// Split a composite modifier identity into `(container, child)`.
///
/// Splits on the first separator; both halves must be non-empty.
pub fn split_modifier_identity(identity: &str) -> Option<(&str, &str)> {
    identity
        .split_once(MODIFIER_SEPARATOR)
        .filter(|(container, child)| !container.is_empty() && !child.is_empty())
}

/// Per-kind toggles applied to scans and relink worklists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFilters {
    #[serde(default = "enabled")]
    pub images: bool,

    #[serde(default = "enabled")]
    pub libraries: bool,

    #[serde(default = "enabled")]
    pub sounds: bool,

    /// Covers both mesh-cache and ocean-cache modifiers.
    #[serde(default = "enabled")]
    pub caches: bool,
}

impl Default for AssetFilters {
    fn default() -> Self {
        Self {
            images: true,
            libraries: true,
            sounds: true,
            caches: true,
        }
    }
}

fn enabled() -> bool {
    true
}

impl AssetFilters {
    /// Check whether references of `kind` pass the filter
    pub fn allows(&self, kind: AssetKind) -> bool {
        match kind {
            AssetKind::Image => self.images,
            AssetKind::Library => self.libraries,
            AssetKind::Sound => self.sounds,
            AssetKind::MeshCache | AssetKind::OceanCache => self.caches,
        }
    }

    /// Keep only the references whose kind is enabled, preserving order.
    pub fn apply(&self, references: &[MissingReference]) -> Vec<MissingReference> {
        references
            .iter()
            .filter(|reference| self.allows(reference.kind))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_recorded_as_placeholder() {
        let reference = MissingReference::new("tex", AssetKind::Image, None);
        assert_eq!(reference.original_path, NO_PATH);
        assert_eq!(reference.basename(), None);

        let reference = MissingReference::new("tex", AssetKind::Image, Some(""));
        assert_eq!(reference.original_path, NO_PATH);
    }

    #[test]
    fn test_basename_handles_both_separators() {
        let unix = MissingReference::new("a", AssetKind::Image, Some("old/textures/tex1.png"));
        assert_eq!(unix.basename(), Some("tex1.png"));

        let windows = MissingReference::new("b", AssetKind::Sound, Some("C:\\sfx\\boom.wav"));
        assert_eq!(windows.basename(), Some("boom.wav"));

        let relative = MissingReference::new("c", AssetKind::Library, Some("//libs/props.blend"));
        assert_eq!(relative.basename(), Some("props.blend"));

        let directory = MissingReference::new("d", AssetKind::Image, Some("textures/"));
        assert_eq!(directory.basename(), None);
    }

    #[test]
    fn test_modifier_identity_round_trip() {
        let reference =
            MissingReference::modifier("Cube", "MeshCache", AssetKind::MeshCache, Some("cache.pc2"));
        assert_eq!(reference.identity, "Cube - MeshCache");
        assert_eq!(split_modifier_identity(&reference.identity), Some(("Cube", "MeshCache")));
    }

    #[test]
    fn test_malformed_modifier_identity() {
        assert_eq!(split_modifier_identity("Cube"), None);
        assert_eq!(split_modifier_identity(" - Mod"), None);
        assert_eq!(split_modifier_identity("Cube - "), None);
    }

    #[test]
    fn test_filters_apply_preserves_order() {
        let refs = vec![
            MissingReference::new("img", AssetKind::Image, Some("a.png")),
            MissingReference::new("snd", AssetKind::Sound, Some("b.wav")),
            MissingReference::modifier("Sea", "Ocean", AssetKind::OceanCache, Some("foam.exr")),
            MissingReference::new("img2", AssetKind::Image, Some("c.png")),
        ];

        let filters = AssetFilters {
            sounds: false,
            caches: false,
            ..AssetFilters::default()
        };

        let kept = filters.apply(&refs);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].identity, "img");
        assert_eq!(kept[1].identity, "img2");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(AssetKind::MeshCache.to_string(), "Mesh Cache");
        assert!(AssetKind::OceanCache.is_modifier_cache());
        assert!(!AssetKind::Sound.is_modifier_cache());
    }
}
