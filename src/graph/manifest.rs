//! A file-backed asset graph described by a YAML manifest.
//!
//! The manifest lists the datablocks and object modifiers of a scene together
//! with the external files they point at:
//!
//! ```yaml
//! source: shot_010.blend
//! images:
//!   wood_albedo:
//!     path: //textures/wood_albedo.png
//! libraries:
//!   props:
//!     path: /lib/props.blend
//! sounds:
//!   door_slam:
//!     path: sfx/door.wav
//! objects:
//!   Sea:
//!     modifiers:
//!       Ocean:
//!         type: ocean
//!         path: cache/foam.exr
//!         use_foam: true
//!         foam_layer_name: foam
//! ```
//!
//! Relative paths (and paths with a leading `//`) resolve against the
//! directory holding the manifest. Loaded data is simulated from the
//! filesystem: an image "has data" when its file exists and is non-empty.

use crate::graph::{AssetEntry, AssetGraph, GraphError};
use crate::models::asset::split_modifier_identity;
use crate::models::AssetKind;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;

/// Where an image's pixels come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    #[default]
    File,
    Sequence,
    Movie,
    Generated,
    Viewer,
}

impl ImageSource {
    /// Sources that read an external file.
    pub fn is_file_backed(self) -> bool {
        matches!(self, ImageSource::File | ImageSource::Sequence | ImageSource::Movie)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub source: ImageSource,

    #[serde(default)]
    pub packed: bool,

    #[serde(skip)]
    pub has_data: bool,

    #[serde(skip)]
    pub dirty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryBlock {
    #[serde(default)]
    pub path: String,

    #[serde(skip)]
    pub dirty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundBlock {
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub packed: bool,

    #[serde(skip)]
    pub dirty: bool,
}

/// Modifier types that matter to the relinker; everything else is `Other`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierType {
    MeshCache,
    Ocean,
    #[default]
    Other,
}

impl ModifierType {
    fn matches(self, kind: AssetKind) -> bool {
        matches!(
            (self, kind),
            (ModifierType::MeshCache, AssetKind::MeshCache) | (ModifierType::Ocean, AssetKind::OceanCache)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifierBlock {
    #[serde(rename = "type", default)]
    pub modifier_type: ModifierType,

    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub use_foam: bool,

    #[serde(default)]
    pub foam_layer_name: String,
}

impl ModifierBlock {
    pub fn mesh_cache(path: &str) -> Self {
        Self {
            modifier_type: ModifierType::MeshCache,
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn ocean_foam(path: &str, foam_layer_name: &str) -> Self {
        Self {
            modifier_type: ModifierType::Ocean,
            path: path.to_string(),
            use_foam: true,
            foam_layer_name: foam_layer_name.to_string(),
        }
    }

    /// The modifier reads its cache file.
    fn is_active(&self) -> bool {
        match self.modifier_type {
            ModifierType::MeshCache => true,
            ModifierType::Ocean => self.use_foam && !self.foam_layer_name.is_empty(),
            ModifierType::Other => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectBlock {
    #[serde(default)]
    pub modifiers: IndexMap<String, ModifierBlock>,

    #[serde(skip)]
    pub dirty: bool,
}

/// Serialized form of a [`ManifestGraph`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Name of the scene file the manifest describes, used in reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default)]
    pub images: IndexMap<String, ImageBlock>,

    #[serde(default)]
    pub libraries: IndexMap<String, LibraryBlock>,

    #[serde(default)]
    pub sounds: IndexMap<String, SoundBlock>,

    #[serde(default)]
    pub objects: IndexMap<String, ObjectBlock>,
}

impl Manifest {
    pub fn add_image(&mut self, name: &str, path: &str) -> &mut Self {
        self.images.insert(
            name.to_string(),
            ImageBlock {
                path: path.to_string(),
                ..ImageBlock::default()
            },
        );
        self
    }

    pub fn add_library(&mut self, name: &str, path: &str) -> &mut Self {
        self.libraries.insert(
            name.to_string(),
            LibraryBlock {
                path: path.to_string(),
                ..LibraryBlock::default()
            },
        );
        self
    }

    pub fn add_sound(&mut self, name: &str, path: &str) -> &mut Self {
        self.sounds.insert(
            name.to_string(),
            SoundBlock {
                path: path.to_string(),
                ..SoundBlock::default()
            },
        );
        self
    }

    pub fn add_modifier(&mut self, object: &str, modifier: &str, block: ModifierBlock) -> &mut Self {
        self.objects
            .entry(object.to_string())
            .or_default()
            .modifiers
            .insert(modifier.to_string(), block);
        self
    }
}

/// In-memory [`AssetGraph`] loaded from a [`Manifest`].
#[derive(Debug, Clone)]
pub struct ManifestGraph {
    manifest: Manifest,
    base_dir: Utf8PathBuf,
}

impl ManifestGraph {
    /// Build a graph whose relative paths resolve against `base_dir`.
    ///
    /// Image data is loaded immediately, as a host does when opening a scene.
    pub fn new(manifest: Manifest, base_dir: impl Into<Utf8PathBuf>) -> Self {
        let mut graph = Self {
            manifest,
            base_dir: base_dir.into(),
        };
        graph.reload_all_images();
        graph
    }

    /// Load a manifest file.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path))?;

        let manifest: Manifest = serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("Failed to parse manifest: {}", path))?;

        let base_dir = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };

        tracing::info!(
            "Loaded manifest {}: {} images, {} libraries, {} sounds, {} objects",
            path,
            manifest.images.len(),
            manifest.libraries.len(),
            manifest.sounds.len(),
            manifest.objects.len()
        );

        Ok(Self::new(manifest, base_dir))
    }

    /// Write the manifest, including any relinked paths, back to disk.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        let yaml = serde_yaml_ng::to_string(&self.manifest)
            .context("Failed to serialize manifest to YAML")?;

        fs::write(path, yaml).with_context(|| format!("Failed to write manifest: {}", path))?;

        tracing::info!("Saved manifest to {}", path);
        Ok(())
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    /// Whether an entry has been flagged for re-evaluation since loading.
    pub fn is_dirty(&self, kind: AssetKind, identity: &str) -> bool {
        match kind {
            AssetKind::Image => self.manifest.images.get(identity).is_some_and(|b| b.dirty),
            AssetKind::Library => self.manifest.libraries.get(identity).is_some_and(|b| b.dirty),
            AssetKind::Sound => self.manifest.sounds.get(identity).is_some_and(|b| b.dirty),
            AssetKind::MeshCache | AssetKind::OceanCache => split_modifier_identity(identity)
                .and_then(|(object, _)| self.manifest.objects.get(object))
                .is_some_and(|object| object.dirty),
        }
    }

    fn reload_all_images(&mut self) {
        let names: Vec<String> = self.manifest.images.keys().cloned().collect();
        for name in names {
            self.load_image_data(&name);
        }
    }

    fn load_image_data(&mut self, name: &str) {
        let Some(block) = self.manifest.images.get(name) else {
            return;
        };

        let has_data = if block.packed {
            true
        } else if !block.source.is_file_backed() || block.path.is_empty() {
            !block.source.is_file_backed()
        } else {
            let resolved = self.resolve_path(&block.path);
            fs::metadata(&resolved)
                .map(|meta| meta.is_file() && meta.len() > 0)
                .unwrap_or(false)
        };

        if let Some(block) = self.manifest.images.get_mut(name) {
            block.has_data = has_data;
        }
    }

    fn modifier(&self, kind: AssetKind, container: &str, child: &str) -> Option<&ModifierBlock> {
        self.manifest
            .objects
            .get(container)?
            .modifiers
            .get(child)
            .filter(|modifier| modifier.modifier_type.matches(kind))
    }

    fn modifier_mut(&mut self, kind: AssetKind, container: &str, child: &str) -> Option<&mut ModifierBlock> {
        self.manifest
            .objects
            .get_mut(container)?
            .modifiers
            .get_mut(child)
            .filter(|modifier| modifier.modifier_type.matches(kind))
    }

    fn not_found(kind: AssetKind, identity: &str) -> GraphError {
        GraphError::EntryNotFound {
            kind,
            identity: identity.to_string(),
        }
    }

    fn modifier_entries(&self, kind: AssetKind) -> Vec<AssetEntry> {
        self.manifest
            .objects
            .iter()
            .flat_map(|(object, block)| {
                block
                    .modifiers
                    .iter()
                    .filter(move |(_, modifier)| modifier.modifier_type.matches(kind))
                    .map(move |(name, modifier)| AssetEntry {
                        identity: format!("{}{}{}", object, crate::models::MODIFIER_SEPARATOR, name),
                        kind,
                        path: non_empty(&modifier.path),
                        has_data: false,
                        packed: false,
                        active: modifier.is_active(),
                    })
            })
            .collect()
    }
}

fn non_empty(path: &str) -> Option<String> {
    (!path.is_empty()).then(|| path.to_string())
}

impl AssetGraph for ManifestGraph {
    fn entries(&self, kind: AssetKind) -> Vec<AssetEntry> {
        match kind {
            AssetKind::Image => self
                .manifest
                .images
                .iter()
                .map(|(name, block)| AssetEntry {
                    identity: name.clone(),
                    kind,
                    path: non_empty(&block.path),
                    has_data: block.has_data,
                    packed: block.packed,
                    active: block.source.is_file_backed(),
                })
                .collect(),
            AssetKind::Library => self
                .manifest
                .libraries
                .iter()
                .map(|(name, block)| AssetEntry {
                    identity: name.clone(),
                    kind,
                    path: non_empty(&block.path),
                    has_data: false,
                    packed: false,
                    active: true,
                })
                .collect(),
            AssetKind::Sound => self
                .manifest
                .sounds
                .iter()
                .map(|(name, block)| AssetEntry {
                    identity: name.clone(),
                    kind,
                    path: non_empty(&block.path),
                    has_data: false,
                    packed: block.packed,
                    active: true,
                })
                .collect(),
            AssetKind::MeshCache | AssetKind::OceanCache => self.modifier_entries(kind),
        }
    }

    fn contains(&self, kind: AssetKind, identity: &str) -> bool {
        match kind {
            AssetKind::Image => self.manifest.images.contains_key(identity),
            AssetKind::Library => self.manifest.libraries.contains_key(identity),
            AssetKind::Sound => self.manifest.sounds.contains_key(identity),
            AssetKind::MeshCache | AssetKind::OceanCache => split_modifier_identity(identity)
                .is_some_and(|(object, modifier)| self.has_modifier(kind, object, modifier)),
        }
    }

    fn path(&self, kind: AssetKind, identity: &str) -> Option<String> {
        match kind {
            AssetKind::Image => self.manifest.images.get(identity).map(|b| b.path.clone()),
            AssetKind::Library => self.manifest.libraries.get(identity).map(|b| b.path.clone()),
            AssetKind::Sound => self.manifest.sounds.get(identity).map(|b| b.path.clone()),
            AssetKind::MeshCache | AssetKind::OceanCache => {
                let (object, modifier) = split_modifier_identity(identity)?;
                self.modifier(kind, object, modifier).map(|m| m.path.clone())
            }
        }
    }

    fn set_path(&mut self, kind: AssetKind, identity: &str, path: &str) -> Result<(), GraphError> {
        let slot = match kind {
            AssetKind::Image => self.manifest.images.get_mut(identity).map(|b| &mut b.path),
            AssetKind::Library => self.manifest.libraries.get_mut(identity).map(|b| &mut b.path),
            AssetKind::Sound => self.manifest.sounds.get_mut(identity).map(|b| &mut b.path),
            AssetKind::MeshCache | AssetKind::OceanCache => {
                let (object, modifier) = split_modifier_identity(identity)
                    .ok_or_else(|| Self::not_found(kind, identity))?;
                return self.set_modifier_path(kind, object, modifier, path);
            }
        };

        let slot = slot.ok_or_else(|| Self::not_found(kind, identity))?;
        *slot = path.to_string();
        Ok(())
    }

    fn reload(&mut self, kind: AssetKind, identity: &str) -> Result<(), GraphError> {
        match kind {
            AssetKind::Image => {
                if !self.manifest.images.contains_key(identity) {
                    return Err(Self::not_found(kind, identity));
                }
                // Like the host, a reload that finds no pixels is not an error;
                // callers check `has_data` afterwards.
                self.load_image_data(identity);
                Ok(())
            }
            AssetKind::Library => {
                let block = self
                    .manifest
                    .libraries
                    .get(identity)
                    .ok_or_else(|| Self::not_found(kind, identity))?;

                let resolved = self.resolve_path(&block.path);
                if block.path.is_empty() || !resolved.is_file() {
                    return Err(GraphError::ReloadFailed {
                        kind,
                        identity: identity.to_string(),
                        reason: format!("cannot read {}", resolved),
                    });
                }
                Ok(())
            }
            _ => Err(GraphError::UnsupportedKind(kind)),
        }
    }

    fn has_data(&self, kind: AssetKind, identity: &str) -> bool {
        match kind {
            AssetKind::Image => self.manifest.images.get(identity).is_some_and(|b| b.has_data),
            _ => false,
        }
    }

    fn mark_dirty(&mut self, kind: AssetKind, identity: &str) -> Result<(), GraphError> {
        let flag = match kind {
            AssetKind::Image => self.manifest.images.get_mut(identity).map(|b| &mut b.dirty),
            AssetKind::Library => self.manifest.libraries.get_mut(identity).map(|b| &mut b.dirty),
            AssetKind::Sound => self.manifest.sounds.get_mut(identity).map(|b| &mut b.dirty),
            AssetKind::MeshCache | AssetKind::OceanCache => {
                let (object, _) = split_modifier_identity(identity)
                    .ok_or_else(|| Self::not_found(kind, identity))?;
                return self.mark_container_dirty(object);
            }
        };

        *flag.ok_or_else(|| Self::not_found(kind, identity))? = true;
        Ok(())
    }

    fn remove(&mut self, kind: AssetKind, identity: &str) -> Result<(), GraphError> {
        let removed = match kind {
            AssetKind::Image => self.manifest.images.shift_remove(identity).is_some(),
            AssetKind::Library => self.manifest.libraries.shift_remove(identity).is_some(),
            AssetKind::Sound => self.manifest.sounds.shift_remove(identity).is_some(),
            AssetKind::MeshCache | AssetKind::OceanCache => {
                match split_modifier_identity(identity) {
                    Some((object, modifier)) if self.has_modifier(kind, object, modifier) => self
                        .manifest
                        .objects
                        .get_mut(object)
                        .is_some_and(|block| block.modifiers.shift_remove(modifier).is_some()),
                    _ => false,
                }
            }
        };

        if removed {
            Ok(())
        } else {
            Err(Self::not_found(kind, identity))
        }
    }

    fn resolve_path(&self, path: &str) -> Utf8PathBuf {
        if let Some(relative) = path.strip_prefix("//") {
            return self.base_dir.join(relative);
        }

        let candidate = Utf8Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        }
    }

    fn has_modifier(&self, kind: AssetKind, container: &str, child: &str) -> bool {
        self.modifier(kind, container, child).is_some()
    }

    fn set_modifier_path(
        &mut self,
        kind: AssetKind,
        container: &str,
        child: &str,
        path: &str,
    ) -> Result<(), GraphError> {
        let identity = format!("{}{}{}", container, crate::models::MODIFIER_SEPARATOR, child);
        let modifier = self
            .modifier_mut(kind, container, child)
            .ok_or_else(|| Self::not_found(kind, &identity))?;
        modifier.path = path.to_string();
        Ok(())
    }

    fn mark_container_dirty(&mut self, container: &str) -> Result<(), GraphError> {
        let object = self
            .manifest
            .objects
            .get_mut(container)
            .ok_or_else(|| GraphError::EntryNotFound {
                kind: AssetKind::MeshCache,
                identity: container.to_string(),
            })?;
        object.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_base() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, base)
    }

    #[test]
    fn test_image_data_follows_file_contents() {
        let (_temp_dir, base) = temp_base();
        fs::write(base.join("full.png"), b"PNG").unwrap();
        fs::write(base.join("empty.png"), b"").unwrap();

        let mut manifest = Manifest::default();
        manifest
            .add_image("full", "full.png")
            .add_image("empty", "empty.png")
            .add_image("gone", "gone.png");

        let graph = ManifestGraph::new(manifest, base);
        assert!(graph.has_data(AssetKind::Image, "full"));
        assert!(!graph.has_data(AssetKind::Image, "empty"));
        assert!(!graph.has_data(AssetKind::Image, "gone"));
    }

    #[test]
    fn test_resolve_relative_paths() {
        let graph = ManifestGraph::new(Manifest::default(), "/scenes/shot");

        assert_eq!(graph.resolve_path("//tex/a.png"), Utf8PathBuf::from("/scenes/shot/tex/a.png"));
        assert_eq!(graph.resolve_path("tex/a.png"), Utf8PathBuf::from("/scenes/shot/tex/a.png"));
        assert_eq!(graph.resolve_path("/abs/a.png"), Utf8PathBuf::from("/abs/a.png"));
    }

    #[test]
    fn test_modifier_addressing() {
        let mut manifest = Manifest::default();
        manifest
            .add_modifier("Cube", "Cache", ModifierBlock::mesh_cache("cube.pc2"))
            .add_modifier("Sea", "Ocean", ModifierBlock::ocean_foam("foam.exr", "foam"));

        let mut graph = ManifestGraph::new(manifest, "/scene");

        assert!(graph.contains(AssetKind::MeshCache, "Cube - Cache"));
        assert!(!graph.contains(AssetKind::OceanCache, "Cube - Cache"));
        assert_eq!(graph.entries(AssetKind::OceanCache).len(), 1);

        graph
            .set_modifier_path(AssetKind::MeshCache, "Cube", "Cache", "/new/cube.pc2")
            .unwrap();
        assert_eq!(
            graph.path(AssetKind::MeshCache, "Cube - Cache").as_deref(),
            Some("/new/cube.pc2")
        );

        graph.mark_container_dirty("Cube").unwrap();
        assert!(graph.is_dirty(AssetKind::MeshCache, "Cube - Cache"));
        assert!(!graph.is_dirty(AssetKind::OceanCache, "Sea - Ocean"));
    }

    #[test]
    fn test_library_reload_requires_file() {
        let (_temp_dir, base) = temp_base();
        fs::write(base.join("props.blend"), b"BLENDER").unwrap();

        let mut manifest = Manifest::default();
        manifest.add_library("props", "missing.blend");
        let mut graph = ManifestGraph::new(manifest, base);

        assert!(matches!(
            graph.reload(AssetKind::Library, "props"),
            Err(GraphError::ReloadFailed { .. })
        ));

        graph.set_path(AssetKind::Library, "props", "props.blend").unwrap();
        assert!(graph.reload(AssetKind::Library, "props").is_ok());
    }

    #[test]
    fn test_sound_has_no_reload() {
        let mut manifest = Manifest::default();
        manifest.add_sound("slam", "door.wav");
        let mut graph = ManifestGraph::new(manifest, "/scene");

        assert_eq!(
            graph.reload(AssetKind::Sound, "slam"),
            Err(GraphError::UnsupportedKind(AssetKind::Sound))
        );
    }

    #[test]
    fn test_remove_entry() {
        let mut manifest = Manifest::default();
        manifest.add_image("a", "a.png").add_image("b", "b.png");
        let mut graph = ManifestGraph::new(manifest, "/scene");

        graph.remove(AssetKind::Image, "a").unwrap();
        assert!(!graph.contains(AssetKind::Image, "a"));
        assert!(graph.remove(AssetKind::Image, "a").is_err());
    }

    #[test]
    fn test_load_and_save_round_trip() {
        let (_temp_dir, base) = temp_base();
        let manifest_path = base.join("scene.yaml");
        fs::write(
            &manifest_path,
            "source: shot.blend\nimages:\n  wood:\n    path: //tex/wood.png\nobjects:\n  Sea:\n    modifiers:\n      Ocean:\n        type: ocean\n        path: foam.exr\n        use_foam: true\n        foam_layer_name: foam\n",
        )
        .unwrap();

        let mut graph = ManifestGraph::load(&manifest_path).unwrap();
        assert_eq!(graph.base_dir(), base.as_path());
        assert_eq!(graph.manifest().source.as_deref(), Some("shot.blend"));

        graph.set_path(AssetKind::Image, "wood", "/new/wood.png").unwrap();
        graph.save(&manifest_path).unwrap();

        let reloaded = ManifestGraph::load(&manifest_path).unwrap();
        assert_eq!(reloaded.path(AssetKind::Image, "wood").as_deref(), Some("/new/wood.png"));
        assert!(reloaded.contains(AssetKind::OceanCache, "Sea - Ocean"));
    }
}
