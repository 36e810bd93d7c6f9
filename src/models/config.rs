use crate::models::AssetFilters;
use serde::{Deserialize, Serialize};

/// User settings from `Relink Settings.yaml`, overridable via `RELINK_*` environment variables.
///
/// Nested keys use a double underscore in the environment, e.g.
/// `RELINK_FILTERS__SOUNDS=false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelinkSettings {
    /// Directory searched for replacement files. Empty means "not configured".
    #[serde(default)]
    pub search_directory: String,

    /// Cadence of the host tick loop in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Descend into symlinked directories while indexing (cycles are tracked).
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Deepest directory level indexed below the search root.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Concurrent directory scans; 0 means available parallelism.
    #[serde(default)]
    pub worker_threads: usize,

    #[serde(default)]
    pub filters: AssetFilters,

    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for RelinkSettings {
    fn default() -> Self {
        Self {
            search_directory: String::new(),
            tick_interval_ms: default_tick_interval_ms(),
            follow_symlinks: false,
            max_depth: default_max_depth(),
            worker_threads: 0,
            filters: AssetFilters::default(),
            debug_mode: false,
            log_dir: default_log_dir(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_max_depth() -> usize {
    64
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl RelinkSettings {
    /// Search directory, or `None` when unset or blank.
    pub fn search_directory(&self) -> Option<&str> {
        let trimmed = self.search_directory.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Clear the configured search directory.
    pub fn clear_search_directory(&mut self) {
        self.search_directory.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = RelinkSettings::default();
        assert_eq!(settings.tick_interval_ms, 100);
        assert_eq!(settings.max_depth, 64);
        assert_eq!(settings.worker_threads, 0);
        assert!(!settings.follow_symlinks);
        assert!(settings.filters.images && settings.filters.caches);
        assert_eq!(settings.search_directory(), None);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "search_directory: /assets\nfilters:\n  sounds: false\n";
        let settings: RelinkSettings = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(settings.search_directory(), Some("/assets"));
        assert!(!settings.filters.sounds);
        assert!(settings.filters.images);
        assert_eq!(settings.tick_interval_ms, 100);
    }

    #[test]
    fn test_clear_search_directory() {
        let mut settings = RelinkSettings {
            search_directory: "  /textures ".to_string(),
            ..RelinkSettings::default()
        };
        assert_eq!(settings.search_directory(), Some("/textures"));

        settings.clear_search_directory();
        assert_eq!(settings.search_directory(), None);
    }
}
