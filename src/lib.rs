// Asset Relinker - find and relink missing external files of an asset graph
//
// This is the library crate containing the relink engine and its collaborators.
// The binary crate (main.rs) provides the command-line host.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod graph;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use coordinator::{CancelHandle, RelinkCoordinator, RelinkError, StartResponse, TickOutcome};
pub use graph::{AssetGraph, GraphError, ManifestGraph};
pub use metrics::Metrics;
pub use models::{AssetFilters, AssetKind, MissingReference, RelinkOutcome, RelinkPhase, RelinkSettings, RelinkStatus};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
