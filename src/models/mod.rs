//! Data models for the relink engine.
//!
//! This module contains the value types shared by every layer:
//! - [`MissingReference`]: A graph entry whose backing file could not be loaded
//! - [`AssetKind`]: Which binder strategy applies to a reference
//! - [`AssetFilters`]: Per-kind toggles applied to scans and worklists
//! - [`RelinkPhase`], [`RelinkStatus`], [`RelinkOutcome`]: Progress and results of a run
//! - [`RelinkSettings`]: User settings loaded from `Relink Settings.yaml`
//!
//! # Architecture Note
//!
//! The models carry no behaviour beyond small helpers. [`RelinkStatus`] is
//! wrapped in `Arc<RwLock<>>` by [`StateManager`](crate::state::StateManager);
//! the live run itself is owned by the
//! [`RelinkCoordinator`](crate::coordinator::RelinkCoordinator).

pub mod asset;
pub mod config;
pub mod run_state;

pub use asset::{AssetFilters, AssetKind, MODIFIER_SEPARATOR, MissingReference, NO_PATH};
pub use config::RelinkSettings;
pub use run_state::{ItemResult, ItemStatus, RelinkOutcome, RelinkPhase, RelinkStatus};
