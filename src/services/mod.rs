//! Services module - the building blocks of a relink run.
//!
//! Nothing in here knows about ticks or phases; the
//! [`RelinkCoordinator`](crate::coordinator::RelinkCoordinator) drives these
//! pieces one step at a time.
//!
//! # Components
//!
//! - [`FileIndex`]: Basename → absolute path map of a directory tree, built on
//!   the tokio runtime by a pool of scan tasks. [`IndexBuild`] is the handle the
//!   foreground polls without blocking.
//!
//! - [`AssetBinder`]: One strategy per [`AssetKind`](crate::models::AssetKind)
//!   that points a graph entry at a new file and verifies the result, restoring
//!   the previous path when verification fails.
//!
//! - [`scan_missing`]: Lists the graph entries whose backing files are missing.
//!   This produces the worklist and the post-run rescan.
//!
//! - [`export_report`]: Writes the missing list as text or CSV.
//!
//! # Usage Example
//!
//! ```ignore
//! use asset_relinker::services::{FileIndex, IndexOptions, binder_for};
//!
//! let index = FileIndex::build(root, &IndexOptions::default()).await?;
//! if let Some(path) = index.lookup("tex1.png") {
//!     let outcome = binder_for(AssetKind::Image).bind(&mut graph, "tex1", path);
//! }
//! ```

pub mod binder;
pub mod file_index;
pub mod report;
pub mod scanner;

pub use binder::{AssetBinder, BindOutcome, UnboundReason, binder_for};
pub use file_index::{BuildPoll, FileIndex, IndexBuild, IndexBuildError, IndexOptions};
pub use report::{ReportFormat, export_report, render_outcome};
pub use scanner::{MissingScan, Rescan, remove_missing_images, scan_missing};
