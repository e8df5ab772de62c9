//! Temporal reconstruction: replay the event log into daily snapshots.
//!
//! - [`snapshot`] rebuilds a single item on a single day
//! - [`edges`] denormalizes tag associations per day
//! - [`categories`] derives parent-category edges from the task tree
//! - [`repair`] cleans up stored statuses
//! - [`driver`] walks a window in full or incremental mode

pub mod categories;
pub mod driver;
pub mod edges;
pub mod repair;
pub mod snapshot;

pub use driver::{Mode, ReconstructOptions, ReconstructReport, Reconstructor};
pub use snapshot::{ScopeContext, reconstruct_item_on_day};
