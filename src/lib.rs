//! Tiled, vectorized copies of 2D buffers.
//!
//! A buffer is viewed as a grid of tiles, each tile is handed to one cube and split among
//! its units with a [partition::PartitionPolicy]. The copy runs on any CubeCL runtime
//! ([kernel]) or on the host ([host]), and [harness] verifies the destination.

extern crate alloc;

#[macro_use]
extern crate derive_new;

pub mod config;
pub mod harness;
pub mod host;
pub mod kernel;
pub mod layout;
pub mod partition;

mod error;

pub use error::*;
pub use layout::{Layout, MajorOrder, Shape, TiledView};
pub use partition::{CopyPlan, PartitionPolicy, ThreadArrangement, ThreadPartition};

#[cfg(feature = "export_tests")]
pub mod tests;
