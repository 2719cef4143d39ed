//! The piecewise-constant resource timeline the resource manager schedules
//! and backfills against.

mod interval;
mod node_map;
mod space;

pub use interval::Interval;
pub use node_map::{NodeMap, Scalar, Vector};
pub use space::{NodeSpace, FAR_FUTURE};
