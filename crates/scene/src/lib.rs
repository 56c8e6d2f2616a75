//! Scene: the level surfaces collision queries run against.
//!
//! # Invariants
//! - Surfaces are kept in a BTreeMap so iteration order is deterministic.
//! - Every mutation is recorded in the event log, including children
//!   re-rooted by a removal.
//! - The parent chain of a surface never contains a cycle.

mod geometry;
mod scene;

pub use geometry::{Geometry, GeometryError};
pub use scene::{Scene, SceneError, SceneEvent, SurfaceNode};

pub fn crate_info() -> &'static str {
    "parkour-scene v0.1.0"
}
