//! BVH registry: acceleration structures over static level meshes.
//!
//! Builds one acceleration structure per registered surface (shared between
//! surfaces with identical geometry), caches each surface's inverse world
//! transform, and answers world-space ray, sphere-cast and overlap queries by
//! scanning every entry and keeping the closest hit.
//!
//! # Invariants
//! - At most one registry entry per surface.
//! - Entries are created on the first build request and only removed explicitly.
//! - A miss, a failed build and an unregistered surface all read as `None`.
//!
//! Tree construction and traversal are delegated to parry3d's `TriMesh`.

mod config;
mod convert;
mod entry;
mod error;
mod ground;
mod manager;
mod query;
mod refresh;
mod source;
mod stats;

pub use config::{BvhConfig, ConfigError, GroundProbeConfig};
pub use entry::{BvhEntry, GeometryHash, WorldBounds};
pub use error::BuildError;
pub use ground::{GroundContact, GroundProbe};
pub use manager::BvhManager;
pub use query::{Ray, RayHit, SphereCast, SphereHit};
pub use refresh::RefreshTimer;
pub use source::SurfaceSource;
pub use stats::RegistryStats;

pub fn crate_info() -> &'static str {
    "parkour-bvh v0.1.0"
}
