//! Shared types for the parkour workspace.

mod types;

pub use types::{SurfaceId, Transform};
