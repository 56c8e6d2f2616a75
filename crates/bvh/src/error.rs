use parkour_common::SurfaceId;
use parkour_scene::GeometryError;

/// Reasons a surface could not be registered.
///
/// `BvhManager::build` logs these and returns `None`; `try_build` hands them
/// to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("surface {0} is not in the scene")]
    UnknownSurface(SurfaceId),
    #[error("surface {0} has no geometry")]
    MissingGeometry(SurfaceId),
    #[error("surface {id} has invalid geometry: {source}")]
    InvalidGeometry {
        id: SurfaceId,
        #[source]
        source: GeometryError,
    },
    #[error("surface {0} has a non-invertible world transform")]
    SingularTransform(SurfaceId),
    #[error("acceleration structure for surface {id} failed to build: {reason}")]
    Construction { id: SurfaceId, reason: String },
}
