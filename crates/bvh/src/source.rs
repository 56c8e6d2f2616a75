use glam::Affine3A;
use parkour_common::SurfaceId;
use parkour_scene::{Geometry, Scene};

/// Where the registry reads surface geometry and world transforms from.
pub trait SurfaceSource {
    /// Local-space geometry, or `None` if the surface has none.
    fn geometry(&self, id: SurfaceId) -> Option<&Geometry>;

    /// Local-to-world matrix, or `None` if the surface does not exist.
    fn world_matrix(&self, id: SurfaceId) -> Option<Affine3A>;

    /// Every surface the source knows about.
    fn surface_ids(&self) -> Vec<SurfaceId>;

    /// Whether moving `ancestor` also moves `id`.
    fn is_descendant_of(&self, _id: SurfaceId, _ancestor: SurfaceId) -> bool {
        false
    }
}

impl SurfaceSource for Scene {
    fn geometry(&self, id: SurfaceId) -> Option<&Geometry> {
        self.get(id)?.geometry.as_deref()
    }

    fn world_matrix(&self, id: SurfaceId) -> Option<Affine3A> {
        Scene::world_matrix(self, id)
    }

    fn surface_ids(&self) -> Vec<SurfaceId> {
        self.surfaces().keys().copied().collect()
    }

    fn is_descendant_of(&self, id: SurfaceId, ancestor: SurfaceId) -> bool {
        Scene::is_descendant_of(self, id, ancestor)
    }
}
