use glam::{Affine3A, Mat3, Vec3};
use parkour_common::SurfaceId;
use parkour_scene::Geometry;
use parry3d::query::{self, Ray as LocalRay, RayCast, ShapeCastOptions};
use parry3d::shape::{Ball, FeatureId, TriMesh};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::convert;
use crate::error::BuildError;
use crate::query::{Ray, RayHit, SphereCast, SphereHit};

/// World matrices with a smaller determinant are treated as singular.
const MIN_DETERMINANT: f32 = 1e-12;

/// Content hash of a geometry's vertex and index data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryHash(pub [u8; 32]);

impl GeometryHash {
    pub fn of(geometry: &Geometry) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytemuck::cast_slice::<[f32; 3], u8>(&geometry.positions));
        match &geometry.indices {
            Some(indices) => {
                hasher.update([1u8]);
                hasher.update(bytemuck::cast_slice::<[u32; 3], u8>(indices));
            }
            None => hasher.update([0u8]),
        }
        GeometryHash(hasher.finalize().into())
    }

    /// Lowercase hex digest.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for GeometryHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 bytes are enough to tell structures apart in logs.
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// World-space axis-aligned bounds of a registered surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl WorldBounds {
    /// Bounds of a local box after transforming all eight corners.
    pub fn from_local(min: Vec3, max: Vec3, world: &Affine3A) -> Self {
        let mut out_min = Vec3::splat(f32::INFINITY);
        let mut out_max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            );
            let p = world.transform_point3(corner);
            out_min = out_min.min(p);
            out_max = out_max.max(p);
        }
        Self {
            min: out_min,
            max: out_max,
        }
    }

    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Slab test: distance along the ray at which it enters the box, if it
    /// does so within `max_distance`. A ray starting inside enters at 0.
    pub fn ray_entry(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        let inv = direction.recip();
        let t1 = (self.min - origin) * inv;
        let t2 = (self.max - origin) * inv;
        // NaN lanes (origin on a slab plane, zero direction) drop out of
        // min/max, leaving that axis unconstrained.
        let t_enter = t1.min(t2).max_element().max(0.0);
        let t_exit = t1.max(t2).min_element().min(max_distance);
        (t_enter <= t_exit).then_some(t_enter)
    }

    /// Whether a sphere touches the box.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        center.clamp(self.min, self.max).distance_squared(center) <= radius * radius
    }
}

/// One registered surface: its acceleration structure and cached transforms.
#[derive(Debug, Clone)]
pub struct BvhEntry {
    shape: Arc<TriMesh>,
    hash: GeometryHash,
    triangle_count: usize,
    local_min: Vec3,
    local_max: Vec3,
    world: Affine3A,
    inverse: Affine3A,
    normal_matrix: Mat3,
    bounds: WorldBounds,
}

impl BvhEntry {
    pub(crate) fn new(
        id: SurfaceId,
        shape: Arc<TriMesh>,
        geometry: &Geometry,
        hash: GeometryHash,
        world: Affine3A,
    ) -> Result<Self, BuildError> {
        let (local_min, local_max) = geometry
            .local_bounds()
            .ok_or(BuildError::MissingGeometry(id))?;
        let mut entry = Self {
            shape,
            hash,
            triangle_count: geometry.triangle_count(),
            local_min,
            local_max,
            world: Affine3A::IDENTITY,
            inverse: Affine3A::IDENTITY,
            normal_matrix: Mat3::IDENTITY,
            bounds: WorldBounds {
                min: local_min,
                max: local_max,
            },
        };
        entry.set_world(id, world)?;
        Ok(entry)
    }

    /// Replace the cached world matrix and everything derived from it.
    /// A singular matrix leaves the entry untouched.
    pub(crate) fn set_world(&mut self, id: SurfaceId, world: Affine3A) -> Result<(), BuildError> {
        let det = world.matrix3.determinant();
        if !det.is_finite() || det.abs() < MIN_DETERMINANT || !world.translation.is_finite() {
            return Err(BuildError::SingularTransform(id));
        }
        self.world = world;
        self.inverse = world.inverse();
        self.normal_matrix = Mat3::from(self.inverse.matrix3).transpose();
        self.bounds = WorldBounds::from_local(self.local_min, self.local_max, &world);
        Ok(())
    }

    pub fn hash(&self) -> GeometryHash {
        self.hash
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    pub fn world_matrix(&self) -> &Affine3A {
        &self.world
    }

    pub fn inverse_matrix(&self) -> &Affine3A {
        &self.inverse
    }

    pub fn world_bounds(&self) -> &WorldBounds {
        &self.bounds
    }

    pub(crate) fn shape(&self) -> &Arc<TriMesh> {
        &self.shape
    }

    /// Largest factor by which the inverse matrix stretches any axis.
    fn inverse_max_scale(&self) -> f32 {
        let m = &self.inverse.matrix3;
        m.x_axis.length().max(m.y_axis.length()).max(m.z_axis.length())
    }

    /// Map a local normal to world space, oriented against `against`.
    fn normal_to_world(&self, local: Vec3, against: Vec3) -> Vec3 {
        let n = (self.normal_matrix * local).normalize_or_zero();
        if n.dot(against) > 0.0 { -n } else { n }
    }

    /// Nearest hit of a world ray, tested in local space.
    ///
    /// The local direction is left unnormalized so the library's
    /// time-of-impact is the world distance along the unit world ray.
    pub(crate) fn cast_ray(
        &self,
        surface: SurfaceId,
        ray: &Ray,
        max_distance: f32,
    ) -> Option<RayHit> {
        let origin = self.inverse.transform_point3(ray.origin);
        let direction = self.inverse.transform_vector3(ray.direction);
        let local = LocalRay::new(convert::point(origin), convert::vector(direction));
        let hit = self
            .shape
            .cast_local_ray_and_get_normal(&local, max_distance, false)?;

        let point = ray.at(hit.time_of_impact);
        let triangle = match hit.feature {
            FeatureId::Face(i) if self.triangle_count > 0 => {
                // Back-face hits are reported past the triangle count.
                Some(i % self.triangle_count as u32)
            }
            _ => None,
        };
        Some(RayHit {
            surface,
            point,
            normal: self.normal_to_world(convert::vec3_from_vector(&hit.normal), ray.direction),
            distance: ray.origin.distance(point),
            triangle,
        })
    }

    /// First contact of a swept sphere, tested in local space.
    ///
    /// The radius is scaled by the inverse's largest axis stretch, so under
    /// non-uniform scale the local sphere bounds the true ellipsoid.
    pub(crate) fn cast_sphere(&self, surface: SurfaceId, cast: &SphereCast) -> Option<SphereHit> {
        let center = self.inverse.transform_point3(cast.origin);
        let velocity = self.inverse.transform_vector3(cast.direction);
        let ball = Ball::new(cast.radius * self.inverse_max_scale());
        let options = ShapeCastOptions {
            stop_at_penetration: true,
            ..ShapeCastOptions::with_max_time_of_impact(cast.max_distance)
        };

        let hit = match query::cast_shapes(
            &convert::translation(center),
            &convert::vector(velocity),
            &ball,
            &parry3d::math::Isometry::identity(),
            &parry3d::math::Vector::zeros(),
            self.shape.as_ref(),
            options,
        ) {
            Ok(hit) => hit?,
            Err(err) => {
                tracing::debug!(surface = %surface.short(), ?err, "sphere cast unsupported");
                return None;
            }
        };

        let distance = hit.time_of_impact.max(0.0);
        let local_normal = convert::vec3_from_vector(&hit.normal2);
        Some(SphereHit {
            surface,
            center: cast.origin + cast.direction * distance,
            point: self
                .world
                .transform_point3(convert::vec3_from_point(&hit.witness2)),
            normal: self.normal_to_world(local_normal, cast.direction),
            distance,
        })
    }

    /// Whether a static world sphere touches any triangle.
    pub(crate) fn intersects_sphere(&self, surface: SurfaceId, center: Vec3, radius: f32) -> bool {
        let local = self.inverse.transform_point3(center);
        let ball = Ball::new(radius * self.inverse_max_scale());
        match query::intersection_test(
            &convert::translation(local),
            &ball,
            &parry3d::math::Isometry::identity(),
            self.shape.as_ref(),
        ) {
            Ok(hit) => hit,
            Err(err) => {
                tracing::debug!(surface = %surface.short(), ?err, "overlap test unsupported");
                false
            }
        }
    }
}

/// Build the library's triangle mesh (and its internal BVH) from validated geometry.
pub(crate) fn build_trimesh(id: SurfaceId, geometry: &Geometry) -> Result<TriMesh, BuildError> {
    let vertices = geometry
        .positions
        .iter()
        .map(|p| convert::point(Vec3::from_array(*p)))
        .collect();
    TriMesh::new(vertices, geometry.triangles()).map_err(|e| BuildError::Construction {
        id,
        reason: format!("{e:?}"),
    })
}
