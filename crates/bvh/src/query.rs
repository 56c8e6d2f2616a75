use glam::Vec3;
use parkour_common::SurfaceId;

/// A world-space ray with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Build a ray, normalizing `direction`. A zero direction yields a ray
    /// that never hits anything.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Straight down from `origin`.
    pub fn down(origin: Vec3) -> Self {
        Self::new(origin, Vec3::NEG_Y)
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.origin.is_finite() && self.direction != Vec3::ZERO && self.direction.is_finite()
    }
}

/// Nearest intersection of a ray with one surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub surface: SurfaceId,
    /// World-space hit point.
    pub point: Vec3,
    /// World-space unit normal, facing back along the ray.
    pub normal: Vec3,
    /// Euclidean distance from the ray origin to `point`.
    pub distance: f32,
    /// Index of the triangle hit, when the library reports it.
    pub triangle: Option<u32>,
}

/// A sphere swept along a direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereCast {
    /// Sphere center at the start of the sweep.
    pub origin: Vec3,
    pub direction: Vec3,
    pub radius: f32,
    pub max_distance: f32,
}

impl SphereCast {
    pub fn new(origin: Vec3, direction: Vec3, radius: f32, max_distance: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            radius,
            max_distance,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.origin.is_finite()
            && self.direction != Vec3::ZERO
            && self.direction.is_finite()
            && self.radius > 0.0
            && self.max_distance >= 0.0
    }
}

/// First contact of a swept sphere with one surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereHit {
    pub surface: SurfaceId,
    /// Sphere center at the moment of contact.
    pub center: Vec3,
    /// World-space contact point on the surface.
    pub point: Vec3,
    /// World-space unit surface normal, facing against the sweep.
    pub normal: Vec3,
    /// Distance the center travelled before contact; 0 when the sphere
    /// starts out penetrating.
    pub distance: f32,
}
