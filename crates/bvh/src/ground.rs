use glam::Vec3;
use parkour_common::SurfaceId;

use crate::config::GroundProbeConfig;
use crate::manager::BvhManager;
use crate::query::Ray;

/// Ground found beneath a character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundContact {
    pub surface: SurfaceId,
    /// World Y of the ground.
    pub height: f32,
    pub normal: Vec3,
    /// Feet height above the ground; negative when the feet are below it.
    pub distance: f32,
    /// Whether the slope is shallow enough to stand on.
    pub walkable: bool,
}

impl GroundContact {
    /// Within `tolerance` of the ground and on a walkable slope.
    pub fn is_grounded(&self, tolerance: f32) -> bool {
        self.walkable && self.distance <= tolerance
    }
}

/// Downward probe used for ground detection.
///
/// The ray starts `ray_offset` above the feet so a character that has
/// sunk slightly into the floor still finds it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundProbe {
    pub ray_offset: f32,
    pub max_distance: f32,
    min_normal_y: f32,
}

impl GroundProbe {
    pub fn new(ray_offset: f32, max_distance: f32, max_slope_degrees: f32) -> Self {
        Self {
            ray_offset,
            max_distance,
            min_normal_y: max_slope_degrees.to_radians().cos(),
        }
    }

    pub fn from_config(config: &GroundProbeConfig) -> Self {
        Self::new(
            config.ray_offset,
            config.max_distance,
            config.max_slope_degrees,
        )
    }

    /// Steepest walkable slope, in degrees.
    pub fn max_slope_degrees(&self) -> f32 {
        self.min_normal_y.acos().to_degrees()
    }

    pub fn probe(&self, bvh: &BvhManager, feet: Vec3) -> Option<GroundContact> {
        let origin = feet + Vec3::Y * self.ray_offset;
        let hit = bvh.raycast(&Ray::down(origin), self.max_distance + self.ray_offset)?;
        Some(GroundContact {
            surface: hit.surface,
            height: hit.point.y,
            normal: hit.normal,
            distance: feet.y - hit.point.y,
            walkable: hit.normal.y >= self.min_normal_y - f32::EPSILON,
        })
    }
}

impl Default for GroundProbe {
    fn default() -> Self {
        Self::from_config(&GroundProbeConfig::default())
    }
}
