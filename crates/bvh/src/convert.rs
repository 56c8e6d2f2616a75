//! glam <-> parry3d (nalgebra) conversions.

use glam::Vec3;
use parry3d::math::{Isometry, Point, Real, Vector};

pub(crate) fn point(v: Vec3) -> Point<Real> {
    Point::new(v.x, v.y, v.z)
}

pub(crate) fn vector(v: Vec3) -> Vector<Real> {
    Vector::new(v.x, v.y, v.z)
}

pub(crate) fn translation(v: Vec3) -> Isometry<Real> {
    Isometry::translation(v.x, v.y, v.z)
}

pub(crate) fn vec3_from_point(p: &Point<Real>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

pub(crate) fn vec3_from_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}
