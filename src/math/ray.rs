//! Ray type and intersection tests

use crate::core::types::Vec3;
use super::aabb::Aabb;

/// Directions with a component smaller than this are treated as parallel to that axis
const PARALLEL_EPSILON: f32 = 1e-8;

/// A ray defined by origin and direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Precomputed 1/direction for fast AABB intersection
    pub inv_direction: Vec3,
}

/// Nearest intersection of a ray with a surface
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Distance along the ray
    pub t: f32,
    /// World-space hit point
    pub point: Vec3,
    /// Outward normal of the surface that was hit, facing the ray origin
    pub normal: Vec3,
}

impl Ray {
    /// Create a new ray (direction should be normalized)
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// Get point along ray at parameter t
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray-AABB overlap using the slab method.
    /// Returns Some((t_near, t_far)) if intersection, None otherwise
    pub fn intersects_aabb(&self, aabb: &Aabb) -> Option<(f32, f32)> {
        let t1 = (aabb.min - self.origin) * self.inv_direction;
        let t2 = (aabb.max - self.origin) * self.inv_direction;

        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let t_near = t_min.x.max(t_min.y).max(t_min.z);
        let t_far = t_max.x.min(t_max.y).min(t_max.z);

        if t_near <= t_far && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }

    /// Entry hit against the outside of an AABB, including the face normal.
    ///
    /// Boxes containing the origin are not hit, matching front-face-only picking.
    pub fn cast_aabb(&self, aabb: &Aabb) -> Option<RayHit> {
        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;
        let mut entry_axis = 0;

        for axis in 0..3 {
            let origin = self.origin[axis];
            let dir = self.direction[axis];

            if dir.abs() < PARALLEL_EPSILON {
                if origin < aabb.min[axis] || origin > aabb.max[axis] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / dir;
            let mut t0 = (aabb.min[axis] - origin) * inv;
            let mut t1 = (aabb.max[axis] - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }

            if t0 > t_near {
                t_near = t0;
                entry_axis = axis;
            }
            t_far = t_far.min(t1);
            if t_near > t_far {
                return None;
            }
        }

        if t_near < 0.0 {
            return None;
        }

        let mut normal = Vec3::ZERO;
        normal[entry_axis] = -self.direction[entry_axis].signum();

        Some(RayHit {
            t: t_near,
            point: self.at(t_near),
            normal,
        })
    }

    /// Double-sided plane hit; the returned normal faces the ray origin
    pub fn cast_plane(&self, point_on_plane: Vec3, normal: Vec3) -> Option<RayHit> {
        let denom = normal.dot(self.direction);
        if denom.abs() < PARALLEL_EPSILON {
            return None;
        }

        let t = (point_on_plane - self.origin).dot(normal) / denom;
        if t < 0.0 {
            return None;
        }

        Some(RayHit {
            t,
            point: self.at(t),
            normal: if denom < 0.0 { normal } else { -normal },
        })
    }
}
