use cgmath::{InnerSpace, Matrix4, Point3, Vector3};

use crate::EPSILON;

/// A ray in 3D space: an origin point and a normalized direction.
#[derive(Debug, Copy, Clone)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
}

impl Ray {
    /// Creates a ray; the direction is normalized on construction.
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// The point at parameter `t` along the ray.
    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }

    /// Maps the ray through a 4x4 transform: the origin as a point (w = 1),
    /// the direction as a vector (w = 0), re-normalized. This is how a
    /// world-space ray is brought into a node's local space for narrow-phase
    /// testing.
    pub fn transform(&self, matrix: &Matrix4<f32>) -> Self {
        let origin = Point3::from_homogeneous(matrix * self.origin.to_homogeneous());
        let direction = (matrix * self.direction.extend(0.0)).truncate();
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Double-sided Moller-Trumbore ray/triangle intersection.
    ///
    /// Returns `Some((t, u, v))` on a hit in front of the ray origin, where
    /// `t` is the ray parameter and `(u, v)` are barycentric coordinates
    /// (the third coordinate is `1 - u - v`). Returns `None` for misses,
    /// parallel rays, and hits behind the origin.
    pub fn intersect_triangle(
        &self,
        v0: Point3<f32>,
        v1: Point3<f32>,
        v2: Point3<f32>,
    ) -> Option<(f32, f32, f32)> {
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = self.direction.cross(edge2);
        let det = edge1.dot(h);
        if det.abs() < EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let s = self.origin - v0;
        let u = inv_det * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = inv_det * self.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = inv_det * edge2.dot(q);
        if t > EPSILON {
            Some((t, u, v))
        } else {
            None
        }
    }
}
