use cgmath::{Matrix4, Point3, Vector3};

use crate::{ray::Ray, EPSILON};

/// An axis-aligned bounding box in 3D space.
///
/// The box supports an explicit *empty* state (`min` above `max` on every
/// axis), which acts as the neutral element for [`Aabb::merge`] and
/// [`Aabb::expand`]. Group nodes with no geometry report empty bounds.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// Creates a bounding box from min and max corners.
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// Returns the empty bounding box: the neutral element for merging.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    /// True if the box encloses no volume at all (min above max on any axis).
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Builds the tightest box enclosing all given points, or the empty box
    /// for an empty slice.
    pub fn from_points(points: &[Point3<f32>]) -> Self {
        points.iter().fold(Self::empty(), |b, &p| b.expand(p))
    }

    /// Center of the box. Meaningless for empty boxes.
    pub fn center(&self) -> Point3<f32> {
        self.min + (self.max - self.min) * 0.5
    }

    /// Edge lengths of the box, or zero for empty boxes.
    pub fn size(&self) -> Vector3<f32> {
        if self.is_empty() {
            Vector3::new(0.0, 0.0, 0.0)
        } else {
            self.max - self.min
        }
    }

    /// The 8 corner points of the box.
    pub fn corners(&self) -> [Point3<f32>; 8] {
        [
            Point3::new(self.min.x, self.min.y, self.min.z),
            Point3::new(self.max.x, self.min.y, self.min.z),
            Point3::new(self.min.x, self.max.y, self.min.z),
            Point3::new(self.max.x, self.max.y, self.min.z),
            Point3::new(self.min.x, self.min.y, self.max.z),
            Point3::new(self.max.x, self.min.y, self.max.z),
            Point3::new(self.min.x, self.max.y, self.max.z),
            Point3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    /// Grows the box to include a point.
    pub fn expand(&self, point: Point3<f32>) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(point.x),
                self.min.y.min(point.y),
                self.min.z.min(point.z),
            ),
            max: Point3::new(
                self.max.x.max(point.x),
                self.max.y.max(point.y),
                self.max.z.max(point.z),
            ),
        }
    }

    /// The smallest box enclosing both boxes. Merging with an empty box
    /// returns the other box unchanged.
    pub fn merge(&self, other: &Aabb) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// True if the point lies inside or on the surface of the box.
    pub fn contains(&self, point: Point3<f32>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Maps the box through a 4x4 transform by transforming all 8 corners
    /// and re-fitting an axis-aligned box around them. Rotation and
    /// non-uniform scale therefore inflate the result conservatively.
    /// Empty boxes stay empty.
    pub fn transform(&self, matrix: &Matrix4<f32>) -> Self {
        if self.is_empty() {
            return Self::empty();
        }

        self.corners().iter().fold(Self::empty(), |b, corner| {
            let homogeneous = matrix * corner.to_homogeneous();
            b.expand(Point3::from_homogeneous(homogeneous))
        })
    }

    /// Slab-method ray test. Returns the parameter of the entry point, or
    /// `Some(0.0)` when the ray starts inside the box. Empty boxes are
    /// never hit.
    pub fn intersects_ray(&self, ray: &Ray) -> Option<f32> {
        if self.is_empty() {
            return None;
        }

        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;

        let origin: [f32; 3] = [ray.origin.x, ray.origin.y, ray.origin.z];
        let direction: [f32; 3] = [ray.direction.x, ray.direction.y, ray.direction.z];
        let lo: [f32; 3] = [self.min.x, self.min.y, self.min.z];
        let hi: [f32; 3] = [self.max.x, self.max.y, self.max.z];

        for axis in 0..3 {
            if direction[axis].abs() < EPSILON {
                // Parallel to this slab: must already be between the planes.
                if origin[axis] < lo[axis] || origin[axis] > hi[axis] {
                    return None;
                }
            } else {
                let inv = 1.0 / direction[axis];
                let mut t1 = (lo[axis] - origin[axis]) * inv;
                let mut t2 = (hi[axis] - origin[axis]) * inv;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                tmin = tmin.max(t1);
                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        if tmin >= 0.0 {
            Some(tmin)
        } else if tmax >= 0.0 {
            Some(0.0)
        } else {
            None
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}
