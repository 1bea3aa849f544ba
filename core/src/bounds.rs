//! Bounding volumes derived from vertex position data.
//!
//! A [`BoundingBox`] is computed from a flat `x, y, z, x, y, z, ...` slice
//! of positions (the layout geometry collaborators hand to the graphics
//! layer) and stays consistent with the last-set position data. A
//! [`BoundingSphere`] is derived from the box for cheap overlap tests.

use crate::math::{transform_point, Mat4, Vec3};

/// Axis-aligned bounding box.
///
/// An empty box has `min > max` componentwise; [`BoundingBox::union`] and
/// [`BoundingBox::set_from_points`] treat it as an identity element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Componentwise minimum corner.
    pub min: Vec3,
    /// Componentwise maximum corner.
    pub max: Vec3,
}

impl BoundingBox {
    /// Create a bounding box from explicit corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an empty bounding box.
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// Compute the box of a flat `x, y, z` position slice.
    ///
    /// An empty slice (or one shorter than a full point) yields an empty box.
    pub fn from_points(points: &[f32]) -> Self {
        let mut bb = Self::empty();
        bb.set_from_points(points);
        bb
    }

    /// Recompute this box from a flat position slice, replacing its extents.
    pub fn set_from_points(&mut self, points: &[f32]) {
        *self = Self::empty();
        for p in points.chunks_exact(3) {
            self.expand(Vec3::new(p[0], p[1], p[2]));
        }
    }

    /// Grow the box to contain `point`.
    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// Grow the box to contain `other`.
    pub fn union(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        self.expand(other.min);
        self.expand(other.max);
    }

    /// Whether the box contains no points.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Center of the box.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half extents along each axis.
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Whether `point` lies inside the box (inclusive).
    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.y >= self.min.y
            && point.z >= self.min.z
            && point.x <= self.max.x
            && point.y <= self.max.y
            && point.z <= self.max.z
    }

    /// The eight corner points of the box.
    pub fn corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min, self.max);
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }

    /// Axis-aligned box containing this box transformed by `matrix`.
    pub fn transform(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::empty();
        for corner in self.corners() {
            out.expand(transform_point(matrix, corner));
        }
        out
    }

    /// Sphere enclosing the box.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        if self.is_empty() {
            return BoundingSphere::default();
        }
        BoundingSphere {
            center: self.center(),
            radius: self.half_extents().norm(),
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

/// Bounding sphere derived from a [`BoundingBox`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    /// Sphere center.
    pub center: Vec3,
    /// Sphere radius; zero or negative means empty.
    pub radius: f32,
}

impl BoundingSphere {
    /// Whether the sphere contains no points.
    pub fn is_empty(&self) -> bool {
        self.radius <= 0.0
    }

    /// Whether two spheres overlap.
    pub fn intersects(&self, other: &BoundingSphere) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let r = self.radius + other.radius;
        (self.center - other.center).norm_squared() <= r * r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_points_bounds_every_point() {
        let points = [1.0, -2.0, 3.0, -4.0, 5.0, 0.5, 2.0, 2.0, 2.0];
        let bb = BoundingBox::from_points(&points);
        for p in points.chunks_exact(3) {
            assert!(bb.contains(Vec3::new(p[0], p[1], p[2])));
        }
        assert_eq!(bb.min, Vec3::new(-4.0, -2.0, 0.5));
        assert_eq!(bb.max, Vec3::new(2.0, 5.0, 3.0));
    }

    #[test]
    fn empty_from_no_points() {
        let bb = BoundingBox::from_points(&[]);
        assert!(bb.is_empty());
        assert!(bb.bounding_sphere().is_empty());
    }

    #[test]
    fn set_from_points_replaces_extents() {
        let mut bb = BoundingBox::from_points(&[10.0, 10.0, 10.0, -10.0, -10.0, -10.0]);
        bb.set_from_points(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(bb.min, Vec3::zeros());
        assert_eq!(bb.max, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn union_with_empty_is_identity() {
        let mut bb = BoundingBox::from_points(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let before = bb;
        bb.union(&BoundingBox::empty());
        assert_eq!(bb, before);
    }

    #[test]
    fn union_extends_bounds() {
        let mut a = BoundingBox::from_points(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = BoundingBox::from_points(&[-1.0, 2.0, 0.0, 0.5, 0.5, 3.0]);
        a.union(&b);
        assert_eq!(a.min, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(a.max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn transform_translates_corners() {
        let bb = BoundingBox::from_points(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let m = crate::math::mat4_from_translation(Vec3::new(2.0, 0.0, 0.0));
        let moved = bb.transform(&m);
        assert_eq!(moved.min, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(moved.max, Vec3::new(3.0, 1.0, 1.0));
    }

    #[test]
    fn sphere_encloses_box() {
        let bb = BoundingBox::from_points(&[-1.0, -1.0, -1.0, 1.0, 1.0, 1.0]);
        let sphere = bb.bounding_sphere();
        assert_eq!(sphere.center, Vec3::zeros());
        assert!((sphere.radius - 3.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn sphere_overlap() {
        let a = BoundingSphere {
            center: Vec3::zeros(),
            radius: 1.0,
        };
        let b = BoundingSphere {
            center: Vec3::new(1.5, 0.0, 0.0),
            radius: 1.0,
        };
        let c = BoundingSphere {
            center: Vec3::new(3.0, 0.0, 0.0),
            radius: 0.5,
        };
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
