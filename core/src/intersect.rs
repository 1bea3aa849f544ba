//! Ray–triangle intersection (Möller–Trumbore).
//!
//! Stateless closed-form test used by the graphics layer for picking
//! queries. No plane intersection is computed first; the barycentric
//! coordinates and the ray parameter come straight out of the determinant
//! form described in Möller & Trumbore, "Fast, Minimum Storage
//! Ray/Triangle Intersection" (1997).

use crate::math::Vec3;

/// Tolerance below which a determinant counts as "ray parallel to the
/// triangle plane". Fixed, machine-epsilon scale.
pub const EPSILON: f32 = 1e-6;

/// A ray with origin and (not necessarily normalized) direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Ray origin.
    pub origin: Vec3,
    /// Ray direction. `t` is expressed in multiples of this vector.
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Point at parameter `t`: `origin + direction * t`.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A resolved intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Intersection point, `origin + direction * t`.
    pub position: Vec3,
    /// Ray parameter of the hit.
    pub t: f32,
}

/// Which hits along the ray are accepted.
///
/// The closed-form test yields negative `t` for triangles behind the ray
/// origin; whether those count as hits is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitFilter {
    /// Accept hits on both sides of the origin (`t` unrestricted).
    #[default]
    Bidirectional,
    /// Accept only hits in front of the origin (`t >= 0`).
    ForwardOnly,
}

impl HitFilter {
    /// Whether a hit at parameter `t` passes this filter.
    pub fn accepts(&self, t: f32) -> bool {
        match self {
            Self::Bidirectional => true,
            Self::ForwardOnly => t >= 0.0,
        }
    }
}

/// Intersect a ray with a single triangle.
///
/// Returns the ray parameter `t` of the intersection, or `None` when the
/// ray is parallel to the triangle plane or the intersection falls outside
/// the triangle. Backward hits (`t < 0`) are returned; filter them with
/// [`HitFilter`] if unwanted.
pub fn ray_triangle(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    // Determinant, also used for the u parameter.
    let pvec = ray.direction.cross(&edge2);
    let det = edge1.dot(&pvec);

    // Near-zero determinant: ray lies in the plane of the triangle.
    if det > -EPSILON && det < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = ray.origin - v0;
    let u = tvec.dot(&pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(&edge1);
    let v = ray.direction.dot(&qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    Some(edge2.dot(&qvec) * inv_det)
}
