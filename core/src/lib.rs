//! # Glint Core
//!
//! GPU-independent math for the Glint engine: vector/matrix type aliases,
//! bounding volumes, and the ray–triangle intersection query used for
//! picking.

pub mod bounds;
pub mod intersect;
pub mod math;

pub use bounds::{BoundingBox, BoundingSphere};
pub use intersect::{ray_triangle, HitFilter, Ray, RayHit, EPSILON};
pub use math::{Mat4, Vec2, Vec3, Vec4};
