//! Math support types shared across the trellis engine crates.
//!
//! Everything in this crate is pure math: no scene state, no IO. The scene
//! crate builds its caching and traversal machinery on top of these types.

mod aabb;
mod ray;
pub mod transform_ops;

pub use aabb::Aabb;
pub use ray::Ray;

/// Tolerance used for floating point comparisons and degeneracy checks.
pub const EPSILON: f32 = 1e-5;
