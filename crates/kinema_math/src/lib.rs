// Re-export glam for convenience
pub use glam::*;

// Kinema math types
mod frame;
mod interval;
mod ray;
mod transform;

pub use frame::Frame;
pub use interval::Interval;
pub use ray::Ray;
pub use transform::TransformData;

/// Linear-space RGB color.
pub type Color = Vec3;
