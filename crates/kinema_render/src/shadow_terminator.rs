//! Shadow-terminator correction for secondary-ray origins.
//!
//! Low-poly meshes with interpolated normals self-shadow in hard steps at
//! the light/shadow boundary. Following Hanika (2021), the origin of rays
//! leaving a hit point is lifted onto the implicit curved surface suggested
//! by the vertex normals. The stored hit position, depth and normal are
//! never modified.

use kinema_math::Vec3;

/// Distance secondary rays are pushed off the surface.
pub const RAY_EPSILON: f32 = 1.0e-4;

/// Corrected position for `x`, a point on the triangle with barycentric
/// coordinates `bary` (weights of vertices 0, 1 and 2).
pub fn shadow_terminator(x: Vec3, positions: [Vec3; 3], normals: [Vec3; 3], bary: Vec3) -> Vec3 {
    let mut offset = Vec3::ZERO;
    for ((p, n), b) in positions.iter().zip(normals.iter()).zip(bary.to_array()) {
        let mut tmp = x - *p;
        // Only the part below the vertex's tangent plane is removed
        let d = tmp.dot(*n).min(0.0);
        tmp -= d * *n;
        offset += b * tmp;
    }
    x + offset
}

/// Push `p` off the surface with geometric normal `ng`, to the side `w` leaves on.
#[inline]
pub fn offset_ray_origin(p: Vec3, ng: Vec3, w: Vec3) -> Vec3 {
    let offset = ng * RAY_EPSILON * p.abs().max_element().max(1.0);
    if w.dot(ng) < 0.0 {
        p - offset
    } else {
        p + offset
    }
}
