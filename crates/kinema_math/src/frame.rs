//! Orthonormal shading frames.

use crate::Vec3;

/// An orthonormal basis with `normal` as the local +Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub normal: Vec3,
}

impl Frame {
    /// Build a frame around a unit normal (Duff et al. 2017, branchless ONB).
    pub fn from_normal(n: Vec3) -> Self {
        let sign = if n.z >= 0.0 { 1.0 } else { -1.0 };
        let a = -1.0 / (sign + n.z);
        let b = n.x * n.y * a;

        let tangent = Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
        let bitangent = Vec3::new(b, sign + n.y * n.y * a, -n.y);

        Self {
            tangent,
            bitangent,
            normal: n,
        }
    }

    /// Build a frame whose tangent is the projection of `v` onto the plane of `n`.
    ///
    /// Falls back to [`Frame::from_normal`] when `v` is parallel to `n`.
    pub fn from_normal_and_view(n: Vec3, v: Vec3) -> Self {
        let projected = v - n * v.dot(n);
        if projected.length_squared() < 1e-12 {
            return Self::from_normal(n);
        }
        let tangent = projected.normalize();
        let bitangent = n.cross(tangent);
        Self {
            tangent,
            bitangent,
            normal: n,
        }
    }

    /// Express a world-space vector in this frame.
    #[inline]
    pub fn to_local(&self, v: Vec3) -> Vec3 {
        Vec3::new(v.dot(self.tangent), v.dot(self.bitangent), v.dot(self.normal))
    }

    /// Express a local vector in world space.
    #[inline]
    pub fn to_world(&self, v: Vec3) -> Vec3 {
        v.x * self.tangent + v.y * self.bitangent + v.z * self.normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_orthonormal(f: &Frame) {
        assert!(f.tangent.dot(f.normal).abs() < 0.001);
        assert!(f.bitangent.dot(f.normal).abs() < 0.001);
        assert!(f.tangent.dot(f.bitangent).abs() < 0.001);
        assert!((f.tangent.length() - 1.0).abs() < 0.001);
        assert!((f.bitangent.length() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_orthonormal_basis() {
        for n in [Vec3::Y, Vec3::Z, -Vec3::Z, Vec3::new(1.0, 2.0, -3.0).normalize()] {
            assert_orthonormal(&Frame::from_normal(n));
        }
    }

    #[test]
    fn test_round_trip() {
        let f = Frame::from_normal(Vec3::new(0.3, -0.4, 0.5).normalize());
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert!((f.to_world(f.to_local(v)) - v).length() < 1e-5);
        assert!((f.to_local(f.normal) - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_view_aligned_tangent() {
        let f = Frame::from_normal_and_view(Vec3::Z, Vec3::new(1.0, 0.0, 1.0).normalize());
        assert!((f.tangent - Vec3::X).length() < 1e-5);
        assert!((f.bitangent - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_view_parallel_to_normal_falls_back() {
        let f = Frame::from_normal_and_view(Vec3::Z, Vec3::Z);
        assert_orthonormal(&f);
    }
}
