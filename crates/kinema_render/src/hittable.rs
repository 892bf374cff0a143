//! Hittable trait and HitRecord for ray-scene intersection.

use kinema_core::INVALID_ID;
use kinema_math::{Interval, Ray, Vec3};

/// Record of a ray-surface intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRecord {
    /// Point of intersection
    pub p: Vec3,
    /// Interpolated shading normal (always points against the ray)
    pub normal: Vec3,
    /// Face normal of the triangle (always points against the ray)
    pub geometric_normal: Vec3,
    /// Barycentric weights of vertices 0, 1 and 2
    pub barycentric: Vec3,
    /// Parameter t where the intersection occurs
    pub t: f32,
    pub instance_id: u32,
    pub material_id: u32,
    /// Index of the hit triangle in the scene geometry
    pub triangle: u32,
    /// Whether the ray hit the front face (outside) of the surface
    pub front_face: bool,
}

impl Default for HitRecord {
    fn default() -> Self {
        Self {
            p: Vec3::ZERO,
            normal: Vec3::ZERO,
            geometric_normal: Vec3::ZERO,
            barycentric: Vec3::ZERO,
            t: 0.0,
            instance_id: INVALID_ID,
            material_id: INVALID_ID,
            triangle: INVALID_ID,
            front_face: false,
        }
    }
}

impl HitRecord {
    /// Set the face normals based on ray direction and the outward normals.
    ///
    /// Both normals are stored pointing against the ray direction, so we
    /// need to track whether we hit the front or back face.
    pub fn set_face_normal(&mut self, ray: &Ray, outward_normal: Vec3, shading_normal: Vec3) {
        // If the ray and normal point in the same direction, we're inside
        self.front_face = ray.direction().dot(outward_normal) < 0.0;

        if self.front_face {
            self.geometric_normal = outward_normal;
            self.normal = shading_normal;
        } else {
            self.geometric_normal = -outward_normal;
            self.normal = -shading_normal;
        }
    }
}

/// Trait for objects that can be hit by rays.
pub trait Hittable: Send + Sync {
    /// Test if a ray hits this object within the given interval.
    ///
    /// Returns true if hit, and fills in the hit record.
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool;

    /// Test whether anything blocks the ray within the interval.
    fn occluded(&self, ray: &Ray, ray_t: Interval) -> bool {
        let mut rec = HitRecord::default();
        self.hit(ray, ray_t, &mut rec)
    }
}
