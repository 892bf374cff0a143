//! World-space triangle primitive.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection.

use kinema_core::mesh::MeshTriangle;
use kinema_math::{Interval, Ray, TransformData, Vec3};

use crate::hittable::{HitRecord, Hittable};

/// A triangle placed in the world, tagged with the ids the G-buffer needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Vertices
    pub positions: [Vec3; 3],
    /// Per-vertex shading normals (unit length)
    pub normals: [Vec3; 3],
    /// Pre-computed face normal (unit length)
    pub normal: Vec3,
    pub instance_id: u32,
    pub material_id: u32,
}

impl Triangle {
    /// Create a triangle; `None` when it has no area.
    pub fn new(positions: [Vec3; 3], normals: [Vec3; 3], instance_id: u32, material_id: u32) -> Option<Self> {
        // Calculate edges
        let edge1 = positions[1] - positions[0];
        let edge2 = positions[2] - positions[0];

        // Calculate normal using cross product
        let normal = edge1.cross(edge2).try_normalize()?;
        let normals = normals.map(|n| n.try_normalize().unwrap_or(normal));

        Some(Self {
            positions,
            normals,
            normal,
            instance_id,
            material_id,
        })
    }

    /// Place a mesh triangle with an instance transform.
    pub fn from_mesh(
        tri: &MeshTriangle,
        transform: &TransformData,
        instance_id: u32,
        material_id: u32,
    ) -> Option<Self> {
        Self::new(
            tri.positions.map(|p| transform.transform_point(p)),
            tri.normals.map(|n| transform.transform_normal(n)),
            instance_id,
            material_id,
        )
    }

    /// Interpolated shading normal at barycentric weights `bary`.
    pub fn shading_normal(&self, bary: Vec3) -> Vec3 {
        (bary.x * self.normals[0] + bary.y * self.normals[1] + bary.z * self.normals[2])
            .try_normalize()
            .unwrap_or(self.normal)
    }

    /// Möller-Trumbore intersection returning `(t, u, v)`.
    pub fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<(f32, f32, f32)> {
        let [v0, v1, v2] = self.positions;
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = ray.direction().cross(edge2);
        let a = edge1.dot(h);

        // Ray is parallel to triangle
        if a.abs() < 1e-8 {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin() - v0;
        let u = f * s.dot(h);

        // Check if intersection is outside triangle (u parameter)
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction().dot(q);

        // Check if intersection is outside triangle (v parameter)
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        // Calculate t parameter
        let t = f * edge2.dot(q);
        if !ray_t.contains(t) {
            return None;
        }

        Some((t, u, v))
    }
}

impl Hittable for Triangle {
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
        let Some((t, u, v)) = self.intersect(ray, ray_t) else {
            return false;
        };

        // Valid intersection found
        let bary = Vec3::new(1.0 - u - v, u, v);
        rec.t = t;
        rec.p = ray.at(t);
        rec.barycentric = bary;
        rec.set_face_normal(ray, self.normal, self.shading_normal(bary));
        rec.instance_id = self.instance_id;
        rec.material_id = self.material_id;

        true
    }
}
