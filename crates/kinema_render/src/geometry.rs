//! World-space triangle soup for one frame.
//!
//! Built from the borrowed scene view before shading starts: every mesh
//! instance is flattened through its `TransformData`, so shading never
//! touches local space.

use kinema_core::SceneView;
use kinema_math::{Interval, Ray};

use crate::hittable::{HitRecord, Hittable};
use crate::triangle::Triangle;

/// All triangles of the scene, transformed to world space.
#[derive(Debug, Clone, Default)]
pub struct SceneGeometry {
    triangles: Vec<Triangle>,
}

impl SceneGeometry {
    /// Flatten every live mesh instance of `scene`.
    pub fn build(scene: SceneView<'_>) -> Self {
        let mut triangles = Vec::new();
        let mut degenerate = 0usize;

        for (id, instance) in scene.instances() {
            let Some(mesh) = instance.mesh.and_then(|m| scene.mesh(m)) else {
                continue;
            };
            for tri in mesh.triangles() {
                match Triangle::from_mesh(&tri, &instance.transform, id, instance.material) {
                    Some(world) => triangles.push(world),
                    None => degenerate += 1,
                }
            }
        }

        if degenerate > 0 {
            log::warn!("Skipped {} degenerate triangle(s) in '{}'", degenerate, scene.name());
        }
        log::debug!("Built scene geometry: {} triangles", triangles.len());
        Self { triangles }
    }

    pub fn from_triangles(triangles: Vec<Triangle>) -> Self {
        Self { triangles }
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn triangle(&self, index: u32) -> Option<&Triangle> {
        self.triangles.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

impl Hittable for SceneGeometry {
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
        let mut hit_anything = false;
        let mut closest_so_far = ray_t.max;

        for (index, triangle) in self.triangles.iter().enumerate() {
            if triangle.hit(ray, ray_t.with_max(closest_so_far), rec) {
                hit_anything = true;
                closest_so_far = rec.t;
                rec.triangle = index as u32;
            }
        }

        hit_anything
    }

    fn occluded(&self, ray: &Ray, ray_t: Interval) -> bool {
        self.triangles
            .iter()
            .any(|triangle| triangle.intersect(ray, ray_t).is_some())
    }
}
