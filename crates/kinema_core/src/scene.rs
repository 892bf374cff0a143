//! Scene representation consumed by the renderer.
//!
//! The scene owns meshes, materials, instances and the light list. Instance
//! slots are stable: removing an instance leaves a hole so that ids held by
//! light records and G-buffers never alias a different object.

use std::sync::Arc;

use kinema_math::{Color, Mat4, TransformData};
use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};
use crate::light::{LightData, INVALID_ID};
use crate::mesh::Mesh;
use crate::view::SceneView;

pub type MeshId = u32;
pub type MaterialId = u32;
pub type InstanceId = u32;

/// Surface parameters looked up by material id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    /// Material name
    pub name: String,

    /// Base color (linear RGB, 0-1)
    pub base_color: Color,

    /// Roughness (0=smooth, 1=rough)
    pub roughness: f32,

    /// Metalness (0=dielectric, 1=metal)
    pub metalness: f32,

    /// Tint multiplied into the specular lobe
    pub specular_tint: Color,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: Color::new(0.5, 0.5, 0.5), // Grey default
            roughness: 0.5,
            metalness: 0.0,
            specular_tint: Color::ONE,
        }
    }
}

impl Material {
    /// Create a new material with just a name and base color.
    pub fn new(name: impl Into<String>, base_color: Color) -> Self {
        Self {
            name: name.into(),
            base_color,
            ..Default::default()
        }
    }

    /// Builder method to set roughness.
    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set metalness.
    pub fn with_metalness(mut self, metalness: f32) -> Self {
        self.metalness = metalness.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set the specular tint.
    pub fn with_specular_tint(mut self, tint: Color) -> Self {
        self.specular_tint = tint;
        self
    }
}

/// A placed object: optional mesh, material and per-frame transform.
///
/// Lights without geometry (point, ambient) are instances with no mesh.
#[derive(Clone, Debug)]
pub struct Instance {
    pub mesh: Option<MeshId>,
    pub material: MaterialId,
    pub transform: TransformData,
}

/// A complete scene containing meshes, materials, instances and lights.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    /// Scene name
    pub name: String,

    meshes: Vec<Arc<Mesh>>,
    materials: Vec<Material>,
    instances: Vec<Option<Instance>>,
    lights: Vec<LightData>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a mesh and return its id.
    pub fn add_mesh(&mut self, mesh: Mesh) -> SceneResult<MeshId> {
        mesh.validate()?;
        let id = self.meshes.len() as MeshId;
        log::debug!(
            "Scene '{}': mesh {} ({} triangles)",
            self.name,
            id,
            mesh.triangle_count()
        );
        self.meshes.push(Arc::new(mesh));
        Ok(id)
    }

    /// Add a material and return its id.
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = self.materials.len() as MaterialId;
        self.materials.push(material);
        id
    }

    /// Place a new instance.
    pub fn add_instance(
        &mut self,
        mesh: Option<MeshId>,
        material: MaterialId,
        matrix: Mat4,
    ) -> SceneResult<InstanceId> {
        if let Some(mesh_id) = mesh {
            if self.meshes.get(mesh_id as usize).is_none() {
                return Err(SceneError::UnknownMesh(mesh_id));
            }
        }
        if self.materials.get(material as usize).is_none() {
            return Err(SceneError::UnknownMaterial(material));
        }

        let id = self.instances.len() as InstanceId;
        self.instances.push(Some(Instance {
            mesh,
            material,
            transform: TransformData::new(matrix),
        }));
        Ok(id)
    }

    /// Remove an instance. Lights it owned are overwritten with the invalid record.
    pub fn remove_instance(&mut self, id: InstanceId) -> SceneResult<Instance> {
        let slot = self
            .instances
            .get_mut(id as usize)
            .ok_or(SceneError::UnknownInstance(id))?;
        let instance = slot.take().ok_or(SceneError::UnknownInstance(id))?;

        let mut dropped = 0;
        for light in self.lights.iter_mut().filter(|l| l.instance_id == id) {
            *light = LightData::INVALID;
            dropped += 1;
        }
        if dropped > 0 {
            log::info!("Removed instance {} and invalidated {} light(s)", id, dropped);
        }

        Ok(instance)
    }

    /// Register a light owned by an existing instance; returns its slot in the light list.
    ///
    /// Invalidated slots are reused before the list grows.
    pub fn register_light(&mut self, light: LightData) -> SceneResult<usize> {
        if light.kind().is_none() {
            return Err(SceneError::InvalidLight {
                light_type: light.light_type,
                instance_id: light.instance_id,
            });
        }
        if self.instance(light.instance_id).is_none() {
            return Err(SceneError::UnknownInstance(light.instance_id));
        }

        let slot = match self.lights.iter().position(|l| !l.valid()) {
            Some(free) => {
                self.lights[free] = light;
                free
            }
            None => {
                self.lights.push(light);
                self.lights.len() - 1
            }
        };
        log::info!(
            "Registered light {} (type {}) on instance {}",
            slot,
            light.light_type,
            light.instance_id
        );
        Ok(slot)
    }

    /// Move an instance for this frame.
    pub fn set_instance_matrix(&mut self, id: InstanceId, matrix: Mat4) -> SceneResult<()> {
        let instance = self
            .instances
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or(SceneError::UnknownInstance(id))?;
        instance.transform.update(matrix);
        Ok(())
    }

    /// Start a new frame: objects that do not move this frame get zero motion.
    pub fn begin_frame(&mut self) {
        for instance in self.instances.iter_mut().flatten() {
            instance.transform.settle();
        }
    }

    /// Borrow the scene for one render pass.
    pub fn view(&self) -> SceneView<'_> {
        SceneView::new(self)
    }

    /// Get an instance by id.
    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        if id == INVALID_ID {
            return None;
        }
        self.instances.get(id as usize)?.as_ref()
    }

    /// Iterate over live instances with their ids.
    pub fn instances(&self) -> impl Iterator<Item = (InstanceId, &Instance)> {
        self.instances
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|inst| (id as InstanceId, inst)))
    }

    /// World matrix of an instance.
    pub fn instance_transform(&self, id: InstanceId) -> Option<Mat4> {
        self.instance(id).map(|inst| inst.transform.matrix())
    }

    /// Get a mesh by id.
    pub fn mesh(&self, id: MeshId) -> Option<&Arc<Mesh>> {
        self.meshes.get(id as usize)
    }

    /// Get a material by id.
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id as usize)
    }

    /// All materials in id order.
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// The light list, including invalidated slots.
    pub fn lights(&self) -> &[LightData] {
        &self.lights
    }

    /// Number of instance slots, including removed ones.
    pub fn instance_slot_count(&self) -> usize {
        self.instances.len()
    }

    /// Get live instance count.
    pub fn instance_count(&self) -> usize {
        self.instances.iter().flatten().count()
    }

    /// Get total triangle count across all instances.
    pub fn total_triangle_count(&self) -> usize {
        self.instances()
            .filter_map(|(_, inst)| inst.mesh.and_then(|m| self.mesh(m)))
            .map(|mesh| mesh.triangle_count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinema_math::Vec3;

    fn lamp_scene() -> (Scene, InstanceId) {
        let mut scene = Scene::new("test");
        let quad = scene.add_mesh(Mesh::quad(2.0, 2.0)).unwrap();
        let mat = scene.add_material(Material::default());
        let lamp = scene
            .add_instance(Some(quad), mat, Mat4::from_translation(Vec3::Z * 5.0))
            .unwrap();
        (scene, lamp)
    }

    #[test]
    fn test_scene_creation() {
        let (mut scene, lamp) = lamp_scene();
        scene.add_instance(None, 0, Mat4::IDENTITY).unwrap();

        assert_eq!(scene.instance_count(), 2);
        assert_eq!(scene.total_triangle_count(), 2);
        let m = scene.instance_transform(lamp).unwrap();
        assert_eq!(m.transform_point3(Vec3::ZERO), Vec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn test_add_instance_rejects_unknown_ids() {
        let (mut scene, _) = lamp_scene();
        assert_eq!(
            scene.add_instance(Some(9), 0, Mat4::IDENTITY).unwrap_err(),
            SceneError::UnknownMesh(9)
        );
        assert_eq!(
            scene.add_instance(None, 4, Mat4::IDENTITY).unwrap_err(),
            SceneError::UnknownMaterial(4)
        );
    }

    #[test]
    fn test_register_light() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut scene, lamp) = lamp_scene();

        let slot = scene
            .register_light(LightData::rect(lamp, Color::ONE, 10.0, 2.0, 2.0))
            .unwrap();
        assert_eq!(slot, 0);
        assert!(scene.lights()[0].valid());

        let err = scene
            .register_light(LightData::point(42, Color::ONE, 1.0, 0.0))
            .unwrap_err();
        assert_eq!(err, SceneError::UnknownInstance(42));

        assert!(matches!(
            scene.register_light(LightData::INVALID),
            Err(SceneError::InvalidLight { .. })
        ));
    }

    #[test]
    fn test_remove_instance_invalidates_lights() {
        let (mut scene, lamp) = lamp_scene();
        scene
            .register_light(LightData::rect(lamp, Color::ONE, 10.0, 2.0, 2.0))
            .unwrap();

        scene.remove_instance(lamp).unwrap();
        assert!(!scene.lights()[0].valid());
        assert!(scene.instance(lamp).is_none());
        assert_eq!(
            scene.remove_instance(lamp).unwrap_err(),
            SceneError::UnknownInstance(lamp)
        );

        // The freed light slot is reused
        let bulb = scene.add_instance(None, 0, Mat4::IDENTITY).unwrap();
        let slot = scene
            .register_light(LightData::point(bulb, Color::ONE, 1.0, 0.1))
            .unwrap();
        assert_eq!(slot, 0);
        assert_ne!(bulb, lamp);
    }

    #[test]
    fn test_frame_motion() {
        let (mut scene, lamp) = lamp_scene();

        scene.begin_frame();
        scene
            .set_instance_matrix(lamp, Mat4::from_translation(Vec3::Z * 6.0))
            .unwrap();
        let t = scene.instance(lamp).unwrap().transform;
        assert!((t.motion_vector(Vec3::ZERO) - Vec3::Z).length() < 1e-5);

        scene.begin_frame();
        let t = scene.instance(lamp).unwrap().transform;
        assert_eq!(t.motion_vector(Vec3::ZERO), Vec3::ZERO);
    }

    #[test]
    fn test_material_builder_clamps() {
        let m = Material::new("steel", Color::splat(0.9))
            .with_metalness(2.0)
            .with_roughness(-1.0);
        assert_eq!(m.metalness, 1.0);
        assert_eq!(m.roughness, 0.0);
    }
}
