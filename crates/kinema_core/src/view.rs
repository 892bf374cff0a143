//! Borrowed scene handle for a single render pass.

use kinema_math::{Mat4, TransformData};

use crate::light::LightData;
use crate::mesh::Mesh;
use crate::scene::{Instance, InstanceId, Material, MaterialId, MeshId, Scene};

/// Read-only view of a [`Scene`], valid for the duration of one frame's
/// render pass. The renderer never owns scene data; light strategies and
/// the integrator hold this handle instead.
#[derive(Clone, Copy, Debug)]
pub struct SceneView<'frame> {
    scene: &'frame Scene,
}

impl<'frame> SceneView<'frame> {
    pub fn new(scene: &'frame Scene) -> Self {
        Self { scene }
    }

    /// World transform of an instance; `None` when the id is not live.
    pub fn instance_transform(&self, id: InstanceId) -> Option<Mat4> {
        self.scene.instance_transform(id)
    }

    pub fn transform_data(&self, id: InstanceId) -> Option<&'frame TransformData> {
        self.scene.instance(id).map(|inst| &inst.transform)
    }

    pub fn instance(&self, id: InstanceId) -> Option<&'frame Instance> {
        self.scene.instance(id)
    }

    pub fn instances(&self) -> impl Iterator<Item = (InstanceId, &'frame Instance)> {
        self.scene.instances()
    }

    pub fn instance_slot_count(&self) -> usize {
        self.scene.instance_slot_count()
    }

    pub fn material(&self, id: MaterialId) -> Option<&'frame Material> {
        self.scene.material(id)
    }

    pub fn materials(&self) -> &'frame [Material] {
        self.scene.materials()
    }

    pub fn mesh(&self, id: MeshId) -> Option<&'frame Mesh> {
        self.scene.mesh(id).map(|m| m.as_ref())
    }

    pub fn lights(&self) -> &'frame [LightData] {
        self.scene.lights()
    }

    pub fn name(&self) -> &'frame str {
        &self.scene.name
    }
}
