//! Kinema Core - scene-side contracts consumed by the renderer.
//!
//! This crate provides:
//!
//! - **Scene types**: `Scene`, `Instance`, `Material`, `Mesh`
//! - **Light records**: `LightData`, the tagged, GPU-staged light descriptor
//! - **Frame view**: `SceneView`, a borrowed handle valid for one render pass
//!
//! # Example
//!
//! ```ignore
//! use kinema_core::{LightData, Material, Mesh, Scene};
//!
//! let mut scene = Scene::new("bench");
//! let mesh = scene.add_mesh(Mesh::quad(2.0, 2.0))?;
//! let mat = scene.add_material(Material::default());
//! let lamp = scene.add_instance(Some(mesh), mat, transform)?;
//! scene.register_light(LightData::rect(lamp, Color::ONE, 10.0, 2.0, 2.0))?;
//! ```

pub mod error;
pub mod light;
pub mod mesh;
pub mod scene;
pub mod view;

// Re-export commonly used types
pub use error::{SceneError, SceneResult};
pub use light::{LightData, LightType, INVALID_ID};
pub use mesh::Mesh;
pub use scene::{Instance, InstanceId, Material, MaterialId, MeshId, Scene};
pub use view::SceneView;
