//! Errors raised while building or editing a scene.

use thiserror::Error;

/// Errors that can occur while registering scene content.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Unknown mesh id: {0}")]
    UnknownMesh(u32),

    #[error("Unknown material id: {0}")]
    UnknownMaterial(u32),

    #[error("Unknown instance id: {0}")]
    UnknownInstance(u32),

    #[error("Light record has no valid type or owner (type {light_type}, instance {instance_id})")]
    InvalidLight { light_type: u32, instance_id: u32 },

    #[error("Triangle {triangle} references vertex {index}, mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("Index count {0} is not a multiple of 3")]
    RaggedIndices(usize),
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
