// Per-instance transform record
//
// One `TransformData` lives per scene object. The layout is shared verbatim
// with the WGSL `TransformData` struct, so it is staged into storage buffers
// with `bytemuck::cast_slice` and never reordered.

use glam::{Mat4, Quat, Vec3};

/// GPU-resident instance transform.
///
/// Holds the current local-to-world matrix, its inverse, the matrix of the
/// previous frame (for motion vectors) and the decomposed rotation and
/// non-uniform scale.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformData {
    pub matrix: [[f32; 4]; 4],
    pub inverse: [[f32; 4]; 4],
    pub prev_matrix: [[f32; 4]; 4],
    /// Quaternion as (x, y, z, w)
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub _pad: f32,
}

impl TransformData {
    /// Create a transform whose previous-frame matrix equals the current one.
    pub fn new(matrix: Mat4) -> Self {
        Self::from_parts(matrix, matrix)
    }

    /// Create from scale, rotation and translation (applied in SRT order).
    pub fn from_scale_rotation_translation(scale: Vec3, rotation: Quat, translation: Vec3) -> Self {
        Self::new(Mat4::from_scale_rotation_translation(scale, rotation, translation))
    }

    fn from_parts(matrix: Mat4, prev: Mat4) -> Self {
        // Singular matrices (zero scale) keep a zero inverse, identity
        // rotation and zero scale instead of NaNs.
        let (inverse, scale, rotation) = if matrix.determinant().abs() > f32::EPSILON {
            let (scale, rotation, _) = matrix.to_scale_rotation_translation();
            let rotation = if rotation.is_finite() { rotation } else { Quat::IDENTITY };
            (matrix.inverse(), scale, rotation)
        } else {
            (Mat4::ZERO, Vec3::ZERO, Quat::IDENTITY)
        };
        Self {
            matrix: matrix.to_cols_array_2d(),
            inverse: inverse.to_cols_array_2d(),
            prev_matrix: prev.to_cols_array_2d(),
            rotation: rotation.to_array(),
            scale: scale.to_array(),
            _pad: 0.0,
        }
    }

    /// Move to a new matrix for this frame; the old matrix becomes the previous one.
    pub fn update(&mut self, matrix: Mat4) {
        *self = Self::from_parts(matrix, self.matrix());
    }

    /// Start a frame without movement: previous matrix catches up with the current one.
    pub fn settle(&mut self) {
        self.prev_matrix = self.matrix;
    }

    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.matrix)
    }

    #[inline]
    pub fn inverse(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.inverse)
    }

    #[inline]
    pub fn prev_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.prev_matrix)
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation)
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        Vec3::from_array(self.scale)
    }

    /// Local point to world space.
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.matrix().transform_point3(p)
    }

    /// Local direction to world space (translation ignored).
    #[inline]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.matrix().transform_vector3(v)
    }

    /// Local normal to world space using the inverse transpose.
    pub fn transform_normal(&self, n: Vec3) -> Vec3 {
        self.inverse()
            .transpose()
            .transform_vector3(n)
            .normalize_or_zero()
    }

    /// World-space displacement of a local point since the previous frame.
    pub fn motion_vector(&self, local: Vec3) -> Vec3 {
        self.matrix().transform_point3(local) - self.prev_matrix().transform_point3(local)
    }
}

impl Default for TransformData {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}
