//! Tagged light descriptors.
//!
//! A `LightData` record is written when a light-emitting instance is
//! registered, stays immutable for the frame and is overwritten with
//! [`LightData::INVALID`] when its owner is removed. The struct layout is
//! mirrored by the WGSL `LightData` struct.

use kinema_math::{Color, Vec2};

/// Sentinel marking an unset light type or owner.
pub const INVALID_ID: u32 = u32::MAX;

/// Light kinds understood by the renderer.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Sphere light; `size.x` is the radius (0 = ideal point).
    Point = 0,
    /// Planar rectangle in the owner's local XY plane, emitting along +Z;
    /// `size` is width x height.
    Rect = 1,
    /// Direction-independent ambient radiance.
    Constant = 2,
}

impl LightType {
    /// Decode a raw tag; `None` for the sentinel or unknown values.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Point),
            1 => Some(Self::Rect),
            2 => Some(Self::Constant),
            _ => None,
        }
    }
}

/// Light descriptor staged to the GPU.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightData {
    pub light_type: u32,
    /// Owning instance id
    pub instance_id: u32,
    /// Radius for point lights, width x height for rectangle lights
    pub size: [f32; 2],
    /// Linear RGB color
    pub color: [f32; 3],
    /// Scalar gain applied to `color`
    pub intensity: f32,
}

impl LightData {
    /// An empty slot.
    pub const INVALID: LightData = LightData {
        light_type: INVALID_ID,
        instance_id: INVALID_ID,
        size: [0.0; 2],
        color: [0.0; 3],
        intensity: 0.0,
    };

    /// Create a light record of the given kind.
    pub fn new(kind: LightType, instance_id: u32, color: Color, intensity: f32, size: Vec2) -> Self {
        Self {
            light_type: kind as u32,
            instance_id,
            size: size.to_array(),
            color: color.to_array(),
            intensity,
        }
    }

    /// Sphere light of the given radius centered on the owner's origin.
    pub fn point(instance_id: u32, color: Color, intensity: f32, radius: f32) -> Self {
        Self::new(LightType::Point, instance_id, color, intensity, Vec2::new(radius, 0.0))
    }

    /// Rectangle light of `width` x `height` in the owner's local XY plane.
    pub fn rect(instance_id: u32, color: Color, intensity: f32, width: f32, height: f32) -> Self {
        Self::new(LightType::Rect, instance_id, color, intensity, Vec2::new(width, height))
    }

    /// Ambient light.
    pub fn constant(instance_id: u32, color: Color, intensity: f32) -> Self {
        Self::new(LightType::Constant, instance_id, color, intensity, Vec2::ZERO)
    }

    /// True when both the type and the owning instance are set.
    #[inline]
    pub fn valid(&self) -> bool {
        self.light_type != INVALID_ID && self.instance_id != INVALID_ID
    }

    /// Decoded light kind; `None` when the record is invalid or unknown.
    pub fn kind(&self) -> Option<LightType> {
        if !self.valid() {
            return None;
        }
        LightType::from_raw(self.light_type)
    }

    #[inline]
    pub fn color(&self) -> Color {
        Color::from_array(self.color)
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        Vec2::from_array(self.size)
    }

    /// `intensity * color`
    #[inline]
    pub fn radiance(&self) -> Color {
        self.intensity * self.color()
    }
}

impl Default for LightData {
    fn default() -> Self {
        Self::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sentinel() {
        assert!(!LightData::INVALID.valid());
        assert!(!LightData::default().valid());
        assert_eq!(LightData::INVALID.kind(), None);
    }

    #[test]
    fn test_valid_requires_type_and_owner() {
        let light = LightData::point(3, Color::ONE, 2.0, 0.1);
        assert!(light.valid());
        assert_eq!(light.kind(), Some(LightType::Point));

        let orphan = LightData {
            instance_id: INVALID_ID,
            ..light
        };
        assert!(!orphan.valid());

        let untyped = LightData {
            light_type: INVALID_ID,
            ..light
        };
        assert!(!untyped.valid());
    }

    #[test]
    fn test_unknown_type_has_no_kind() {
        let light = LightData {
            light_type: 7,
            ..LightData::constant(0, Color::ONE, 1.0)
        };
        assert!(light.valid());
        assert_eq!(light.kind(), None);
    }

    #[test]
    fn test_radiance() {
        let light = LightData::rect(1, Color::new(1.0, 0.5, 0.25), 4.0, 2.0, 3.0);
        assert_eq!(light.radiance(), Color::new(4.0, 2.0, 1.0));
        assert_eq!(light.size(), Vec2::new(2.0, 3.0));
    }

    #[test]
    fn test_gpu_layout_size() {
        assert_eq!(std::mem::size_of::<LightData>(), 32);
    }
}
