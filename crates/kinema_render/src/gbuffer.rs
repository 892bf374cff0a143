//! Per-pixel G-buffer channels written by the shading pass.
//!
//! Every channel stores 4-component texels so the layout matches the GPU
//! storage buffers one to one. The radiance target is not owned: it is a
//! [`FrameBufferView`] borrowed from the presentation layer for one frame.

use kinema_math::{Color, Vec3};

/// Id written for pixels whose primary ray escaped.
pub const NO_HIT: u32 = u32::MAX;

/// Values resolved for one pixel's primary hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GBufferSample {
    pub base_color: Color,
    pub normal: Vec3,
    /// Depth normalised to `[0, 1]` against the far plane
    pub depth: f32,
    pub instance_id: u32,
    pub material_id: u32,
}

/// Borrowed RGBA frame buffer, valid for the duration of one frame's render pass.
#[derive(Debug)]
pub struct FrameBufferView<'fb> {
    pixels: &'fb mut [[f32; 4]],
    width: u32,
    height: u32,
}

impl<'fb> FrameBufferView<'fb> {
    /// Wrap `pixels`; `None` if its length is not `width * height`.
    pub fn new(pixels: &'fb mut [[f32; 4]], width: u32, height: u32) -> Option<Self> {
        if pixels.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        self.pixels
    }
}

/// G-buffer for a `width` x `height` image.
#[derive(Debug)]
pub struct GBuffer<'fb> {
    width: u32,
    height: u32,
    base_color: Vec<[f32; 4]>,
    normal: Vec<[f32; 4]>,
    depth: Vec<[f32; 4]>,
    instance_id: Vec<[u32; 4]>,
    material_id: Vec<[u32; 4]>,
    frame: Option<FrameBufferView<'fb>>,
}

impl GBuffer<'static> {
    /// Create a G-buffer without a radiance target.
    pub fn new(width: u32, height: u32) -> Self {
        GBuffer::allocate(width, height, None)
    }
}

impl<'fb> GBuffer<'fb> {
    /// Create a G-buffer that writes radiance into `frame`.
    pub fn with_frame_buffer(frame: FrameBufferView<'fb>) -> Self {
        Self::allocate(frame.width, frame.height, Some(frame))
    }

    fn allocate(width: u32, height: u32, frame: Option<FrameBufferView<'fb>>) -> Self {
        let len = (width as usize) * (height as usize);
        Self {
            width,
            height,
            base_color: vec![[0.0; 4]; len],
            normal: vec![[0.0; 4]; len],
            depth: vec![[1.0, 0.0, 0.0, 0.0]; len],
            instance_id: vec![[NO_HIT, 0, 0, 0]; len],
            material_id: vec![[NO_HIT, 0, 0, 0]; len],
            frame,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height, "pixel ({}, {}) out of range", x, y);
        (y * self.width + x) as usize
    }

    /// Reset a pixel to "no hit": background color, far depth and sentinel ids.
    pub fn set_default(&mut self, x: u32, y: u32, background: Color) {
        let i = self.index(x, y);
        self.base_color[i] = background.extend(1.0).to_array();
        self.normal[i] = background.extend(0.0).to_array();
        self.depth[i] = [1.0, 0.0, 0.0, 0.0];
        self.instance_id[i] = [NO_HIT, 0, 0, 0];
        self.material_id[i] = [NO_HIT, 0, 0, 0];
    }

    /// Store a resolved primary hit.
    pub fn write(&mut self, x: u32, y: u32, sample: &GBufferSample) {
        let i = self.index(x, y);
        self.base_color[i] = sample.base_color.extend(1.0).to_array();
        self.normal[i] = sample.normal.extend(0.0).to_array();
        self.depth[i] = [sample.depth, 0.0, 0.0, 0.0];
        self.instance_id[i] = [sample.instance_id, 0, 0, 0];
        self.material_id[i] = [sample.material_id, 0, 0, 0];
    }

    /// Write shaded radiance into the borrowed frame buffer, if one is attached.
    pub fn write_radiance(&mut self, x: u32, y: u32, radiance: Color) {
        let i = self.index(x, y);
        if let Some(frame) = self.frame.as_mut() {
            frame.pixels[i] = radiance.extend(1.0).to_array();
        }
    }

    /// Reset every pixel to the background.
    pub fn clear(&mut self, background: Color) {
        for y in 0..self.height {
            for x in 0..self.width {
                self.set_default(x, y, background);
                self.write_radiance(x, y, background);
            }
        }
    }

    /// Read back one pixel.
    pub fn sample(&self, x: u32, y: u32) -> GBufferSample {
        let i = self.index(x, y);
        let [r, g, b, _] = self.base_color[i];
        let [nx, ny, nz, _] = self.normal[i];
        GBufferSample {
            base_color: Color::new(r, g, b),
            normal: Vec3::new(nx, ny, nz),
            depth: self.depth[i][0],
            instance_id: self.instance_id[i][0],
            material_id: self.material_id[i][0],
        }
    }

    pub fn base_color(&self) -> &[[f32; 4]] {
        &self.base_color
    }

    pub fn normal(&self) -> &[[f32; 4]] {
        &self.normal
    }

    pub fn depth(&self) -> &[[f32; 4]] {
        &self.depth
    }

    pub fn instance_id(&self) -> &[[u32; 4]] {
        &self.instance_id
    }

    pub fn material_id(&self) -> &[[u32; 4]] {
        &self.material_id
    }

    /// Radiance written this frame, if a frame buffer is attached.
    pub fn frame_buffer(&self) -> Option<&[[f32; 4]]> {
        self.frame.as_ref().map(|f| f.pixels())
    }

    /// Mutable channel slices, in the order base color, normal, depth,
    /// instance id, material id.
    #[allow(clippy::type_complexity)]
    pub(crate) fn channels_mut(
        &mut self,
    ) -> (
        &mut [[f32; 4]],
        &mut [[f32; 4]],
        &mut [[f32; 4]],
        &mut [[u32; 4]],
        &mut [[u32; 4]],
    ) {
        (
            &mut self.base_color,
            &mut self.normal,
            &mut self.depth,
            &mut self.instance_id,
            &mut self.material_id,
        )
    }

    pub(crate) fn frame_buffer_mut(&mut self) -> Option<&mut [[f32; 4]]> {
        self.frame.as_mut().map(|f| &mut *f.pixels)
    }
}
