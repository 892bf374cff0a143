//! Image tiles for parallel rendering.
//!
//! A frame is cut into square buckets that rayon renders independently.
//! Buckets are ordered centre-out and written back into the G-buffer in
//! that order once every tile has finished.

use kinema_math::Color;

use crate::camera::Camera;
use crate::gbuffer::GBuffer;
use crate::integrator::{Integrator, ShadedPixel};

/// Default bucket edge in pixels.
pub const DEFAULT_BUCKET_SIZE: u32 = 64;

/// A rectangle of pixels rendered as one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Position in the render order
    pub index: usize,
}

impl Bucket {
    pub fn new(x: u32, y: u32, width: u32, height: u32, index: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
            index,
        }
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Image coordinates of every pixel, row by row.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y..self.y + self.height).flat_map(move |y| (self.x..self.x + self.width).map(move |x| (x, y)))
    }

    /// Squared distance from the bucket's centre to `(cx, cy)`.
    fn distance_sq(&self, cx: f32, cy: f32) -> f32 {
        let dx = self.x as f32 + 0.5 * self.width as f32 - cx;
        let dy = self.y as f32 + 0.5 * self.height as f32 - cy;
        dx * dx + dy * dy
    }
}

/// Cover a `width` x `height` image with buckets, nearest to the centre first.
///
/// Edge buckets are clipped to the image. Equidistant buckets keep
/// row-major order, so the sequence is the same on every run.
pub fn generate_buckets(width: u32, height: u32, bucket_size: u32) -> Vec<Bucket> {
    let size = bucket_size.max(1);
    let mut buckets: Vec<Bucket> = (0..height)
        .step_by(size as usize)
        .flat_map(|y| {
            (0..width)
                .step_by(size as usize)
                .map(move |x| Bucket::new(x, y, size.min(width - x), size.min(height - y), 0))
        })
        .collect();

    let (cx, cy) = (0.5 * width as f32, 0.5 * height as f32);
    buckets.sort_by(|a, b| a.distance_sq(cx, cy).total_cmp(&b.distance_sq(cx, cy)));
    for (index, bucket) in buckets.iter_mut().enumerate() {
        bucket.index = index;
    }
    buckets
}

/// Shade every pixel of `bucket`, row by row.
pub fn render_bucket(bucket: &Bucket, camera: &Camera, integrator: &Integrator<'_>) -> Vec<ShadedPixel> {
    bucket
        .pixels()
        .map(|(x, y)| integrator.render_pixel(camera, x, y))
        .collect()
}

/// Shaded pixels of one finished bucket.
#[derive(Debug, Clone)]
pub struct BucketResult {
    pub bucket: Bucket,
    pub pixels: Vec<ShadedPixel>,
}

impl BucketResult {
    pub fn new(bucket: Bucket, pixels: Vec<ShadedPixel>) -> Self {
        Self { bucket, pixels }
    }

    /// Store the bucket's pixels; rays that escaped leave the background.
    pub fn write_to(&self, gbuffer: &mut GBuffer<'_>, background: Color) {
        for ((x, y), pixel) in self.bucket.pixels().zip(&self.pixels) {
            match &pixel.surface {
                Some(surface) => gbuffer.write(x, y, surface),
                None => gbuffer.set_default(x, y, background),
            }
            gbuffer.write_radiance(x, y, pixel.radiance);
        }
    }
}
