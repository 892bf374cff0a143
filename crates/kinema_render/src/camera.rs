//! Camera for primary ray generation.

use kinema_math::{Ray, Vec2, Vec3};

use crate::sampling::{sample_uniform_disk_concentric, PixelSampler};

/// Ray-generation basis of an initialised camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRaster {
    pub center: Vec3,
    /// Centre of pixel (0, 0) on the focus plane
    pub pixel00: Vec3,
    pub delta_u: Vec3,
    pub delta_v: Vec3,
    pub defocus_u: Vec3,
    pub defocus_v: Vec3,
    pub thin_lens: bool,
}

/// Pinhole or thin-lens camera producing unit-length primary rays.
#[derive(Debug, Clone)]
pub struct Camera {
    // Image settings
    pub image_width: u32,
    pub image_height: u32,

    // Camera positioning
    look_from: Vec3,
    look_at: Vec3,
    vup: Vec3,

    // Lens settings
    vfov: f32,          // Vertical field of view in degrees
    defocus_angle: f32, // Variation angle of rays through each pixel
    focus_dist: f32,    // Distance from camera to plane of perfect focus

    // Cached computed values (set by initialize())
    center: Vec3,
    pixel00_loc: Vec3,
    pixel_delta_u: Vec3,
    pixel_delta_v: Vec3,
    u: Vec3,
    v: Vec3,
    w: Vec3,
    defocus_disk_u: Vec3,
    defocus_disk_v: Vec3,
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self {
            image_width: 640,
            image_height: 360,
            look_from: Vec3::new(0.0, 0.0, 0.0),
            look_at: Vec3::new(0.0, 0.0, -1.0),
            vup: Vec3::new(0.0, 1.0, 0.0),
            vfov: 90.0,
            defocus_angle: 0.0,
            focus_dist: 1.0,
            // Cached values (initialized to defaults)
            center: Vec3::ZERO,
            pixel00_loc: Vec3::ZERO,
            pixel_delta_u: Vec3::ZERO,
            pixel_delta_v: Vec3::ZERO,
            u: Vec3::X,
            v: Vec3::Y,
            w: Vec3::Z,
            defocus_disk_u: Vec3::ZERO,
            defocus_disk_v: Vec3::ZERO,
        }
    }

    /// Set image resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.image_width = width;
        self.image_height = height;
        self
    }

    /// Set camera position.
    pub fn with_position(mut self, look_from: Vec3, look_at: Vec3, vup: Vec3) -> Self {
        self.look_from = look_from;
        self.look_at = look_at;
        self.vup = vup;
        self
    }

    /// Set lens settings.
    pub fn with_lens(mut self, vfov: f32, defocus_angle: f32, focus_dist: f32) -> Self {
        self.vfov = vfov;
        self.defocus_angle = defocus_angle;
        self.focus_dist = focus_dist;
        self
    }

    /// Initialize the camera (must be called before generating rays).
    pub fn initialize(&mut self) {
        self.center = self.look_from;

        // Calculate viewport dimensions
        let theta = self.vfov.to_radians();
        let h = (theta / 2.0).tan();
        let viewport_height = 2.0 * h * self.focus_dist;
        let viewport_width = viewport_height * (self.image_width as f32 / self.image_height.max(1) as f32);

        // Calculate camera basis vectors
        self.w = (self.look_from - self.look_at).normalize();
        self.u = self.vup.cross(self.w).normalize();
        self.v = self.w.cross(self.u);

        // Calculate viewport vectors
        let viewport_u = viewport_width * self.u;
        let viewport_v = -viewport_height * self.v;

        // Calculate pixel delta vectors
        self.pixel_delta_u = viewport_u / self.image_width as f32;
        self.pixel_delta_v = viewport_v / self.image_height as f32;

        // Calculate upper left pixel location
        let viewport_upper_left = self.center - self.focus_dist * self.w - viewport_u / 2.0 - viewport_v / 2.0;

        self.pixel00_loc = viewport_upper_left + 0.5 * (self.pixel_delta_u + self.pixel_delta_v);

        // Calculate defocus disk basis vectors
        let defocus_radius = self.focus_dist * (self.defocus_angle / 2.0).to_radians().tan();
        self.defocus_disk_u = self.u * defocus_radius;
        self.defocus_disk_v = self.v * defocus_radius;
    }

    /// Ray through pixel (i, j) jittered by the pixel's sample stream.
    ///
    /// The direction is normalised, so the hit distance `t` is the depth.
    pub fn get_ray(&self, i: u32, j: u32, sampler: &mut PixelSampler) -> Ray {
        let offset = sampler.next_2d() - Vec2::splat(0.5);
        let lens = if self.defocus_angle <= 0.0 {
            Vec2::ZERO
        } else {
            sample_uniform_disk_concentric(sampler.next_2d())
        };
        self.ray_through(i, j, offset, lens)
    }

    /// Unjittered ray through the centre of pixel (i, j).
    pub fn center_ray(&self, i: u32, j: u32) -> Ray {
        self.ray_through(i, j, Vec2::ZERO, Vec2::ZERO)
    }

    fn ray_through(&self, i: u32, j: u32, offset: Vec2, lens: Vec2) -> Ray {
        let pixel_sample = self.pixel00_loc
            + ((i as f32) + offset.x) * self.pixel_delta_u
            + ((j as f32) + offset.y) * self.pixel_delta_v;

        let ray_origin = self.center + lens.x * self.defocus_disk_u + lens.y * self.defocus_disk_v;
        Ray::new(ray_origin, (pixel_sample - ray_origin).normalize())
    }

    /// Camera position.
    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// Viewing direction.
    pub fn forward(&self) -> Vec3 {
        -self.w
    }

    /// Basis vectors the GPU kernel rebuilds primary rays from.
    pub fn raster(&self) -> CameraRaster {
        CameraRaster {
            center: self.center,
            pixel00: self.pixel00_loc,
            delta_u: self.pixel_delta_u,
            delta_v: self.pixel_delta_v,
            defocus_u: self.defocus_disk_u,
            defocus_v: self.defocus_disk_v,
            thin_lens: self.defocus_angle > 0.0,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}
