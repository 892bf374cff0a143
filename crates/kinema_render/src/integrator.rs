//! CPU reference integrator for direct lighting.
//!
//! Per pixel and per sample:
//! - primary hit and G-buffer record
//! - emitted radiance of rectangle lights seen directly
//! - one light chosen by resampled importance sampling over several candidates
//! - a shadow ray from the terminator-corrected origin
//! - one BSDF sample, combined with the light sample by the power heuristic
//! - ambient light for escaped camera rays
//!
//! The GPU kernel in `shaders/direct_lighting.wgsl` follows the same steps.

use std::f32::consts::PI;
use std::time::Instant;

use kinema_core::{Material, SceneView};
use kinema_math::{Color, Interval, Mat3, Ray, Vec3};
use rayon::prelude::*;

use crate::bucket::{generate_buckets, render_bucket, BucketResult};
use crate::camera::Camera;
use crate::config::{AreaLightMode, RenderConfig};
use crate::gbuffer::{GBuffer, GBufferSample};
use crate::geometry::SceneGeometry;
use crate::hittable::{HitRecord, Hittable};
use crate::light::{Light, LightSet};
use crate::ltc::ltc_evaluate;
use crate::reservoir::{ReservoirSample, RisReservoir};
use crate::sampling::{power_heuristic, PixelSampler};
use crate::shading::BlinnPhong;
use crate::shadow_terminator::{offset_ray_origin, shadow_terminator, RAY_EPSILON};

/// Shadow rays stop this fraction short of the sampled light point.
const SHADOW_EPSILON: f32 = 1.0e-3;

/// Relative luminance of a linear RGB color (Rec. 709).
#[inline]
pub fn luminance(c: Color) -> f32 {
    c.dot(Color::new(0.2126, 0.7152, 0.0722))
}

/// Output of one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadedPixel {
    /// Mean radiance over all samples
    pub radiance: Color,
    /// Primary hit of the first sample; `None` when the camera ray escaped
    pub surface: Option<GBufferSample>,
}

/// Shades pixels of one frame. Holds the borrowed scene for the pass.
pub struct Integrator<'frame> {
    scene: SceneView<'frame>,
    geometry: SceneGeometry,
    lights: LightSet,
    config: RenderConfig,
    fallback: BlinnPhong,
}

impl<'frame> Integrator<'frame> {
    /// Prepare geometry and lights for one frame.
    pub fn new(scene: SceneView<'frame>, config: &RenderConfig) -> Self {
        let geometry = SceneGeometry::build(scene);
        let lights = LightSet::gather(scene);

        log::debug!(
            "Integrator ready: {} triangles, {} lights, {:?} area lights",
            geometry.len(),
            lights.len(),
            config.area_light_mode
        );

        Self {
            scene,
            geometry,
            lights,
            config: config.clone(),
            fallback: BlinnPhong::from_material(&Material::default()),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn geometry(&self) -> &SceneGeometry {
        &self.geometry
    }

    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    /// Render one pixel with `samples_per_pixel` jittered samples.
    pub fn render_pixel(&self, camera: &Camera, x: u32, y: u32) -> ShadedPixel {
        let mut sampler = PixelSampler::new(x, y, self.config.frame_index);
        let spp = self.config.samples_per_pixel.max(1);

        let mut radiance = Color::ZERO;
        let mut surface = None;
        for s in 0..spp {
            let ray = camera.get_ray(x, y, &mut sampler);
            let (l, hit) = self.radiance(&ray, &mut sampler);
            // A degenerate sample contributes nothing
            if l.is_finite() {
                radiance += l;
            }
            if s == 0 {
                surface = hit;
            }
        }

        ShadedPixel {
            radiance: radiance / spp as f32,
            surface,
        }
    }

    /// Radiance along a camera ray and the G-buffer record of its hit.
    pub fn radiance(&self, ray: &Ray, sampler: &mut PixelSampler) -> (Color, Option<GBufferSample>) {
        let mut rec = HitRecord::default();
        if !self.geometry.hit(ray, Interval::new(RAY_EPSILON, f32::INFINITY), &mut rec) {
            let ambient: Color = self.lights.iter().map(|light| light.l_e(ray)).sum();
            return (self.config.background + ambient, None);
        }

        let bsdf = self.material(rec.material_id);
        let surface = GBufferSample {
            base_color: bsdf.base_color,
            normal: rec.normal,
            depth: self.config.normalized_depth(rec.t * ray.direction().length()),
            instance_id: rec.instance_id,
            material_id: rec.material_id,
        };

        let v = -ray.direction().normalize();
        let mut l = self.emitted(&rec, ray.origin());
        l += self.sample_lights(&rec, v, &bsdf, sampler);
        l += self.sample_bsdf(&rec, v, &bsdf, sampler);
        if self.config.area_light_mode == AreaLightMode::Ltc {
            l += self.ltc_area_lights(&rec, v, &bsdf);
        }

        (l, Some(surface))
    }

    fn material(&self, id: u32) -> BlinnPhong {
        self.scene
            .material(id)
            .map(BlinnPhong::from_material)
            .unwrap_or(self.fallback)
    }

    fn ltc_mode(&self) -> bool {
        self.config.area_light_mode == AreaLightMode::Ltc
    }

    /// Emission of a rectangle light hit directly, seen from `origin`.
    fn emitted(&self, rec: &HitRecord, origin: Vec3) -> Color {
        match self.lights.for_instance(rec.instance_id) {
            Some((_, light)) if matches!(light, Light::Rect(_)) => light.l(origin, rec.p),
            _ => Color::ZERO,
        }
    }

    /// Origin for a secondary ray leaving `rec` along `w`.
    fn spawn_origin(&self, rec: &HitRecord, w: Vec3) -> Vec3 {
        let mut p = rec.p;
        if self.config.shadow_terminator {
            if let Some(tri) = self.geometry.triangle(rec.triangle) {
                let normals = if rec.front_face {
                    tri.normals
                } else {
                    tri.normals.map(|n| -n)
                };
                p = shadow_terminator(rec.p, tri.positions, normals, rec.barycentric);
            }
        }
        offset_ray_origin(p, rec.geometric_normal, w)
    }

    /// True when nothing blocks the segment from `rec` to `target`.
    fn unoccluded(&self, rec: &HitRecord, target: Vec3) -> bool {
        if (target - rec.p).dot(rec.geometric_normal) <= 0.0 {
            return false;
        }
        let origin = self.spawn_origin(rec, target - rec.p);
        let ray = Ray::new(origin, target - origin);
        !self
            .geometry
            .occluded(&ray, Interval::new(0.0, 1.0 - SHADOW_EPSILON))
    }

    /// Light selection probability of the uniform candidate generator.
    fn select_pdf(&self) -> f32 {
        1.0 / self.lights.len().max(1) as f32
    }

    /// Resampled light sample: stream candidates through a reservoir,
    /// shade the survivor with its contribution weight.
    fn sample_lights(&self, rec: &HitRecord, v: Vec3, bsdf: &BlinnPhong, sampler: &mut PixelSampler) -> Color {
        let light_count = self.lights.len();
        if light_count == 0 {
            return Color::ZERO;
        }
        let n = rec.normal;
        let p_select = self.select_pdf();

        let mut reservoir = RisReservoir::new();
        for _ in 0..self.config.ris_candidates {
            let u_pick = sampler.next_1d();
            let u_light = sampler.next_2d();
            let u_keep = sampler.next_1d();

            let index = ((u_pick * light_count as f32) as usize).min(light_count - 1);
            let Some(light) = self.lights.get(index) else {
                reservoir.skip();
                continue;
            };
            if self.ltc_mode() && matches!(light, Light::Rect(_)) {
                reservoir.skip();
                continue;
            }
            let Some(sample) = light.sample_li(rec.p, u_light) else {
                reservoir.skip();
                continue;
            };
            if sample.pdf <= 0.0 {
                reservoir.skip();
                continue;
            }

            let p_hat = luminance(bsdf.evaluate(n, sample.direction(), v) * sample.l_i);
            let weight = p_hat / (p_select * sample.pdf);
            reservoir.add_sample(ReservoirSample::new(index as u32, sample, weight), u_keep);
        }

        if reservoir.is_empty() {
            return Color::ZERO;
        }
        let chosen = reservoir.out.li_sample();
        let index = reservoir.out.light_index as usize;
        let w_i = chosen.direction();
        let contribution = bsdf.evaluate(n, w_i, v) * chosen.l_i;
        let weight = reservoir.contribution_weight(luminance(contribution));
        if weight <= 0.0 || !self.unoccluded(rec, chosen.p_l) {
            return Color::ZERO;
        }

        let mis = match self.lights.get(index) {
            Some(light) if self.lights.is_emitter(index) => {
                power_heuristic(p_select * light.pdf_li(rec.p, w_i), bsdf.pdf(n, w_i))
            }
            _ => 1.0,
        };
        contribution * weight * mis
    }

    /// One cosine-weighted BSDF sample; counts only when it lands on a
    /// rectangle light's emitting face.
    fn sample_bsdf(&self, rec: &HitRecord, v: Vec3, bsdf: &BlinnPhong, sampler: &mut PixelSampler) -> Color {
        let n = rec.normal;
        let w_i = bsdf.sample(n, sampler.next_2d());
        let pdf = bsdf.pdf(n, w_i);
        if pdf <= 0.0 || w_i.dot(rec.geometric_normal) <= 0.0 || self.ltc_mode() {
            return Color::ZERO;
        }

        let ray = Ray::new(self.spawn_origin(rec, w_i), w_i);
        let mut hit = HitRecord::default();
        if !self.geometry.hit(&ray, Interval::new(0.0, f32::INFINITY), &mut hit) {
            // Ambient light is estimated by light sampling alone
            return Color::ZERO;
        }
        let Some((_, light)) = self.lights.for_instance(hit.instance_id) else {
            return Color::ZERO;
        };
        if !matches!(light, Light::Rect(_)) {
            return Color::ZERO;
        }

        let l_e = light.l(rec.p, hit.p);
        if l_e == Color::ZERO {
            return Color::ZERO;
        }
        let light_pdf = self.select_pdf() * light.pdf_li(rec.p, w_i);
        bsdf.evaluate(n, w_i, v) * l_e * power_heuristic(pdf, light_pdf) / pdf
    }

    /// Closed-form diffuse response to every rectangle light.
    ///
    /// Visibility is a single shadow ray to the light's centre; specular
    /// highlights of rectangle lights are not reproduced in this mode.
    fn ltc_area_lights(&self, rec: &HitRecord, v: Vec3, bsdf: &BlinnPhong) -> Color {
        let albedo = bsdf.diffuse_albedo();
        if albedo == Color::ZERO {
            return Color::ZERO;
        }

        let mut total = Color::ZERO;
        for light in self.lights.iter() {
            let Light::Rect(rect) = light else {
                continue;
            };
            if (rec.p - rect.center).dot(rect.normal) <= 0.0 || !self.unoccluded(rec, rect.center) {
                continue;
            }
            // The unnormalised diffuse lobe integrates to pi times the form factor
            let irradiance = ltc_evaluate(rec.normal, v, rec.p, Mat3::IDENTITY, rect.corners());
            total += rect.radiance * albedo * PI * irradiance;
        }
        total
    }
}

/// Render every pixel into `gbuffer` using rayon over centre-out buckets.
///
/// `camera` must be initialised for the G-buffer's resolution.
pub fn render_frame(integrator: &Integrator<'_>, camera: &Camera, gbuffer: &mut GBuffer<'_>) {
    let start = Instant::now();
    let config = integrator.config();
    let buckets = generate_buckets(gbuffer.width(), gbuffer.height(), config.bucket_size);

    let results: Vec<BucketResult> = buckets
        .par_iter()
        .map(|bucket| BucketResult::new(*bucket, render_bucket(bucket, camera, integrator)))
        .collect();

    for result in &results {
        result.write_to(gbuffer, config.background);
    }

    log::info!(
        "Rendered frame {} ({}x{}, {} buckets, {} spp) in {:.2?}",
        config.frame_index,
        gbuffer.width(),
        gbuffer.height(),
        results.len(),
        config.samples_per_pixel,
        start.elapsed()
    );
}
