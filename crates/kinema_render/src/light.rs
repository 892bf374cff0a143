//! Light sampling strategies.
//!
//! Light kinds form a closed set, so they are a tagged enum dispatched with
//! `match` rather than trait objects. Each variant answers four queries:
//! sample incident radiance at a point (`sample_li`), the solid-angle
//! density of a direction (`pdf_li`), radiance seen when a ray hits the
//! light directly (`l`), and radiance for rays escaping the scene (`l_e`).

use std::collections::HashMap;
use std::f32::consts::PI;

use kinema_core::{InstanceId, LightData, LightType, SceneView};
use kinema_math::{Color, Frame, Mat4, Ray, Vec2, Vec3};

use crate::sampling::sample_uniform_sphere;

/// Distance used for directions toward lights at infinity.
pub const INFINITE_LIGHT_DISTANCE: f32 = 1.0e5;

/// sin^2(1.5 deg): below this the sphere cone is sampled with a Taylor expansion.
const SMALL_CONE_SIN2: f32 = 0.000_685_23;

/// One sample of a light as seen from a shading point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightLiSample {
    /// Incident radiance
    pub l_i: Color,
    /// Vector from the shading point to `p_l` (length = distance)
    pub w_i: Vec3,
    /// Sampled point on the light
    pub p_l: Vec3,
    /// Density in the light's sampling measure (solid angle for spheres,
    /// area for rectangles, 1 for discrete and ambient lights)
    pub pdf: f32,
}

impl LightLiSample {
    #[inline]
    pub fn distance(&self) -> f32 {
        self.w_i.length()
    }

    /// Unit direction toward the light.
    #[inline]
    pub fn direction(&self) -> Vec3 {
        self.w_i.normalize_or_zero()
    }
}

/// Sphere light; `radius == 0` degenerates to an ideal point light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub radius: f32,
    /// intensity * color
    pub intensity: Color,
}

impl PointLight {
    /// Surface radiance giving the same far-field irradiance as a point of `intensity`.
    fn surface_radiance(&self) -> Color {
        self.intensity / (PI * self.radius * self.radius)
    }

    fn sample_li(&self, p: Vec3, u: Vec2) -> Option<LightLiSample> {
        let to_center = self.position - p;
        let dc2 = to_center.length_squared();
        if dc2 == 0.0 {
            return None;
        }

        if self.radius <= 0.0 {
            return Some(LightLiSample {
                l_i: self.intensity / dc2,
                w_i: to_center,
                p_l: self.position,
                pdf: 1.0,
            });
        }
        if dc2 <= self.radius * self.radius {
            return None;
        }

        // Uniform sampling of the cone subtended by the sphere
        let dc = dc2.sqrt();
        let sin_theta_max = self.radius / dc;
        let sin2_theta_max = sin_theta_max * sin_theta_max;
        let cos_theta_max = (1.0 - sin2_theta_max).max(0.0).sqrt();
        let mut one_minus_cos_theta_max = 1.0 - cos_theta_max;

        let mut cos_theta = (cos_theta_max - 1.0) * u.x + 1.0;
        let mut sin2_theta = 1.0 - cos_theta * cos_theta;
        if sin2_theta_max < SMALL_CONE_SIN2 {
            sin2_theta = sin2_theta_max * u.x;
            cos_theta = (1.0 - sin2_theta).sqrt();
            one_minus_cos_theta_max = sin2_theta_max / 2.0;
        }

        // Angle alpha from the sphere center to the sampled surface point
        let cos_alpha = sin2_theta / sin_theta_max
            + cos_theta * (1.0 - sin2_theta / sin2_theta_max).max(0.0).sqrt();
        let sin_alpha = (1.0 - cos_alpha * cos_alpha).max(0.0).sqrt();
        let phi = u.y * 2.0 * PI;
        let w = Vec3::new(sin_alpha * phi.cos(), sin_alpha * phi.sin(), cos_alpha);

        let frame = Frame::from_normal(to_center / dc);
        let n = frame.to_world(-w);
        let p_l = self.position + self.radius * n;

        Some(LightLiSample {
            l_i: self.surface_radiance(),
            w_i: p_l - p,
            p_l,
            pdf: 1.0 / (2.0 * PI * one_minus_cos_theta_max),
        })
    }

    fn pdf_li(&self, p: Vec3, w: Vec3) -> f32 {
        let to_center = self.position - p;
        let dc2 = to_center.length_squared();
        if self.radius <= 0.0 || dc2 <= self.radius * self.radius {
            return 0.0;
        }
        let sin2_theta_max = self.radius * self.radius / dc2;
        let cos_theta_max = (1.0 - sin2_theta_max).max(0.0).sqrt();
        let one_minus_cos_theta_max = if sin2_theta_max < SMALL_CONE_SIN2 {
            sin2_theta_max / 2.0
        } else {
            1.0 - cos_theta_max
        };
        let cos_w = w.normalize_or_zero().dot(to_center / dc2.sqrt());
        if cos_w < cos_theta_max {
            return 0.0;
        }
        1.0 / (2.0 * PI * one_minus_cos_theta_max)
    }
}

/// Planar rectangle light placed by its owner's transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectLight {
    pub center: Vec3,
    /// Full-width edge in world space
    pub edge_x: Vec3,
    /// Full-height edge in world space
    pub edge_y: Vec3,
    /// Emitting side
    pub normal: Vec3,
    /// intensity * color
    pub radiance: Color,
}

impl RectLight {
    /// Build from the owner's world matrix and the light's local width x height.
    pub fn from_matrix(matrix: Mat4, size: Vec2, radiance: Color) -> Option<Self> {
        let edge_x = matrix.transform_vector3(Vec3::X * size.x);
        let edge_y = matrix.transform_vector3(Vec3::Y * size.y);
        let normal = edge_x.cross(edge_y).try_normalize()?;
        Some(Self {
            center: matrix.transform_point3(Vec3::ZERO),
            edge_x,
            edge_y,
            normal,
            radiance,
        })
    }

    pub fn area(&self) -> f32 {
        self.edge_x.cross(self.edge_y).length()
    }

    /// Corners in the order that yields a positive LTC form factor for
    /// receivers on the emitting side.
    pub fn corners(&self) -> [Vec3; 4] {
        let hx = 0.5 * self.edge_x;
        let hy = 0.5 * self.edge_y;
        [
            self.center - hx - hy,
            self.center - hx + hy,
            self.center + hx + hy,
            self.center + hx - hy,
        ]
    }

    fn sample_li(&self, p: Vec3, u: Vec2) -> Option<LightLiSample> {
        let p_l = self.center + (u.x - 0.5) * self.edge_x + (u.y - 0.5) * self.edge_y;
        let w_i = p_l - p;
        let d2 = w_i.length_squared();
        if d2 == 0.0 {
            return None;
        }
        let cos_light = self.normal.dot(-w_i / d2.sqrt()).max(0.0);
        Some(LightLiSample {
            l_i: self.radiance * cos_light / d2,
            w_i,
            p_l,
            pdf: 1.0 / self.area(),
        })
    }

    /// Parametric distance along `ray` to the emitting face, if it is hit.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        let denom = ray.direction.dot(self.normal);
        // One-sided: the ray must travel against the normal
        if denom >= -1e-8 {
            return None;
        }
        let t = (self.center - ray.origin).dot(self.normal) / denom;
        if t <= 0.0 {
            return None;
        }
        let local = ray.at(t) - self.center;
        let sx = local.dot(self.edge_x) / self.edge_x.length_squared();
        let sy = local.dot(self.edge_y) / self.edge_y.length_squared();
        if sx.abs() > 0.5 || sy.abs() > 0.5 {
            return None;
        }
        Some(t)
    }

    fn pdf_li(&self, p: Vec3, w: Vec3) -> f32 {
        let ray = Ray::new(p, w.normalize_or_zero());
        let Some(t) = self.intersect(&ray) else {
            return 0.0;
        };
        let cos_light = (-ray.direction).dot(self.normal);
        if cos_light <= 0.0 {
            return 0.0;
        }
        // Area density converted to solid angle
        t * t / (cos_light * self.area())
    }

    fn l(&self, p_ref: Vec3, p_light: Vec3) -> Color {
        if (p_ref - p_light).dot(self.normal) > 0.0 {
            self.radiance
        } else {
            Color::ZERO
        }
    }
}

/// Ambient light: same radiance from every direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantLight {
    pub radiance: Color,
}

impl ConstantLight {
    fn sample_li(&self, p: Vec3, u: Vec2) -> Option<LightLiSample> {
        let w_i = sample_uniform_sphere(u) * INFINITE_LIGHT_DISTANCE;
        Some(LightLiSample {
            l_i: self.radiance,
            w_i,
            p_l: p + w_i,
            pdf: 1.0,
        })
    }
}

/// A light resolved for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Point(PointLight),
    Rect(RectLight),
    Constant(ConstantLight),
}

impl Light {
    /// Place a light record in the world. Returns `None` for invalid
    /// records, owners the scene cannot place, and degenerate rectangles.
    pub fn resolve(data: &LightData, scene: SceneView<'_>) -> Option<Self> {
        let kind = data.kind()?;
        let matrix = scene.instance_transform(data.instance_id)?;
        let radiance = data.radiance();
        match kind {
            LightType::Point => Some(Light::Point(PointLight {
                position: matrix.transform_point3(Vec3::ZERO),
                radius: data.size().x.max(0.0),
                intensity: radiance,
            })),
            LightType::Rect => RectLight::from_matrix(matrix, data.size(), radiance).map(Light::Rect),
            LightType::Constant => Some(Light::Constant(ConstantLight { radiance })),
        }
    }

    /// Sample incident radiance at `p`; `None` when the configuration is degenerate.
    pub fn sample_li(&self, p: Vec3, u: Vec2) -> Option<LightLiSample> {
        match self {
            Light::Point(light) => light.sample_li(p, u),
            Light::Rect(light) => light.sample_li(p, u),
            Light::Constant(light) => light.sample_li(p, u),
        }
    }

    /// Solid-angle density of sampling direction `w` from `p`.
    ///
    /// Zero for ideal points (delta distribution); 1 for ambient lights.
    pub fn pdf_li(&self, p: Vec3, w: Vec3) -> f32 {
        match self {
            Light::Point(light) => light.pdf_li(p, w),
            Light::Rect(light) => light.pdf_li(p, w),
            Light::Constant(_) => 1.0,
        }
    }

    /// Radiance arriving at `p_ref` from the point `p_light` on the light.
    pub fn l(&self, p_ref: Vec3, p_light: Vec3) -> Color {
        match self {
            Light::Point(light) => {
                let d2 = (p_ref - light.position).length_squared();
                if d2 > 0.0 {
                    light.intensity / d2
                } else {
                    Color::ZERO
                }
            }
            Light::Rect(light) => light.l(p_ref, p_light),
            Light::Constant(_) => Color::ZERO,
        }
    }

    /// Radiance carried by a ray that leaves the scene.
    pub fn l_e(&self, _ray: &Ray) -> Color {
        match self {
            Light::Constant(light) => light.radiance,
            _ => Color::ZERO,
        }
    }

}

/// The lights that can be sampled this frame.
#[derive(Debug, Clone, Default)]
pub struct LightSet {
    lights: Vec<Light>,
    /// Source record of each resolved light, in the same order
    records: Vec<LightData>,
    owners: Vec<InstanceId>,
    /// Rectangle lights whose owner carries a mesh that rays can hit
    emitters: Vec<bool>,
    by_instance: HashMap<InstanceId, usize>,
}

impl LightSet {
    /// Resolve every valid light record of the scene.
    pub fn gather(scene: SceneView<'_>) -> Self {
        let mut set = Self::default();
        for (slot, data) in scene.lights().iter().enumerate() {
            if !data.valid() {
                continue;
            }
            match Light::resolve(data, scene) {
                Some(light) => {
                    let has_mesh = scene
                        .instance(data.instance_id)
                        .is_some_and(|instance| instance.mesh.is_some());
                    // One emitting surface per instance; later rects on the
                    // same instance are reached by light sampling only
                    let emitter = has_mesh
                        && matches!(light, Light::Rect(_))
                        && !set.by_instance.contains_key(&data.instance_id);
                    if emitter {
                        set.by_instance.insert(data.instance_id, set.lights.len());
                    }
                    set.emitters.push(emitter);
                    set.lights.push(light);
                    set.records.push(*data);
                    set.owners.push(data.instance_id);
                }
                None => log::warn!(
                    "Skipping light {} (type {}, instance {}): cannot be placed",
                    slot,
                    data.light_type,
                    data.instance_id
                ),
            }
        }
        log::debug!("Gathered {} light(s) for '{}'", set.lights.len(), scene.name());
        set
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Light> {
        self.lights.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter()
    }

    /// Instance that owns light `index`.
    pub fn owner(&self, index: usize) -> Option<InstanceId> {
        self.owners.get(index).copied()
    }

    /// Light records in sampling order.
    pub fn records(&self) -> &[LightData] {
        &self.records
    }

    /// True when BSDF rays can hit light `index`'s emitting surface.
    pub fn is_emitter(&self, index: usize) -> bool {
        self.emitters.get(index).copied().unwrap_or(false)
    }

    /// Emitting rectangle light on an instance's surface, if any.
    pub fn for_instance(&self, id: InstanceId) -> Option<(usize, &Light)> {
        let index = *self.by_instance.get(&id)?;
        Some((index, &self.lights[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinema_core::{Material, Mesh, Scene};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn facing_down(height: f32) -> Mat4 {
        // Local +Z (emitting side) turned to world -Z
        Mat4::from_translation(Vec3::new(0.0, 0.0, height)) * Mat4::from_rotation_x(PI)
    }

    #[test]
    fn test_point_light_inverse_square() {
        let light = Light::Point(PointLight {
            position: Vec3::new(0.0, 0.0, 4.0),
            radius: 0.0,
            intensity: Color::splat(32.0),
        });
        let s = light.sample_li(Vec3::ZERO, Vec2::new(0.3, 0.7)).unwrap();
        assert!((s.l_i - Color::splat(2.0)).length() < 1e-5);
        assert_eq!(s.w_i, Vec3::new(0.0, 0.0, 4.0));
        assert_eq!(s.pdf, 1.0);
        assert_eq!(light.pdf_li(Vec3::ZERO, Vec3::Z), 0.0);
        assert!((light.l(Vec3::ZERO, Vec3::ZERO) - Color::splat(2.0)).length() < 1e-5);
    }

    #[test]
    fn test_point_light_at_shading_point_is_degenerate() {
        let light = Light::Point(PointLight {
            position: Vec3::ONE,
            radius: 0.5,
            intensity: Color::ONE,
        });
        assert!(light.sample_li(Vec3::ONE, Vec2::splat(0.5)).is_none());
        // Inside the sphere
        assert!(light.sample_li(Vec3::new(1.1, 1.0, 1.0), Vec2::splat(0.5)).is_none());
    }

    #[test]
    fn test_sphere_samples_lie_on_visible_cap() {
        let center = Vec3::new(0.0, 0.0, 10.0);
        let light = PointLight {
            position: center,
            radius: 2.0,
            intensity: Color::ONE,
        };
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..2000 {
            // Stay off the cone boundary where pdf_li's inside test is ambiguous
            let u = Vec2::new(rng.gen::<f32>() * 0.95, rng.gen());
            let s = light.sample_li(Vec3::ZERO, u).unwrap();
            assert!(((s.p_l - center).length() - 2.0).abs() < 1e-3);
            // The sampled point faces the receiver
            assert!((s.p_l - center).dot(-center) >= -1e-3);
            assert!(s.pdf > 0.0);
            assert!((light.pdf_li(Vec3::ZERO, s.w_i) - s.pdf).abs() / s.pdf < 1e-3);
        }
    }

    #[test]
    fn test_small_sphere_matches_point_irradiance() {
        // Estimator l_i / pdf converges to intensity / d^2 for a distant sphere
        let light = Light::Point(PointLight {
            position: Vec3::new(0.0, 0.0, 50.0),
            radius: 0.5,
            intensity: Color::splat(100.0),
        });
        let s = light.sample_li(Vec3::ZERO, Vec2::splat(0.5)).unwrap();
        let estimate = s.l_i.x / s.pdf;
        let expected = 100.0 / 2500.0;
        assert!((estimate - expected).abs() / expected < 0.01, "{} vs {}", estimate, expected);
    }

    #[test]
    fn test_rect_light_facing_receiver() {
        let light = Light::Rect(
            RectLight::from_matrix(facing_down(5.0), Vec2::new(2.0, 2.0), Color::splat(10.0)).unwrap(),
        );
        let s = light.sample_li(Vec3::ZERO, Vec2::splat(0.5)).unwrap();
        // Center of the light, straight above: cos = 1, d^2 = 25
        assert!((s.p_l - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
        assert!((s.l_i - Color::splat(10.0 / 25.0)).length() < 1e-5);
        assert!((s.pdf - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_rect_light_back_side_is_dark() {
        let light = RectLight::from_matrix(facing_down(5.0), Vec2::new(2.0, 2.0), Color::ONE).unwrap();
        let above = Vec3::new(0.0, 0.0, 10.0);
        let s = Light::Rect(light).sample_li(above, Vec2::splat(0.25)).unwrap();
        assert_eq!(s.l_i, Color::ZERO);
        assert_eq!(Light::Rect(light).pdf_li(above, -Vec3::Z), 0.0);
        assert_eq!(Light::Rect(light).l(above, light.center), Color::ZERO);
        assert_eq!(Light::Rect(light).l(Vec3::ZERO, light.center), Color::ONE);
    }

    #[test]
    fn test_rect_pdf_li_solid_angle() {
        let light = RectLight::from_matrix(facing_down(5.0), Vec2::new(2.0, 2.0), Color::ONE).unwrap();
        let pdf = Light::Rect(light).pdf_li(Vec3::ZERO, Vec3::Z);
        assert!((pdf - 25.0 / 4.0).abs() < 1e-4);
        // Missing the rectangle
        assert_eq!(Light::Rect(light).pdf_li(Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0)), 0.0);
    }

    #[test]
    fn test_rect_area_follows_scale() {
        let m = Mat4::from_scale(Vec3::new(2.0, 3.0, 1.0));
        let light = RectLight::from_matrix(m, Vec2::new(1.0, 1.0), Color::ONE).unwrap();
        assert!((light.area() - 6.0).abs() < 1e-5);
        assert!(RectLight::from_matrix(m, Vec2::new(0.0, 1.0), Color::ONE).is_none());
    }

    #[test]
    fn test_constant_light() {
        let light = Light::Constant(ConstantLight {
            radiance: Color::splat(0.2),
        });
        let s = light.sample_li(Vec3::ONE, Vec2::new(0.1, 0.9)).unwrap();
        assert_eq!(s.l_i, Color::splat(0.2));
        assert_eq!(s.pdf, 1.0);
        assert!((s.distance() - INFINITE_LIGHT_DISTANCE).abs() / INFINITE_LIGHT_DISTANCE < 1e-4);
        assert_eq!(light.l_e(&Ray::new(Vec3::ZERO, Vec3::X)), Color::splat(0.2));
        assert_eq!(light.l(Vec3::ZERO, Vec3::X), Color::ZERO);
    }

    #[test]
    fn test_non_infinite_lights_have_no_escape_radiance() {
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        let point = Light::Point(PointLight {
            position: Vec3::Z,
            radius: 0.0,
            intensity: Color::ONE,
        });
        assert_eq!(point.l_e(&ray), Color::ZERO);
    }

    #[test]
    fn test_gather_skips_invalid_and_unplaceable() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut scene = Scene::new("lights");
        let quad = scene.add_mesh(Mesh::quad(2.0, 2.0)).unwrap();
        let mat = scene.add_material(Material::default());
        let lamp = scene.add_instance(Some(quad), mat, facing_down(5.0)).unwrap();
        let bulb = scene.add_instance(None, mat, Mat4::IDENTITY).unwrap();
        scene
            .register_light(LightData::rect(lamp, Color::ONE, 5.0, 2.0, 2.0))
            .unwrap();
        scene
            .register_light(LightData::point(bulb, Color::ONE, 1.0, 0.0))
            .unwrap();
        scene.remove_instance(bulb).unwrap();

        let set = LightSet::gather(scene.view());
        assert_eq!(set.len(), 1);
        assert_eq!(set.owner(0), Some(lamp));
        assert!(matches!(set.for_instance(lamp), Some((0, Light::Rect(_)))));
        assert!(set.for_instance(bulb).is_none());
        assert_eq!(set.records().len(), 1);
        assert_eq!(set.records()[0].instance_id, lamp);
        assert!(set.is_emitter(0));
        assert!(!set.is_emitter(1));
    }

    #[test]
    fn test_rect_without_mesh_is_not_an_emitter() {
        let mut scene = Scene::new("portal");
        let mat = scene.add_material(Material::default());
        let portal = scene.add_instance(None, mat, facing_down(3.0)).unwrap();
        scene
            .register_light(LightData::rect(portal, Color::ONE, 1.0, 1.0, 1.0))
            .unwrap();

        let set = LightSet::gather(scene.view());
        assert_eq!(set.len(), 1);
        assert!(!set.is_emitter(0));
    }

    #[test]
    fn test_instance_maps_to_its_emitting_rect() {
        let mut scene = Scene::new("shared");
        let quad = scene.add_mesh(Mesh::quad(2.0, 2.0)).unwrap();
        let mat = scene.add_material(Material::default());
        let lamp = scene.add_instance(Some(quad), mat, facing_down(2.0)).unwrap();
        scene
            .register_light(LightData::rect(lamp, Color::ONE, 4.0, 2.0, 2.0))
            .unwrap();
        scene
            .register_light(LightData::point(lamp, Color::ONE, 0.0, 0.0))
            .unwrap();
        scene
            .register_light(LightData::rect(lamp, Color::ONE, 1.0, 1.0, 1.0))
            .unwrap();

        let set = LightSet::gather(scene.view());
        assert_eq!(set.len(), 3);
        assert!(matches!(set.for_instance(lamp), Some((0, Light::Rect(_)))));
        assert!(set.is_emitter(0));
        assert!(!set.is_emitter(1));
        assert!(!set.is_emitter(2));
    }
}
