//! Material evaluation: Fresnel-Schlick and the Blinn-Phong surface model.
//!
//! `BlinnPhong::evaluate` returns the reflected-radiance factor with the
//! cosine already folded into the diffuse term. It is not energy
//! conserving: there is no `1/pi` on the diffuse lobe, no normalisation of
//! the specular lobe, and no `N.L` on the specular term.

use std::f32::consts::FRAC_1_PI;

use kinema_core::Material;
use kinema_math::{Color, Frame, Vec2, Vec3};

use crate::sampling::sample_cosine_hemisphere;

/// Reflectance of dielectrics at normal incidence.
pub const DIELECTRIC_F0: f32 = 0.04;

/// Schlick's approximation `f0 + (1 - f0)(1 - cos_theta)^5`.
#[inline]
pub fn fresnel_schlick(cos_theta: f32, f0: Color) -> Color {
    let m = (1.0 - cos_theta.clamp(0.0, 1.0)).powi(5);
    f0 + (Color::ONE - f0) * m
}

/// Blinn-Phong parameters resolved from a material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinnPhong {
    pub base_color: Color,
    pub roughness: f32,
    pub metalness: f32,
    pub specular_tint: Color,
}

impl BlinnPhong {
    pub fn from_material(material: &Material) -> Self {
        Self {
            base_color: material.base_color,
            roughness: material.roughness,
            metalness: material.metalness,
            specular_tint: material.specular_tint,
        }
    }

    /// Specular exponent; roughness 0 gives a near-mirror lobe of 10^4.
    #[inline]
    pub fn shininess(&self) -> f32 {
        100.0 / (200.0 * self.roughness + 0.01)
    }

    /// Specular color at normal incidence.
    #[inline]
    pub fn f0(&self) -> Color {
        Color::splat(DIELECTRIC_F0).lerp(self.base_color, self.metalness)
    }

    #[inline]
    pub fn diffuse_albedo(&self) -> Color {
        self.base_color * (1.0 - self.metalness)
    }

    /// Diffuse plus specular response for unit normal `n`, light direction
    /// `l` and view direction `v` (both pointing away from the surface).
    pub fn evaluate(&self, n: Vec3, l: Vec3, v: Vec3) -> Color {
        let h = (l + v).normalize_or_zero();
        let n_dot_l = n.dot(l).max(0.0);
        let n_dot_h = n.dot(h).max(0.0);

        let diffuse = self.diffuse_albedo() * n_dot_l;
        let specular = self.f0() * self.specular_tint * n_dot_h.powf(self.shininess());
        diffuse + specular
    }

    /// Cosine-weighted direction around `n`.
    pub fn sample(&self, n: Vec3, u: Vec2) -> Vec3 {
        Frame::from_normal(n).to_world(sample_cosine_hemisphere(u))
    }

    /// Solid-angle density of [`BlinnPhong::sample`].
    #[inline]
    pub fn pdf(&self, n: Vec3, l: Vec3) -> f32 {
        n.dot(l).max(0.0) * FRAC_1_PI
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_fresnel_schlick_limits() {
        let f0 = Color::new(0.04, 0.5, 0.9);
        assert!((fresnel_schlick(1.0, f0) - f0).length() < 1e-6);
        assert!((fresnel_schlick(0.0, f0) - Color::ONE).length() < 1e-6);

        let mid = fresnel_schlick(0.5, f0);
        let expected = f0 + (Color::ONE - f0) * 0.03125;
        assert!((mid - expected).length() < 1e-6);
    }

    #[test]
    fn test_shininess() {
        let mut bp = BlinnPhong::from_material(&Material::default());
        bp.roughness = 0.0;
        assert!((bp.shininess() - 10_000.0).abs() < 1e-2);
        bp.roughness = 1.0;
        assert!((bp.shininess() - 100.0 / 200.01).abs() < 1e-6);
    }

    #[test]
    fn test_dielectric_evaluate() {
        let bp = BlinnPhong::from_material(
            &Material::new("plastic", Color::new(0.8, 0.2, 0.1)).with_roughness(1.0),
        );
        // Light and view both along the normal: N.L = N.H = 1
        let c = bp.evaluate(Vec3::Z, Vec3::Z, Vec3::Z);
        let expected = Color::new(0.8, 0.2, 0.1) + Color::splat(0.04);
        assert!((c - expected).length() < 1e-5, "{:?}", c);
    }

    #[test]
    fn test_metal_has_no_diffuse() {
        let bp = BlinnPhong::from_material(
            &Material::new("gold", Color::new(1.0, 0.8, 0.3))
                .with_metalness(1.0)
                .with_roughness(0.2)
                .with_specular_tint(Color::splat(0.5)),
        );
        assert_eq!(bp.diffuse_albedo(), Color::ZERO);
        let c = bp.evaluate(Vec3::Z, Vec3::Z, Vec3::Z);
        assert!((c - Color::new(0.5, 0.4, 0.15)).length() < 1e-5);
    }

    #[test]
    fn test_light_below_surface_has_no_diffuse() {
        let bp = BlinnPhong::from_material(&Material::default().with_roughness(0.1));
        let c = bp.evaluate(Vec3::Z, -Vec3::Z, Vec3::new(1.0, 0.0, 0.0));
        assert!(c.max_element() < 1e-6);
    }

    #[test]
    fn test_sample_matches_pdf() {
        let bp = BlinnPhong::from_material(&Material::default());
        let n = Vec3::new(1.0, 1.0, 0.0).normalize();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let u = Vec2::new(rng.gen(), rng.gen());
            let l = bp.sample(n, u);
            assert!((l.length() - 1.0).abs() < 1e-4);
            assert!(n.dot(l) >= -1e-5);
            assert!((bp.pdf(n, l) - n.dot(l).max(0.0) / std::f32::consts::PI).abs() < 1e-6);
        }
        assert_eq!(bp.pdf(n, -n), 0.0);
    }
}
