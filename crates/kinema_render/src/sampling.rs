//! Random numbers, domain samplers and MIS weights.
//!
//! Everything here has a WGSL twin in `shaders/sampling.wgsl` with the same
//! constants, so CPU and GPU paths draw identical sequences for a pixel.

use kinema_math::{UVec2, UVec3, UVec4, Vec2, Vec3};
use std::f32::consts::{FRAC_1_PI, FRAC_PI_2, FRAC_PI_4, PI};

const LCG_A: u32 = 1_664_525;
const LCG_C: u32 = 1_013_904_223;

/// Largest f32 strictly below 1.
pub const ONE_MINUS_EPSILON: f32 = 0.999_999_94;

const INV_2_POW_32: f32 = 1.0 / 4_294_967_296.0;

/// Advance a linear congruential generator and return a float in `[0, 1)`.
#[inline]
pub fn lcg(state: &mut u32) -> f32 {
    *state = LCG_A.wrapping_mul(*state).wrapping_add(LCG_C);
    (*state as f32 * INV_2_POW_32).min(ONE_MINUS_EPSILON)
}

/// PCG hash (Jarzynski & Olano 2020).
#[inline]
pub fn pcg(v: u32) -> u32 {
    let state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

const PRIME32_2: u32 = 2_246_822_519;
const PRIME32_3: u32 = 3_266_489_917;
const PRIME32_4: u32 = 668_265_263;
const PRIME32_5: u32 = 374_761_393;

#[inline]
fn xxhash_round(h32: u32) -> u32 {
    PRIME32_4.wrapping_mul(h32.rotate_left(17))
}

#[inline]
fn xxhash_avalanche(h32: u32) -> u32 {
    let h32 = PRIME32_2.wrapping_mul(h32 ^ (h32 >> 15));
    let h32 = PRIME32_3.wrapping_mul(h32 ^ (h32 >> 13));
    h32 ^ (h32 >> 16)
}

/// Integer vectors accepted by [`xxhash32`].
pub trait XxHash32 {
    fn xxhash32(self) -> u32;
}

impl XxHash32 for UVec2 {
    fn xxhash32(self) -> u32 {
        let h32 = self
            .y
            .wrapping_add(PRIME32_5)
            .wrapping_add(self.x.wrapping_mul(PRIME32_3));
        xxhash_avalanche(xxhash_round(h32))
    }
}

impl XxHash32 for UVec3 {
    fn xxhash32(self) -> u32 {
        let mut h32 = self
            .z
            .wrapping_add(PRIME32_5)
            .wrapping_add(self.x.wrapping_mul(PRIME32_3));
        h32 = xxhash_round(h32);
        h32 = h32.wrapping_add(self.y.wrapping_mul(PRIME32_3));
        xxhash_avalanche(xxhash_round(h32))
    }
}

impl XxHash32 for UVec4 {
    fn xxhash32(self) -> u32 {
        let mut h32 = self
            .w
            .wrapping_add(PRIME32_5)
            .wrapping_add(self.x.wrapping_mul(PRIME32_3));
        h32 = xxhash_round(h32);
        h32 = h32.wrapping_add(self.y.wrapping_mul(PRIME32_3));
        h32 = xxhash_round(h32);
        h32 = h32.wrapping_add(self.z.wrapping_mul(PRIME32_3));
        xxhash_avalanche(xxhash_round(h32))
    }
}

/// xxHash32 of a 2, 3 or 4 component integer vector.
#[inline]
pub fn xxhash32<T: XxHash32>(seed: T) -> u32 {
    seed.xxhash32()
}

/// Per-pixel random stream: an LCG seeded by hashing (x, y, frame).
#[derive(Debug, Clone)]
pub struct PixelSampler {
    state: u32,
}

impl PixelSampler {
    pub fn new(x: u32, y: u32, frame: u32) -> Self {
        Self {
            state: xxhash32(UVec3::new(x, y, frame)),
        }
    }

    pub fn from_state(state: u32) -> Self {
        Self { state }
    }

    #[inline]
    pub fn next_1d(&mut self) -> f32 {
        lcg(&mut self.state)
    }

    #[inline]
    pub fn next_2d(&mut self) -> Vec2 {
        let x = lcg(&mut self.state);
        let y = lcg(&mut self.state);
        Vec2::new(x, y)
    }

    pub fn state(&self) -> u32 {
        self.state
    }
}

// =============================================================================
// Domain samplers
// =============================================================================

/// Uniform direction on the unit sphere.
pub fn sample_uniform_sphere(u: Vec2) -> Vec3 {
    let z = 1.0 - 2.0 * u.x;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u.y;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

#[inline]
pub fn pdf_uniform_sphere() -> f32 {
    0.25 * FRAC_1_PI
}

/// Uniform direction on the +Z hemisphere.
pub fn sample_uniform_hemisphere(u: Vec2) -> Vec3 {
    let z = u.x;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u.y;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

#[inline]
pub fn pdf_uniform_hemisphere() -> f32 {
    0.5 * FRAC_1_PI
}

/// Point in the unit disk, polar mapping.
pub fn sample_uniform_disk_polar(u: Vec2) -> Vec2 {
    let r = u.x.sqrt();
    let theta = 2.0 * PI * u.y;
    Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Point in the unit disk, Shirley-Chiu concentric mapping (lower distortion).
pub fn sample_uniform_disk_concentric(u: Vec2) -> Vec2 {
    let offset = 2.0 * u - Vec2::ONE;
    if offset.x == 0.0 && offset.y == 0.0 {
        return Vec2::ZERO;
    }
    let (r, theta) = if offset.x.abs() > offset.y.abs() {
        (offset.x, FRAC_PI_4 * (offset.y / offset.x))
    } else {
        (offset.y, FRAC_PI_2 - FRAC_PI_4 * (offset.x / offset.y))
    };
    r * Vec2::new(theta.cos(), theta.sin())
}

/// Cosine-weighted direction on the +Z hemisphere (Malley's method).
pub fn sample_cosine_hemisphere(u: Vec2) -> Vec3 {
    let d = sample_uniform_disk_concentric(u);
    let z = (1.0 - d.x * d.x - d.y * d.y).max(0.0).sqrt();
    Vec3::new(d.x, d.y, z)
}

/// Density of [`sample_cosine_hemisphere`]; `w` must be in the z-up frame.
#[inline]
pub fn pdf_cosine_hemisphere(w: Vec3) -> f32 {
    w.z * FRAC_1_PI
}

/// Uniform direction inside the cone around +Z with the given half-angle cosine.
pub fn sample_uniform_cone(u: Vec2, cos_theta_max: f32) -> Vec3 {
    let cos_theta = (1.0 - u.x) + u.x * cos_theta_max;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = 2.0 * PI * u.y;
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

#[inline]
pub fn pdf_uniform_cone(cos_theta_max: f32) -> f32 {
    1.0 / (2.0 * PI * (1.0 - cos_theta_max))
}

// =============================================================================
// Multiple importance sampling
// =============================================================================

/// Balance heuristic for `nf` samples from f and `ng` from g.
#[inline]
pub fn balance_heuristic_n(nf: f32, f_pdf: f32, ng: f32, g_pdf: f32) -> f32 {
    let f = nf * f_pdf;
    let sum = f + ng * g_pdf;
    if sum == 0.0 {
        return 0.0;
    }
    f / sum
}

/// Balance heuristic, one sample per strategy.
#[inline]
pub fn balance_heuristic(f_pdf: f32, g_pdf: f32) -> f32 {
    balance_heuristic_n(1.0, f_pdf, 1.0, g_pdf)
}

/// Power heuristic (exponent 2) for `nf` samples from f and `ng` from g.
#[inline]
pub fn power_heuristic_n(nf: f32, f_pdf: f32, ng: f32, g_pdf: f32) -> f32 {
    let f = nf * f_pdf;
    let g = ng * g_pdf;
    let ff = f * f;
    if ff.is_infinite() {
        return 1.0;
    }
    let sum = ff + g * g;
    if sum == 0.0 {
        return 0.0;
    }
    ff / sum
}

/// Power heuristic, one sample per strategy.
#[inline]
pub fn power_heuristic(f_pdf: f32, g_pdf: f32) -> f32 {
    power_heuristic_n(1.0, f_pdf, 1.0, g_pdf)
}
