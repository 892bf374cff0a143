//! Linearly transformed cosines for polygonal area lights.
//!
//! Integrates a clamped cosine, warped by an inverse LTC matrix, over a
//! quadrilateral light in closed form (Heitz et al. 2016). With an identity
//! matrix this is the exact Lambertian form factor of the polygon.

use std::f32::consts::{PI, TAU};

use kinema_math::{Color, Frame, Mat3, Vec3};

/// Contribution of the edge `v1 -> v2` to the vector form factor.
///
/// `acos(x) / sqrt(1 - x^2)` is replaced by a minimax polynomial on
/// `x = |v1 . v2|` (max relative error 2.69e-6); negative dot products are
/// recovered with `pi / sqrt(1 - x^2) - y`. The constants are shared with
/// `shaders/ltc.wgsl` and must stay bit-identical.
pub fn compute_edge_factor(v1: Vec3, v2: Vec3) -> Vec3 {
    let v1_o_v2 = v1.dot(v2);
    let v1_x_v2 = v1.cross(v2);

    let x = v1_o_v2.abs();
    let mut y = 1.5707921083647782
        + x * (-0.9995697178013095
            + x * (0.778026455830408
                + x * (-0.6173111361273548
                    + x * (0.4202724111150622
                        + x * (-0.19452783598217288 + x * 0.04232040013661036)))));

    if v1_o_v2 < 0.0 {
        // Undo range reduction
        const EPSILON: f32 = 1e-5;
        y = PI * (1.0 - v1_o_v2 * v1_o_v2).max(EPSILON).sqrt().recip() - y;
    }

    v1_x_v2 * y
}

/// Vector form factor of a quadrilateral given by directions from the shading point.
pub fn polygon_form_factor(l: [Vec3; 4]) -> Vec3 {
    let l = l.map(|v| v.normalize_or_zero());

    let mut f = compute_edge_factor(l[0], l[1]);
    f += compute_edge_factor(l[1], l[2]);
    f += compute_edge_factor(l[2], l[3]);
    f += compute_edge_factor(l[3], l[0]);

    f / TAU
}

/// Scalar irradiance from a vector form factor, with the horizon
/// clipping approximated by a sphere of the same form factor.
pub fn polygon_irradiance_from_vector_form_factor(f: Vec3) -> f32 {
    let l = f.length();
    ((l * l + f.z) / (l + 1.0)).max(0.0)
}

/// Irradiance of quad `l` at `p` for normal `n`, view direction `v` and
/// inverse LTC matrix `m_inv`, broadcast to RGB.
///
/// The result is a monochrome coefficient; callers multiply it by the
/// separately evaluated material color and the light's radiance.
pub fn ltc_evaluate(n: Vec3, v: Vec3, p: Vec3, m_inv: Mat3, l: [Vec3; 4]) -> Color {
    // Construct orthonormal basis around N
    let frame = Frame::from_normal_and_view(n, v);
    let to_local = Mat3::from_cols(frame.tangent, frame.bitangent, frame.normal).transpose();

    // Rotate area light in (T1, T2, N) basis
    let m_inv = m_inv * to_local;
    let polygon = l.map(|corner| m_inv * (corner - p));

    let f = polygon_form_factor(polygon);
    Color::splat(polygon_irradiance_from_vector_form_factor(f))
}
