//! Kinema Render - direct lighting for the Kinema scene graph
//!
//! Estimates direct illumination per pixel from point, rectangle and
//! ambient lights:
//!
//! - **Sampling**: hashed per-pixel random streams, domain samplers, MIS weights
//! - **Lights**: tagged light variants resolved from `LightData` records
//! - **RIS**: single-slot reservoir picking one light from many candidates
//! - **LTC**: closed-form irradiance of rectangle lights
//! - **G-buffer**: base color, normal, depth and ids of each pixel's primary hit
//!
//! Two back ends share these pieces. The CPU [`Integrator`] renders
//! centre-out buckets in parallel with rayon; the wgpu
//! [`DirectLightingPass`] runs the same steps as a compute kernel.

pub mod gpu;
pub mod kernel;
pub mod light;
pub mod ltc;
pub mod reservoir;
pub mod sampling;
pub mod shading;
pub mod shadow_terminator;

mod bucket;
mod camera;
mod config;
mod gbuffer;
mod geometry;
mod hittable;
mod integrator;
mod triangle;

pub use bucket::{generate_buckets, render_bucket, Bucket, BucketResult, DEFAULT_BUCKET_SIZE};
pub use camera::{Camera, CameraRaster};
pub use config::{AreaLightMode, ConfigError, RenderConfig};
pub use gbuffer::{FrameBufferView, GBuffer, GBufferSample, NO_HIT};
pub use geometry::SceneGeometry;
pub use gpu::{DirectLightingPass, GpuContext, GpuError, GpuResult, LtcPass, LtcQuery};
pub use hittable::{HitRecord, Hittable};
pub use integrator::{luminance, render_frame, Integrator, ShadedPixel};
pub use kernel::{Kernel, KernelCache};
pub use light::{Light, LightLiSample, LightSet};
pub use ltc::ltc_evaluate;
pub use reservoir::{ReservoirSample, RisReservoir};
pub use sampling::PixelSampler;
pub use shading::{fresnel_schlick, BlinnPhong};
pub use shadow_terminator::shadow_terminator;
pub use triangle::Triangle;

/// Re-export the math and scene types the renderer's API is written in
pub use kinema_core::{LightData, LightType, SceneView};
pub use kinema_math::{Color, Ray, TransformData, Vec3};
