//! wgpu compute passes.
//!
//! [`DirectLightingPass`] runs the per-pixel kernel over the same data the
//! CPU integrator reads: world-space triangles, materials, the scene's
//! `TransformData` and `LightData` records and a frame uniform, all staged
//! into storage buffers with `bytemuck`. The packed G-buffer is read back
//! into a [`GBuffer`] and its borrowed frame buffer.
//!
//! [`LtcPass`] evaluates batches of LTC irradiance queries.

use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use kinema_core::{InstanceId, LightData, SceneView, INVALID_ID};
use kinema_math::{Color, Mat3, Mat4, TransformData, Vec3};
use once_cell::sync::OnceCell;
use thiserror::Error;
use wgpu::util::DeviceExt;

use crate::camera::Camera;
use crate::config::{AreaLightMode, RenderConfig};
use crate::gbuffer::GBuffer;
use crate::geometry::SceneGeometry;
use crate::kernel::{Kernel, KernelCache};
use crate::light::LightSet;
use crate::triangle::Triangle;

/// Errors raised by the GPU passes.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("failed to map readback buffer: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("readback channel closed before the buffer was mapped")]
    ReadbackLost,

    #[error("G-buffer is {actual:?} but the camera renders {expected:?}")]
    GBufferSize { expected: (u32, u32), actual: (u32, u32) },
}

/// Result type for GPU operations.
pub type GpuResult<T> = Result<T, GpuError>;

/// Kernel flag: rectangle lights use the LTC path.
pub const FLAG_LTC: u32 = 1;
/// Kernel flag: secondary-ray origins use the shadow-terminator correction.
pub const FLAG_SHADOW_TERMINATOR: u32 = 2;
/// Kernel flag: the camera has a thin lens.
pub const FLAG_THIN_LENS: u32 = 4;

const WORKGROUP_SIZE_2D: u32 = 8;
const WORKGROUP_SIZE_1D: u32 = 64;

/// Device, queue and compiled kernels.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
    kernels: KernelCache,
}

impl GpuContext {
    /// Open the highest-performance adapter without a surface.
    pub fn new() -> GpuResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Kinema Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let info = adapter.get_info();
        log::info!("GPU adapter: {} ({:?})", info.name, info.backend);

        Ok(Self {
            device,
            queue,
            adapter,
            kernels: KernelCache::new(),
        })
    }

    /// Process-wide context, created on first use.
    pub fn shared() -> GpuResult<&'static GpuContext> {
        static CONTEXT: OnceCell<GpuContext> = OnceCell::new();
        CONTEXT.get_or_try_init(GpuContext::new)
    }

    pub fn kernels(&self) -> &KernelCache {
        &self.kernels
    }

    fn compute_pipeline(&self, kernel: Kernel, layout: &wgpu::BindGroupLayout) -> wgpu::ComputePipeline {
        let module = self.kernels.get_or_compile(&self.device, kernel);
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(kernel.label()),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });
        self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kernel.label()),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: kernel.entry_point(),
            compilation_options: Default::default(),
            cache: None,
        })
    }

    /// Copy `count` elements of `source` back to the host.
    fn read_back<T: Pod>(&self, source: &wgpu::Buffer, count: usize) -> GpuResult<Vec<T>> {
        let size = (count * std::mem::size_of::<T>()) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kinema Readback"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Kinema Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv().map_err(|_| GpuError::ReadbackLost)??;

        let mut out = vec![T::zeroed(); count];
        {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(&data);
        }
        staging.unmap();
        Ok(out)
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter.get_info().name)
            .field("kernels", &self.kernels)
            .finish()
    }
}

// =============================================================================
// Host-visible layouts
// =============================================================================

/// Per-frame constants of the direct-lighting kernel.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameUniform {
    pub camera_center: [f32; 3],
    pub width: u32,
    pub pixel00: [f32; 3],
    pub height: u32,
    pub delta_u: [f32; 3],
    pub samples_per_pixel: u32,
    pub delta_v: [f32; 3],
    pub ris_candidates: u32,
    pub defocus_u: [f32; 3],
    pub frame_index: u32,
    pub defocus_v: [f32; 3],
    /// `FLAG_*` bits
    pub flags: u32,
    pub background: [f32; 3],
    pub far_plane: f32,
    pub triangle_count: u32,
    pub light_count: u32,
    pub instance_count: u32,
    pub material_count: u32,
}

/// World-space triangle; the ids ride in the padding lanes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    pub p0: [f32; 3],
    pub instance_id: u32,
    pub p1: [f32; 3],
    pub material_id: u32,
    pub p2: [f32; 3],
    pub _pad0: u32,
    pub n0: [f32; 3],
    pub _pad1: f32,
    pub n1: [f32; 3],
    pub _pad2: f32,
    pub n2: [f32; 3],
    pub _pad3: f32,
}

impl From<&Triangle> for GpuTriangle {
    fn from(tri: &Triangle) -> Self {
        let [p0, p1, p2] = tri.positions.map(|p| p.to_array());
        let [n0, n1, n2] = tri.normals.map(|n| n.to_array());
        Self {
            p0,
            instance_id: tri.instance_id,
            p1,
            material_id: tri.material_id,
            p2,
            _pad0: 0,
            n0,
            _pad1: 0.0,
            n1,
            _pad2: 0.0,
            n2,
            _pad3: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub base_color: [f32; 3],
    pub roughness: f32,
    pub specular_tint: [f32; 3],
    pub metalness: f32,
}

impl From<&kinema_core::Material> for GpuMaterial {
    fn from(material: &kinema_core::Material) -> Self {
        Self {
            base_color: material.base_color.to_array(),
            roughness: material.roughness,
            specular_tint: material.specular_tint.to_array(),
            metalness: material.metalness,
        }
    }
}

/// One pixel of the packed G-buffer written by the kernel.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GBufferTexel {
    pub base_color: [f32; 4],
    pub normal: [f32; 4],
    pub radiance: [f32; 4],
    pub depth: f32,
    pub instance_id: u32,
    pub material_id: u32,
    pub _pad: u32,
}

/// One LTC irradiance query.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LtcQuery {
    pub normal: [f32; 3],
    pub _pad0: f32,
    pub view: [f32; 3],
    pub _pad1: f32,
    pub position: [f32; 3],
    pub _pad2: f32,
    /// Columns of the inverse LTC matrix
    pub m_inv: [[f32; 4]; 3],
    pub corners: [[f32; 4]; 4],
}

impl LtcQuery {
    pub fn new(n: Vec3, v: Vec3, p: Vec3, m_inv: Mat3, corners: [Vec3; 4]) -> Self {
        Self {
            normal: n.to_array(),
            _pad0: 0.0,
            view: v.to_array(),
            _pad1: 0.0,
            position: p.to_array(),
            _pad2: 0.0,
            m_inv: [m_inv.x_axis, m_inv.y_axis, m_inv.z_axis].map(|c| c.extend(0.0).to_array()),
            corners: corners.map(|c| c.extend(1.0).to_array()),
        }
    }
}

// =============================================================================
// Scene staging
// =============================================================================

/// Host-side copy of everything the direct-lighting kernel binds.
#[derive(Debug, Clone)]
pub struct StagedScene {
    pub uniform: FrameUniform,
    pub triangles: Vec<GpuTriangle>,
    pub materials: Vec<GpuMaterial>,
    pub transforms: Vec<TransformData>,
    pub lights: Vec<LightData>,
    /// Per instance slot: index of its emitting rectangle light or `INVALID_ID`
    pub instance_lights: Vec<u32>,
    /// Per light: 1 when BSDF rays can hit its emitter
    pub light_emitters: Vec<u32>,
}

impl StagedScene {
    /// Flatten `scene` for one frame. `camera` must be initialised.
    pub fn build(scene: SceneView<'_>, camera: &Camera, config: &RenderConfig) -> Self {
        let geometry = SceneGeometry::build(scene);
        let light_set = LightSet::gather(scene);

        let triangles: Vec<GpuTriangle> = geometry.triangles().iter().map(GpuTriangle::from).collect();
        let materials: Vec<GpuMaterial> = scene.materials().iter().map(GpuMaterial::from).collect();

        let slots = scene.instance_slot_count();
        let transforms: Vec<TransformData> = (0..slots)
            .map(|slot| {
                scene
                    .transform_data(slot as InstanceId)
                    .copied()
                    .unwrap_or_else(|| TransformData::new(Mat4::IDENTITY))
            })
            .collect();

        let instance_lights: Vec<u32> = (0..slots)
            .map(|slot| {
                light_set
                    .for_instance(slot as InstanceId)
                    .map_or(INVALID_ID, |(index, _)| index as u32)
            })
            .collect();
        let light_emitters = (0..light_set.len())
            .map(|index| light_set.is_emitter(index) as u32)
            .collect();

        let raster = camera.raster();
        let mut flags = 0;
        if config.area_light_mode == AreaLightMode::Ltc {
            flags |= FLAG_LTC;
        }
        if config.shadow_terminator {
            flags |= FLAG_SHADOW_TERMINATOR;
        }
        if raster.thin_lens {
            flags |= FLAG_THIN_LENS;
        }

        let uniform = FrameUniform {
            camera_center: raster.center.to_array(),
            width: camera.image_width,
            pixel00: raster.pixel00.to_array(),
            height: camera.image_height,
            delta_u: raster.delta_u.to_array(),
            samples_per_pixel: config.samples_per_pixel.max(1),
            delta_v: raster.delta_v.to_array(),
            ris_candidates: config.ris_candidates,
            defocus_u: raster.defocus_u.to_array(),
            frame_index: config.frame_index,
            defocus_v: raster.defocus_v.to_array(),
            flags,
            background: config.background.to_array(),
            far_plane: config.far_plane,
            triangle_count: triangles.len() as u32,
            light_count: light_set.len() as u32,
            instance_count: slots as u32,
            material_count: materials.len() as u32,
        };

        Self {
            uniform,
            triangles,
            materials,
            transforms,
            lights: light_set.records().to_vec(),
            instance_lights,
            light_emitters,
        }
    }
}

/// Storage buffers cannot be empty; pad with one unused element.
fn non_empty<T: Pod>(items: &[T], filler: T) -> Vec<T> {
    if items.is_empty() {
        vec![filler]
    } else {
        items.to_vec()
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_buffer(device: &wgpu::Device, label: &str, contents: &[u8]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::STORAGE,
    })
}

// =============================================================================
// Passes
// =============================================================================

/// Direct lighting and G-buffer fill on the GPU.
pub struct DirectLightingPass {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl DirectLightingPass {
    pub fn new(ctx: &GpuContext) -> Self {
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Direct Lighting Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, true),
                storage_entry(6, true),
                storage_entry(7, false),
            ],
        });
        let pipeline = ctx.compute_pipeline(Kernel::DirectLighting, &layout);
        Self { layout, pipeline }
    }

    /// Render `scene` through `camera` into `gbuffer`.
    ///
    /// The G-buffer must match the camera's resolution.
    pub fn render(
        &self,
        ctx: &GpuContext,
        scene: SceneView<'_>,
        camera: &Camera,
        config: &RenderConfig,
        gbuffer: &mut GBuffer<'_>,
    ) -> GpuResult<()> {
        let expected = (camera.image_width, camera.image_height);
        let actual = (gbuffer.width(), gbuffer.height());
        if expected != actual {
            return Err(GpuError::GBufferSize { expected, actual });
        }

        let staged = StagedScene::build(scene, camera, config);
        let texels = self.dispatch(ctx, &staged)?;

        let (base_color, normal, depth, instance_id, material_id) = gbuffer.channels_mut();
        for (i, texel) in texels.iter().enumerate() {
            base_color[i] = texel.base_color;
            normal[i] = texel.normal;
            depth[i] = [texel.depth, 0.0, 0.0, 0.0];
            instance_id[i] = [texel.instance_id, 0, 0, 0];
            material_id[i] = [texel.material_id, 0, 0, 0];
        }
        if let Some(frame) = gbuffer.frame_buffer_mut() {
            for (pixel, texel) in frame.iter_mut().zip(&texels) {
                *pixel = texel.radiance;
            }
        }

        log::info!(
            "GPU frame {} ({}x{}, {} triangles, {} lights)",
            config.frame_index,
            expected.0,
            expected.1,
            staged.uniform.triangle_count,
            staged.uniform.light_count
        );
        Ok(())
    }

    /// Upload `staged`, run the kernel and return the packed G-buffer.
    pub fn dispatch(&self, ctx: &GpuContext, staged: &StagedScene) -> GpuResult<Vec<GBufferTexel>> {
        let device = &ctx.device;
        let width = staged.uniform.width;
        let height = staged.uniform.height;
        let pixel_count = (width as usize) * (height as usize);
        if pixel_count == 0 {
            return Ok(Vec::new());
        }

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame Uniform Buffer"),
            contents: bytemuck::bytes_of(&staged.uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let triangles = non_empty(&staged.triangles, GpuTriangle::zeroed());
        let materials = non_empty(&staged.materials, GpuMaterial::zeroed());
        let transforms = non_empty(&staged.transforms, TransformData::new(Mat4::IDENTITY));
        let lights = non_empty(&staged.lights, LightData::INVALID);
        let instance_lights = non_empty(&staged.instance_lights, INVALID_ID);
        let light_emitters = non_empty(&staged.light_emitters, 0u32);

        let triangle_buffer = storage_buffer(device, "Triangle Buffer", bytemuck::cast_slice(&triangles));
        let material_buffer = storage_buffer(device, "Material Buffer", bytemuck::cast_slice(&materials));
        let transform_buffer = storage_buffer(device, "Transform Buffer", bytemuck::cast_slice(&transforms));
        let light_buffer = storage_buffer(device, "Light Buffer", bytemuck::cast_slice(&lights));
        let instance_light_buffer =
            storage_buffer(device, "Instance Light Buffer", bytemuck::cast_slice(&instance_lights));
        let emitter_buffer = storage_buffer(device, "Light Emitter Buffer", bytemuck::cast_slice(&light_emitters));
        let gbuffer_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GBuffer Buffer"),
            size: (pixel_count * std::mem::size_of::<GBufferTexel>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Direct Lighting Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: triangle_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: material_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: transform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: instance_light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: emitter_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: gbuffer_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Direct Lighting Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Direct Lighting Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                width.div_ceil(WORKGROUP_SIZE_2D),
                height.div_ceil(WORKGROUP_SIZE_2D),
                1,
            );
        }
        ctx.queue.submit(Some(encoder.finish()));

        log::debug!(
            "Dispatched direct lighting over {}x{} ({} workgroups)",
            width,
            height,
            width.div_ceil(WORKGROUP_SIZE_2D) * height.div_ceil(WORKGROUP_SIZE_2D)
        );
        ctx.read_back(&gbuffer_buffer, pixel_count)
    }
}

/// Batch LTC irradiance evaluation on the GPU.
pub struct LtcPass {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl LtcPass {
    pub fn new(ctx: &GpuContext) -> Self {
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LTC Bind Group Layout"),
            entries: &[storage_entry(0, true), storage_entry(1, false)],
        });
        let pipeline = ctx.compute_pipeline(Kernel::LtcIrradiance, &layout);
        Self { layout, pipeline }
    }

    /// Irradiance coefficient of each query, in order.
    pub fn evaluate(&self, ctx: &GpuContext, queries: &[LtcQuery]) -> GpuResult<Vec<Color>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let device = &ctx.device;

        let query_buffer = storage_buffer(device, "LTC Query Buffer", bytemuck::cast_slice(queries));
        let result_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("LTC Result Buffer"),
            size: (queries.len() * std::mem::size_of::<[f32; 4]>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LTC Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: query_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: result_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("LTC Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("LTC Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups((queries.len() as u32).div_ceil(WORKGROUP_SIZE_1D), 1, 1);
        }
        ctx.queue.submit(Some(encoder.finish()));

        let results: Vec<[f32; 4]> = ctx.read_back(&result_buffer, queries.len())?;
        Ok(results
            .into_iter()
            .map(|[r, g, b, _]| Color::new(r, g, b))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::{render_frame, Integrator};
    use crate::ltc::ltc_evaluate;
    use kinema_core::{Material, Mesh, Scene};
    use std::f32::consts::PI;

    fn gpu() -> Option<&'static GpuContext> {
        let _ = env_logger::builder().is_test(true).try_init();
        match GpuContext::shared() {
            Ok(ctx) => Some(ctx),
            Err(err) => {
                log::warn!("Skipping GPU test: {}", err);
                None
            }
        }
    }

    fn lit_floor() -> Scene {
        let mut scene = Scene::new("gpu floor");
        let floor_mesh = scene.add_mesh(Mesh::quad(20.0, 20.0)).unwrap();
        let lamp_mesh = scene.add_mesh(Mesh::quad(2.0, 2.0)).unwrap();
        let floor_mat = scene.add_material(Material::new("floor", Color::splat(0.5)).with_roughness(0.8));
        let lamp_mat = scene.add_material(Material::new("lamp", Color::ZERO));

        scene.add_instance(Some(floor_mesh), floor_mat, Mat4::IDENTITY).unwrap();
        let lamp = scene
            .add_instance(
                Some(lamp_mesh),
                lamp_mat,
                Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0)) * Mat4::from_rotation_x(PI),
            )
            .unwrap();
        scene
            .register_light(LightData::rect(lamp, Color::ONE, 4.0, 2.0, 2.0))
            .unwrap();
        let sky = scene.add_instance(None, floor_mat, Mat4::IDENTITY).unwrap();
        scene
            .register_light(LightData::constant(sky, Color::new(0.1, 0.1, 0.2), 1.0))
            .unwrap();
        scene
    }

    fn camera(width: u32, height: u32) -> Camera {
        let mut camera = Camera::new()
            .with_resolution(width, height)
            .with_position(Vec3::new(0.0, -6.0, 3.0), Vec3::ZERO, Vec3::Z)
            .with_lens(50.0, 0.0, 1.0);
        camera.initialize();
        camera
    }

    #[test]
    fn test_layout_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<FrameUniform>(), 128);
        assert_eq!(std::mem::size_of::<GpuTriangle>(), 96);
        assert_eq!(std::mem::size_of::<GpuMaterial>(), 32);
        assert_eq!(std::mem::size_of::<GBufferTexel>(), 64);
        assert_eq!(std::mem::size_of::<LtcQuery>(), 160);
        assert_eq!(std::mem::size_of::<TransformData>(), 224);
        assert_eq!(std::mem::size_of::<LightData>(), 32);
    }

    #[test]
    fn test_staging_mirrors_the_light_set() {
        let scene = lit_floor();
        let config = RenderConfig {
            area_light_mode: AreaLightMode::Ltc,
            ..Default::default()
        };
        let staged = StagedScene::build(scene.view(), &camera(4, 4), &config);

        assert_eq!(staged.triangles.len(), 4);
        assert_eq!(staged.materials.len(), 2);
        assert_eq!(staged.transforms.len(), 3);
        assert_eq!(staged.lights.len(), 2);
        // Only the lamp's surface can be hit; the sky has no emitter
        assert_eq!(staged.instance_lights, vec![INVALID_ID, 0, INVALID_ID]);
        assert_eq!(staged.light_emitters, vec![1, 0]);
        assert_eq!(staged.uniform.flags, FLAG_LTC | FLAG_SHADOW_TERMINATOR);
        assert_eq!(staged.uniform.light_count, 2);
        assert_eq!(staged.uniform.instance_count, 3);
        assert_eq!(staged.triangles[2].instance_id, 1);
    }

    #[test]
    fn test_shared_instance_stages_its_rect_emitter() {
        let mut scene = lit_floor();
        scene
            .register_light(LightData::point(1, Color::ONE, 0.0, 0.0))
            .unwrap();
        let staged = StagedScene::build(scene.view(), &camera(4, 4), &RenderConfig::default());
        assert_eq!(staged.lights.len(), 3);
        assert_eq!(staged.instance_lights, vec![INVALID_ID, 0, INVALID_ID]);
        assert_eq!(staged.light_emitters, vec![1, 0, 0]);
    }

    #[test]
    fn test_removed_instances_stage_identity_transforms() {
        let mut scene = lit_floor();
        scene.remove_instance(0).unwrap();
        let staged = StagedScene::build(scene.view(), &camera(4, 4), &RenderConfig::default());
        assert_eq!(staged.transforms.len(), 3);
        assert_eq!(staged.transforms[0], TransformData::new(Mat4::IDENTITY));
        assert_eq!(staged.triangles.len(), 2);
    }

    #[test]
    fn test_kernels_compile_once_per_device() {
        let Some(ctx) = gpu() else {
            return;
        };
        let a = ctx.kernels().get_or_compile(&ctx.device, Kernel::LtcIrradiance);
        let b = ctx.kernels().get_or_compile(&ctx.device, Kernel::LtcIrradiance);
        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert!(!ctx.kernels().is_empty());
    }

    #[test]
    fn test_gpu_ltc_matches_cpu() {
        let Some(ctx) = gpu() else {
            return;
        };
        let corners = [
            Vec3::new(-1.0, -1.0, 2.0),
            Vec3::new(-1.0, 1.0, 2.0),
            Vec3::new(1.0, 1.0, 2.0),
            Vec3::new(1.0, -1.0, 2.0),
        ];
        let cases = [
            (Vec3::Z, Vec3::new(0.0, -0.6, 0.8), Vec3::ZERO),
            (Vec3::Z, Vec3::Z, Vec3::new(1.5, 0.5, 0.0)),
            (Vec3::new(0.6, 0.0, 0.8), Vec3::Z, Vec3::new(-0.5, 0.0, 0.5)),
        ];
        let queries: Vec<LtcQuery> = cases
            .iter()
            .map(|&(n, v, p)| LtcQuery::new(n, v, p, Mat3::IDENTITY, corners))
            .collect();

        let results = LtcPass::new(ctx).evaluate(ctx, &queries).unwrap();
        assert_eq!(results.len(), cases.len());
        for (&(n, v, p), gpu) in cases.iter().zip(&results) {
            let cpu = ltc_evaluate(n, v, p, Mat3::IDENTITY, corners);
            assert!((cpu.x - gpu.x).abs() < 1e-3, "cpu {} gpu {}", cpu.x, gpu.x);
        }
    }

    #[test]
    fn test_gpu_matches_cpu_reference() {
        let Some(ctx) = gpu() else {
            return;
        };
        let scene = lit_floor();
        let config = RenderConfig {
            width: 24,
            height: 16,
            samples_per_pixel: 8,
            ..Default::default()
        };
        let camera = camera(config.width, config.height);

        let mut cpu_pixels = vec![[0.0f32; 4]; 24 * 16];
        let mut cpu = GBuffer::with_frame_buffer(
            crate::gbuffer::FrameBufferView::new(&mut cpu_pixels, 24, 16).unwrap(),
        );
        render_frame(&Integrator::new(scene.view(), &config), &camera, &mut cpu);

        let mut gpu_pixels = vec![[0.0f32; 4]; 24 * 16];
        let mut gpu = GBuffer::with_frame_buffer(
            crate::gbuffer::FrameBufferView::new(&mut gpu_pixels, 24, 16).unwrap(),
        );
        DirectLightingPass::new(ctx)
            .render(ctx, scene.view(), &camera, &config, &mut gpu)
            .unwrap();

        let same_ids = cpu
            .instance_id()
            .iter()
            .zip(gpu.instance_id())
            .filter(|(a, b)| a[0] == b[0])
            .count();
        assert!(same_ids as f32 >= 0.98 * (24 * 16) as f32);

        let mean = |pixels: &[[f32; 4]]| pixels.iter().map(|p| p[0] + p[1] + p[2]).sum::<f32>() / pixels.len() as f32;
        let cpu_mean = mean(cpu.frame_buffer().unwrap());
        let gpu_mean = mean(gpu.frame_buffer().unwrap());
        assert!(cpu_mean > 0.0);
        assert!((cpu_mean - gpu_mean).abs() < 0.05 * cpu_mean, "cpu {} gpu {}", cpu_mean, gpu_mean);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let Some(ctx) = gpu() else {
            return;
        };
        let scene = lit_floor();
        let mut gbuffer = GBuffer::new(3, 3);
        let err = DirectLightingPass::new(ctx)
            .render(ctx, scene.view(), &camera(4, 4), &RenderConfig::default(), &mut gbuffer)
            .unwrap_err();
        assert!(matches!(err, GpuError::GBufferSize { .. }));
    }
}
