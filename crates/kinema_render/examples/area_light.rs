// Render a floor lit by a rectangle light, a small sphere light and a dim sky.
// Run with: cargo run --release --example area_light -- [out.ppm] [config.json]

use std::f32::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result};
use kinema_core::{LightData, Material, Mesh, Scene};
use kinema_math::{Color, Mat4, Vec3};
use kinema_render::{
    render_frame, AreaLightMode, Camera, FrameBufferView, GBuffer, Integrator, RenderConfig,
};

fn build_scene() -> Result<Scene> {
    let mut scene = Scene::new("area_light");

    let floor_mesh = scene.add_mesh(Mesh::quad(12.0, 12.0))?;
    let wall_mesh = scene.add_mesh(Mesh::quad(12.0, 4.0))?;
    let lamp_mesh = scene.add_mesh(Mesh::quad(1.5, 1.0))?;

    let floor = scene.add_material(
        Material::new("floor", Color::new(0.7, 0.68, 0.6))
            .with_roughness(0.6)
            .with_specular_tint(Color::splat(0.5)),
    );
    let wall = scene.add_material(Material::new("wall", Color::new(0.3, 0.45, 0.7)).with_roughness(0.9));
    let lamp = scene.add_material(Material::new("lamp", Color::ZERO).with_specular_tint(Color::ZERO));

    scene.add_instance(Some(floor_mesh), floor, Mat4::IDENTITY)?;
    scene.add_instance(
        Some(wall_mesh),
        wall,
        Mat4::from_translation(Vec3::new(0.0, 3.0, 2.0)) * Mat4::from_rotation_x(PI / 2.0),
    )?;

    // Tilted panel above the floor, emitting downwards
    let panel = scene.add_instance(
        Some(lamp_mesh),
        lamp,
        Mat4::from_translation(Vec3::new(-0.8, 0.5, 2.2)) * Mat4::from_rotation_x(PI - 0.3),
    )?;
    scene.register_light(LightData::rect(panel, Color::new(1.0, 0.9, 0.75), 12.0, 1.5, 1.0))?;

    let bulb = scene.add_instance(None, lamp, Mat4::from_translation(Vec3::new(1.8, -0.5, 1.2)))?;
    scene.register_light(LightData::point(bulb, Color::new(0.6, 0.8, 1.0), 6.0, 0.1))?;

    let sky = scene.add_instance(None, lamp, Mat4::IDENTITY)?;
    scene.register_light(LightData::constant(sky, Color::new(0.5, 0.6, 0.8), 0.05))?;

    Ok(scene)
}

fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

fn write_ppm(path: &str, pixels: &[[f32; 4]], width: u32, height: u32) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path))?;
    let mut out = BufWriter::new(file);
    write!(out, "P6\n{} {}\n255\n", width, height)?;
    for pixel in pixels {
        let rgb = [pixel[0], pixel[1], pixel[2]].map(|c| (255.0 * linear_to_gamma(c).clamp(0.0, 1.0)) as u8);
        out.write_all(&rgb)?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let output = args.get(1).map(String::as_str).unwrap_or("area_light.ppm");
    let config = match args.get(2) {
        Some(path) => RenderConfig::load(path)?,
        None => RenderConfig {
            width: 480,
            height: 270,
            samples_per_pixel: 32,
            area_light_mode: AreaLightMode::Stochastic,
            background: Color::splat(0.02),
            ..Default::default()
        },
    };
    config.validate()?;

    let mut scene = build_scene()?;
    scene.begin_frame();

    let mut camera = Camera::new()
        .with_resolution(config.width, config.height)
        .with_position(Vec3::new(0.0, -6.0, 2.5), Vec3::new(0.0, 0.5, 0.6), Vec3::Z)
        .with_lens(45.0, 0.0, 1.0);
    camera.initialize();

    let mut pixels = vec![[0.0f32; 4]; (config.width * config.height) as usize];
    {
        let frame = FrameBufferView::new(&mut pixels, config.width, config.height)
            .context("frame buffer does not match the image size")?;
        let mut gbuffer = GBuffer::with_frame_buffer(frame);
        let integrator = Integrator::new(scene.view(), &config);
        render_frame(&integrator, &camera, &mut gbuffer);
    }

    write_ppm(output, &pixels, config.width, config.height)?;
    log::info!("Wrote {}", output);
    Ok(())
}
