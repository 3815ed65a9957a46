//! Scene viewer demo
//!
//! Builds a small scene (ground plane, an orbiting hierarchy, a field of
//! identical crates that the engine batches into one instanced draw) and
//! drives the renderer through the headless backend for a fixed number of
//! frames, toggling features along the way and logging frame statistics.
//!
//! Usage: `scene_viewer [renderer.toml|renderer.ron]`

use std::sync::Arc;

use rand::prelude::*;
use rust_renderer::config::Config;
use rust_renderer::foundation::logging;
use rust_renderer::prelude::*;

const FRAME_COUNT: u64 = 240;
const CRATE_COUNT: usize = 32;
const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn load_config() -> RendererConfig {
    match std::env::args().nth(1) {
        Some(path) => match RendererConfig::load_from_file(&path) {
            Ok(config) => {
                log::info!("Loaded renderer configuration from {}", path);
                config
            }
            Err(e) => {
                log::warn!("Could not load {}: {}; using defaults", path, e);
                RendererConfig::default()
            }
        },
        None => RendererConfig::default(),
    }
}

/// Scene nodes the demo animates
struct Rig {
    pivot: NodeId,
    moon: NodeId,
}

fn build_scene(rng: &mut StdRng) -> Result<(Scene, Rig), Box<dyn std::error::Error>> {
    let mut scene = Scene::new();
    scene.set_camera(Camera::perspective(
        Vec3::new(0.0, 6.0, 14.0),
        60.0,
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        200.0,
    ));
    scene.add_light(Light::directional(Vec3::new(-0.4, -1.0, -0.3), Vec3::new(1.0, 0.95, 0.9), 3.0));
    scene.add_light(Light::point(Vec3::new(2.0, 3.0, 2.0), Vec3::new(1.0, 0.4, 0.2), 8.0, 12.0));
    scene.set_ambient(Vec3::repeat(0.05));

    let graph = scene.graph_mut();

    let ground = graph.create_node("ground");
    graph.set_mesh(ground, Some(Arc::new(Mesh::plane(40.0, 40.0, 8.0).with_name("ground"))))?;
    graph.set_material(
        ground,
        Some(Arc::new(Material::pbr(PbrParams { roughness: 0.9, ..PbrParams::default() }))),
    )?;

    // Orbiting hierarchy: pivot -> planet -> moon
    let pivot = graph.create_node("pivot");
    graph.set_local_transform(pivot, Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))?;
    let planet = graph.create_child(pivot, "planet")?;
    graph.set_local_transform(planet, Transform::from_position(Vec3::new(3.0, 0.0, 0.0)))?;
    graph.set_mesh(planet, Some(Arc::new(Mesh::cube(0.75).with_name("planet"))))?;
    let glowing = PbrParams { emissive: Vec3::new(4.0, 2.0, 0.5), ..PbrParams::default() };
    graph.set_material(planet, Some(Arc::new(Material::pbr(glowing))))?;
    let moon = graph.create_child(planet, "moon")?;
    graph.set_local_transform(moon, Transform::from_position(Vec3::new(1.5, 0.0, 0.0)).with_scale(Vec3::repeat(0.3)))?;
    graph.set_mesh(moon, Some(Arc::new(Mesh::cube(1.0).with_name("moon"))))?;

    // Crates sharing one mesh and one material
    let crate_mesh = Arc::new(Mesh::cube(0.4).with_name("crate"));
    let crate_material = Arc::new(Material::phong(PhongParams::default()).with_name("crate"));
    for i in 0..CRATE_COUNT {
        let node = graph.create_node(format!("crate {}", i));
        let position = Vec3::new(rng.gen_range(-15.0..15.0), 0.4, rng.gen_range(-15.0..15.0));
        graph.set_local_transform(node, Transform::from_position(position))?;
        graph.set_mesh(node, Some(crate_mesh.clone()))?;
        graph.set_material(node, Some(crate_material.clone()))?;
    }

    Ok((scene, Rig { pivot, moon }))
}

fn animate(engine: &mut RenderEngine<HeadlessBackend>, rig: &Rig, time: f32) -> Result<(), Box<dyn std::error::Error>> {
    let Some(scene) = engine.scene_mut() else { return Ok(()) };
    let graph = scene.graph_mut();

    let spin = Quat::from_axis_angle(&Vec3::y_axis(), time * 0.5);
    graph.set_local_transform(rig.pivot, Transform::from_position_rotation(Vec3::new(0.0, 2.0, 0.0), spin))?;
    let wobble = Quat::from_axis_angle(&Vec3::x_axis(), time * 2.0);
    let moon = Transform::from_position_rotation(Vec3::new(1.5, 0.0, 0.0), wobble).with_scale(Vec3::repeat(0.3));
    graph.set_local_transform(rig.moon, moon)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_with_level(log::LevelFilter::Info);

    let mut rng = StdRng::seed_from_u64(7);
    let (scene, rig) = build_scene(&mut rng)?;

    let mut engine = RenderEngine::new(HeadlessBackend::new(WIDTH, HEIGHT), load_config())?;
    engine.set_scene(scene);

    // Optional features degrade gracefully
    let shadow_resolution = engine.config().shadows.resolution;
    if let Err(e) = engine.enable_shadows(shadow_resolution) {
        log::warn!("Running without shadows: {}", e);
    }
    if engine.enable_post_process(WIDTH, HEIGHT).is_ok() {
        for (name, result) in [("SSAO", engine.enable_ssao()), ("bloom", engine.enable_bloom())] {
            if let Err(e) = result {
                log::warn!("Running without {}: {}", name, e);
            }
        }
    }

    let sparks = Mesh::cube(0.05).with_name("spark");
    let spark_material = Material::default().with_unlit(true);
    let marker = OverlayDraw {
        mesh: Arc::new(Mesh::plane(0.2, 0.2, 1.0)),
        material: Arc::new(Material::default().with_unlit(true)),
        transform: Mat4::new_translation(&Vec3::new(0.0, 0.01, 0.0)),
    };

    for frame in 0..FRAME_COUNT {
        let time = frame as f32 / 60.0;
        animate(&mut engine, &rig, time)?;

        match frame {
            60 => engine.set_wireframe(true),
            90 => engine.set_wireframe(false),
            120 => {
                engine.disable_bloom();
                log::info!("Bloom off");
            }
            150 => {
                engine.backend_mut().resize_surface(1600, 900);
                log::info!("Surface resized by the window system");
            }
            180 => {
                if let Err(e) = engine.enable_bloom() {
                    log::warn!("Bloom stays off: {}", e);
                }
            }
            _ => {}
        }

        engine.render()?;

        let spark_models: Vec<Mat4> = (0..64)
            .map(|i| {
                let angle = i as f32 * 0.1 + time;
                Mat4::new_translation(&Vec3::new(angle.cos() * 5.0, 1.0 + (angle * 3.0).sin(), angle.sin() * 5.0))
            })
            .collect();
        engine.draw_instanced(&sparks, &spark_material, &spark_models)?;
        engine.queue_overlay(marker.clone())?;

        let stats = engine.present()?;
        if frame % 60 == 0 {
            log::info!(
                "frame {}: {} draws ({} instanced, {} instances), {} culled, {} shadow casters, {} post passes",
                stats.frame_index,
                stats.draw_calls,
                stats.instanced_draws,
                stats.instances_drawn,
                stats.culled_nodes,
                stats.shadow_casters,
                stats.post_process_passes
            );
        }
    }

    let backend = engine.destroy();
    log::info!(
        "Done: {} presents, {} bytes uploaded, {} live handles",
        backend.counters().presents,
        backend.counters().bytes_uploaded,
        backend.live_handle_count()
    );
    Ok(())
}
