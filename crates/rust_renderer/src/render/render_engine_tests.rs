//! End-to-end tests for RenderEngine frame sequencing over the headless backend

use std::sync::Arc;

use approx::assert_relative_eq;

use super::*;
use crate::core::{RendererConfig, ShadowSettings};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::render::api::{BufferKind, PolygonMode};
use crate::scene::{NodeId, Scene};

fn engine() -> RenderEngine<HeadlessBackend> {
    RenderEngine::new(HeadlessBackend::new(800, 600), RendererConfig::default()).unwrap()
}

fn camera() -> Camera {
    Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, 800.0 / 600.0, 0.1, 100.0)
}

/// One sun, one unit cube at `position`, camera at (0, 0, 5) looking at the origin
fn cube_scene(position: Vec3) -> (Scene, NodeId) {
    let mut scene = Scene::new();
    scene.add_light(Light::directional(Vec3::new(-0.3, -1.0, -0.4), Vec3::repeat(1.0), 1.0));
    scene.set_camera(camera());

    let graph = scene.graph_mut();
    let node = graph.create_node("cube");
    graph.set_mesh(node, Some(Arc::new(Mesh::cube(1.0)))).unwrap();
    graph.set_local_transform(node, Transform::from_position(position)).unwrap();
    (scene, node)
}

#[test]
fn test_cube_in_view_is_drawn_once() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);

    let stats = engine.render().unwrap();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.culled_nodes, 0);
    assert_eq!(stats.primitives, 12);
    engine.present().unwrap();

    assert_eq!(engine.backend().counters().presents, 1);
}

#[test]
fn test_cube_far_outside_is_culled() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::new(1000.0, 0.0, 0.0));
    engine.set_scene(scene);

    let stats = engine.render().unwrap();
    assert_eq!(stats.draw_calls, 0);
    assert_eq!(stats.culled_nodes, 1);
    assert!(engine.backend().draws().is_empty());
}

#[test]
fn test_culling_disabled_draws_everything() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::new(1000.0, 0.0, 0.0));
    engine.set_scene(scene);
    engine.set_culling(false);

    let stats = engine.render().unwrap();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.culled_nodes, 0);
}

#[test]
fn test_scaled_and_rotated_bounds_decide_culling_at_the_edge() {
    let mut engine = engine();
    let (scene, bar) = cube_scene(Vec3::new(7.0, 0.0, 0.0));
    engine.set_scene(scene);

    // Unit-scale cube at x = 7 lies past the right edge of the view
    assert_eq!(engine.render().unwrap().culled_nodes, 1);
    engine.present().unwrap();

    // Stretched along X it reaches back to x = 3, inside the view
    let stretched = Transform::new(Vec3::new(7.0, 0.0, 0.0), Quat::identity(), Vec3::new(4.0, 0.1, 0.1));
    engine.scene_mut().unwrap().graph_mut().set_local_transform(bar, stretched).unwrap();
    let stats = engine.render().unwrap();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.culled_nodes, 0);
    engine.present().unwrap();

    // Turned upright the same bar only spans x = 6.9..7.1
    let upright = Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2);
    let turned = Transform::new(Vec3::new(7.0, 0.0, 0.0), upright, Vec3::new(4.0, 0.1, 0.1));
    engine.scene_mut().unwrap().graph_mut().set_local_transform(bar, turned).unwrap();
    let stats = engine.render().unwrap();
    assert_eq!(stats.draw_calls, 0);
    assert_eq!(stats.culled_nodes, 1);
}

/// `cube_scene` plus a second, smaller cube with its own mesh at (1.5, 0, 0)
fn two_mesh_scene() -> Scene {
    let (mut scene, _) = cube_scene(Vec3::new(-1.5, 0.0, 0.0));
    let graph = scene.graph_mut();
    let other = graph.create_node("small cube");
    graph.set_mesh(other, Some(Arc::new(Mesh::cube(0.5)))).unwrap();
    graph.set_local_transform(other, Transform::from_position(Vec3::new(1.5, 0.0, 0.0))).unwrap();
    scene
}

#[test]
fn test_failed_mesh_upload_skips_only_that_mesh() {
    let mut engine = engine();
    engine.set_scene(two_mesh_scene());

    engine.backend_mut().fail_next_buffer();
    let stats = engine.render().unwrap();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.skipped_meshes, 1);
    assert_eq!(engine.mesh_cache().len(), 1);
    engine.present().unwrap();

    // The skipped mesh is retried on the next frame
    let stats = engine.render().unwrap();
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.skipped_meshes, 0);
}

#[test]
fn test_mesh_failing_in_shadow_pass_is_left_out_of_main_pass() {
    let mut engine = engine();
    engine.set_scene(two_mesh_scene());
    engine.enable_shadows(512).unwrap();

    engine.backend_mut().fail_next_buffer();
    let stats = engine.render().unwrap();
    assert!(stats.shadows_active);
    assert_eq!(stats.shadow_casters, 1);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.skipped_meshes, 1);
    let labels: Vec<_> = engine.backend().draws().iter().map(|d| d.program_label).collect();
    assert_eq!(labels, vec!["shadow_depth", "forward_phong"]);
}

#[test]
fn test_render_requires_scene_and_camera() {
    let mut engine = engine();
    assert_eq!(engine.render(), Err(RenderError::NoScene));

    let (mut scene, _) = cube_scene(Vec3::zeros());
    scene.clear_camera();
    engine.set_scene(scene);
    assert_eq!(engine.render(), Err(RenderError::NoCamera));

    assert!(engine.backend().draws().is_empty());
    assert!(!engine.is_frame_in_progress());
}

#[test]
fn test_frame_calls_must_be_ordered() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);

    assert_eq!(engine.present(), Err(RenderError::NoFrameInProgress("present")));
    let models = [Mat4::identity()];
    let result = engine.draw_instanced(&Mesh::cube(1.0), &Material::default(), &models);
    assert_eq!(result, Err(RenderError::NoFrameInProgress("draw_instanced")));

    engine.render().unwrap();
    assert_eq!(engine.render(), Err(RenderError::FrameInProgress));
    assert_eq!(engine.enable_shadows(512), Err(RenderError::FrameInProgress));
    engine.present().unwrap();
    engine.render().unwrap();
}

#[test]
fn test_world_matrix_follows_parent_into_frustum() {
    let mut engine = engine();
    let (mut scene, cube) = cube_scene(Vec3::zeros());
    let graph = scene.graph_mut();
    let pivot = graph.create_node("pivot");
    graph.attach(cube, pivot).unwrap();
    graph.set_local_transform(pivot, Transform::from_position(Vec3::new(1000.0, 0.0, 0.0))).unwrap();
    engine.set_scene(scene);

    assert_eq!(engine.render().unwrap().culled_nodes, 1);
    engine.present().unwrap();

    let graph = engine.scene_mut().unwrap().graph_mut();
    graph.set_local_transform(pivot, Transform::identity()).unwrap();
    assert_eq!(engine.render().unwrap().draw_calls, 1);
}

#[test]
fn test_bloom_requires_post_processing() {
    let mut engine = engine();
    assert_eq!(
        engine.enable_bloom(),
        Err(RenderError::MissingPrerequisite { feature: "bloom", requires: "post-processing" })
    );
    assert!(matches!(engine.enable_ssao(), Err(RenderError::MissingPrerequisite { .. })));
}

#[test]
fn test_bloom_toggle_does_not_leak() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);
    engine.enable_post_process(800, 600).unwrap();
    let baseline = engine.backend().live_handle_count();

    engine.enable_bloom().unwrap();
    engine.render().unwrap();
    engine.present().unwrap();
    assert!(engine.disable_bloom());

    engine.enable_bloom().unwrap();
    engine.render().unwrap();
    engine.present().unwrap();
    assert!(engine.disable_bloom());

    // Cube buffers were uploaded during the frames
    let cube_buffers = 2;
    assert_eq!(engine.backend().live_handle_count(), baseline + cube_buffers);
}

#[test]
fn test_post_process_chain_runs_at_present() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);
    engine.enable_post_process(800, 600).unwrap();
    engine.enable_ssao().unwrap();
    engine.enable_bloom().unwrap();

    engine.render().unwrap();
    let hdr_draws = engine.backend_mut().take_draws();
    assert_eq!(hdr_draws.len(), 1);
    assert!(hdr_draws[0].framebuffer.is_some());

    let stats = engine.present().unwrap();
    let blur_passes = engine.config().bloom.blur_passes;
    assert_eq!(stats.post_process_passes, 2 + 1 + 2 * blur_passes + 1);
    let last = engine.backend().draws().last().unwrap();
    assert_eq!(last.program_label, "composite");
    assert_eq!(last.framebuffer, None);
}

#[test]
fn test_shadows_cast_from_directional_light() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);
    engine.enable_shadows(1024).unwrap();

    let stats = engine.render().unwrap();
    assert!(stats.shadows_active);
    assert_eq!(stats.shadow_casters, 1);
    let labels: Vec<_> = engine.backend().draws().iter().map(|d| d.program_label).collect();
    assert_eq!(labels, vec!["shadow_depth", "forward_phong"]);
}

#[test]
fn test_degenerate_light_skips_shadow_pass() {
    let mut engine = engine();
    let (mut scene, _) = cube_scene(Vec3::zeros());
    scene.clear_lights();
    scene.add_light(Light::directional(Vec3::zeros(), Vec3::repeat(1.0), 1.0));
    engine.set_scene(scene);
    engine.enable_shadows(1024).unwrap();

    let stats = engine.render().unwrap();
    assert!(!stats.shadows_active);
    assert_eq!(stats.shadow_casters, 0);
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn test_failed_shadow_map_keeps_rendering() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);

    engine.backend_mut().fail_next_framebuffer();
    assert!(matches!(engine.enable_shadows(1024), Err(RenderError::FramebufferIncomplete(_))));
    assert!(!engine.shadows_enabled());

    let stats = engine.render().unwrap();
    assert!(!stats.shadows_active);
    assert_eq!(stats.draw_calls, 1);
    engine.present().unwrap();
}

#[test]
fn test_unusable_shadow_volume_leaves_shadows_off() {
    for shadows in [
        ShadowSettings { half_extent: 0.0, ..ShadowSettings::default() },
        ShadowSettings { near: 10.0, far: 10.0, ..ShadowSettings::default() },
        ShadowSettings { light_offset: f32::INFINITY, ..ShadowSettings::default() },
    ] {
        let mut engine =
            RenderEngine::new(HeadlessBackend::new(800, 600), RendererConfig::default().with_shadows(shadows)).unwrap();
        let (scene, _) = cube_scene(Vec3::zeros());
        engine.set_scene(scene);
        let handles = engine.backend().live_handle_count();

        assert!(matches!(
            engine.enable_shadows(512),
            Err(RenderError::InvalidSettings { section: "shadow", .. })
        ));
        assert!(!engine.shadows_enabled());
        assert_eq!(engine.backend().live_handle_count(), handles);

        let stats = engine.render().unwrap();
        assert!(!stats.shadows_active);
        assert_eq!(stats.draw_calls, 1);
        engine.present().unwrap();
    }
}

#[test]
fn test_wireframe_survives_shadow_pass() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);
    engine.enable_shadows(512).unwrap();
    engine.set_wireframe(true);

    engine.render().unwrap();
    let draws = engine.backend().draws();
    assert_eq!(draws[0].polygon_mode, PolygonMode::Fill);
    assert_eq!(draws[1].polygon_mode, PolygonMode::Wireframe);
}

#[test]
fn test_shared_mesh_and_material_are_instanced() {
    let mut engine = RenderEngine::new(
        HeadlessBackend::new(800, 600),
        RendererConfig::default().with_instancing_threshold(4),
    )
    .unwrap();

    let mut scene = Scene::new();
    scene.set_camera(camera());
    let mesh = Arc::new(Mesh::cube(0.1));
    let material = Arc::new(Material::default());
    let graph = scene.graph_mut();
    for i in 0..5 {
        let node = graph.create_node(format!("cube {}", i));
        graph.set_mesh(node, Some(mesh.clone())).unwrap();
        graph.set_material(node, Some(material.clone())).unwrap();
        graph
            .set_local_transform(node, Transform::from_position(Vec3::new(i as f32 * 0.3 - 0.6, 0.0, 0.0)))
            .unwrap();
    }
    let loner = graph.create_node("loner");
    graph.set_mesh(loner, Some(Arc::new(Mesh::cube(0.1)))).unwrap();
    engine.set_scene(scene);

    let stats = engine.render().unwrap();
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.instanced_draws, 1);
    assert_eq!(stats.instances_drawn, 5);
    assert_eq!(engine.backend().buffers_created(BufferKind::Instance), 1);
}

#[test]
fn test_extra_instanced_draws_count_toward_frame() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);

    engine.render().unwrap();
    let particles = Mesh::cube(0.05);
    let models: Vec<Mat4> = (0..20)
        .map(|i| Mat4::new_translation(&Vec3::new(0.0, i as f32 * 0.1, 0.0)))
        .collect();
    assert_eq!(engine.draw_instanced(&particles, &Material::default(), &models), Ok(20));

    let stats = engine.present().unwrap();
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(stats.instances_drawn, 20);
}

#[test]
fn test_overlays_draw_after_composite() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);
    engine.enable_post_process(800, 600).unwrap();

    let overlay = OverlayDraw {
        mesh: Arc::new(Mesh::plane(1.0, 1.0, 1.0)),
        material: Arc::new(Material::default().with_unlit(true)),
        transform: Mat4::identity(),
    };
    assert_eq!(engine.queue_overlay(overlay.clone()), Err(RenderError::NoFrameInProgress("queue_overlay")));

    engine.render().unwrap();
    engine.queue_overlay(overlay).unwrap();
    let stats = engine.present().unwrap();

    assert_eq!(stats.overlay_draws, 1);
    let labels: Vec<_> = engine.backend().draws().iter().map(|d| d.program_label).collect();
    assert_eq!(labels, vec!["forward_phong", "composite", "forward_phong"]);
}

#[test]
fn test_failed_overlay_upload_still_presents() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);

    engine.render().unwrap();
    engine
        .queue_overlay(OverlayDraw {
            mesh: Arc::new(Mesh::plane(1.0, 1.0, 1.0)),
            material: Arc::new(Material::default()),
            transform: Mat4::identity(),
        })
        .unwrap();
    engine.backend_mut().fail_next_buffer();
    let stats = engine.present().unwrap();

    assert_eq!(stats.overlay_draws, 0);
    assert_eq!(stats.skipped_meshes, 1);
    assert_eq!(engine.backend().counters().presents, 1);
    assert!(!engine.is_frame_in_progress());
}

#[test]
fn test_outdated_surface_recovers_by_resizing() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);
    engine.enable_post_process(800, 600).unwrap();

    engine.backend_mut().resize_surface(1024, 512);
    engine.render().unwrap();
    assert!(engine.present().is_ok());

    assert_eq!(engine.surface_size(), (1024, 512));
    let camera = engine.scene().unwrap().camera().unwrap();
    assert_relative_eq!(camera.aspect_ratio(), 2.0);

    engine.render().unwrap();
    engine.present().unwrap();
    assert_eq!(engine.last_frame_stats().map(|s| s.frame_index), Some(1));
}

#[test]
fn test_resize_keeps_shadow_resolution() {
    let mut engine = engine();
    engine.enable_shadows(512).unwrap();
    engine.enable_post_process(800, 600).unwrap();
    let before = engine.backend().live_handle_count();

    engine.resize(1920, 1080).unwrap();
    assert_eq!(engine.backend().live_handle_count(), before);
    assert!(engine.shadows_enabled());
    assert!(engine.resize(0, 0).is_ok());
    assert_eq!(engine.surface_size(), (1920, 1080));
}

#[test]
fn test_release_mesh_reuploads_on_next_draw() {
    let mut engine = engine();
    let (scene, node) = cube_scene(Vec3::zeros());
    let mesh_id = scene.graph().node(node).unwrap().mesh().unwrap().id();
    engine.set_scene(scene);

    engine.render().unwrap();
    engine.present().unwrap();
    assert!(engine.release_mesh(mesh_id));
    assert!(!engine.release_mesh(mesh_id));

    engine.render().unwrap();
    assert_eq!(engine.mesh_cache().upload_count(), 2);
}

#[test]
fn test_destroy_releases_everything() {
    let mut engine = engine();
    let (scene, _) = cube_scene(Vec3::zeros());
    engine.set_scene(scene);
    engine.enable_shadows(512).unwrap();
    engine.enable_post_process(800, 600).unwrap();
    engine.enable_ssao().unwrap();
    engine.enable_bloom().unwrap();
    engine.render().unwrap();
    engine.present().unwrap();

    let backend = engine.destroy();
    assert_eq!(backend.live_handle_count(), 0);
}
