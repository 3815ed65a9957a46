//! Render engine
//!
//! Owns every pass and GPU resource and sequences one frame:
//!
//! ```text
//! render()   shadow pass ─► culled main pass (single + automatic instanced draws)
//!            ... caller: draw_instanced(), queue_overlay() ...
//! present()  SSAO ─► bloom ─► composite ─► overlays ─► swap
//! ```
//!
//! The backend is owned by the engine and passed down explicitly to each
//! pass; nothing in the pipeline reaches for a global device.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::RendererConfig;
use crate::foundation::math::Mat4;
use crate::render::api::{
    ClearFlags, FrameStats, FramebufferHandle, GpuBackend, PolygonMode, PrimitiveTopology, Viewport,
};
use crate::render::primitives::{Mesh, MeshId};
use crate::render::resources::materials::{Material, MaterialId};
use crate::render::resources::{GpuMesh, MeshCache};
use crate::render::systems::forward::{ForwardPass, FrameUniforms, ShadowUniforms};
use crate::render::systems::instancing::InstanceRenderer;
use crate::render::systems::lighting::PackedLights;
use crate::render::systems::postprocess::PostProcessStack;
use crate::render::systems::shadow::ShadowPass;
use crate::render::{RenderError, RenderResult};
use crate::scene::{world_bounds, Scene};

/// A draw composited on top of the final image
///
/// Queued between `render()` and `present()` and flushed to the display
/// target after tone mapping.
#[derive(Debug, Clone)]
pub struct OverlayDraw {
    /// Geometry to draw
    pub mesh: Arc<Mesh>,
    /// Material to draw it with
    pub material: Arc<Material>,
    /// Model matrix
    pub transform: Mat4,
}

/// State carried from `render()` to `present()`
#[derive(Debug)]
struct FrameContext {
    stats: FrameStats,
    uniforms: FrameUniforms,
    projection: Mat4,
    target: Option<FramebufferHandle>,
    viewport: Viewport,
}

/// Upload `mesh` unless its upload already failed this frame
///
/// A failure is logged and remembered so the rest of the frame leaves the
/// mesh out instead of aborting.
fn upload_or_skip<'c>(
    backend: &mut dyn GpuBackend,
    cache: &'c mut MeshCache,
    skipped: &mut HashSet<MeshId>,
    mesh: &Mesh,
) -> Option<&'c GpuMesh> {
    if skipped.contains(&mesh.id()) {
        return None;
    }
    match cache.ensure_uploaded(backend, mesh) {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            log::warn!("Skipping mesh {:?} ({}) this frame: {}", mesh.id(), mesh.name().unwrap_or("unnamed"), e);
            skipped.insert(mesh.id());
            None
        }
    }
}

/// Visible nodes sharing one mesh and one material
struct DrawGroup<'a> {
    mesh: &'a Arc<Mesh>,
    material: &'a Arc<Material>,
    models: Vec<Mat4>,
}

/// Multi-pass renderer over a [`GpuBackend`]
#[derive(Debug)]
pub struct RenderEngine<B: GpuBackend> {
    backend: B,
    config: RendererConfig,
    scene: Option<Scene>,
    default_material: Arc<Material>,
    mesh_cache: MeshCache,
    forward: ForwardPass,
    instances: InstanceRenderer,
    shadows: Option<ShadowPass>,
    post: Option<PostProcessStack>,
    overlays: Vec<OverlayDraw>,
    frame: Option<FrameContext>,
    frame_index: u64,
    last_stats: Option<FrameStats>,
    surface: (u32, u32),
}

impl<B: GpuBackend> RenderEngine<B> {
    /// Create an engine drawing through `backend`
    ///
    /// Compiles the forward programs; optional features start disabled.
    pub fn new(mut backend: B, config: RendererConfig) -> RenderResult<Self> {
        let forward = ForwardPass::new(&mut backend)?;
        let surface = backend.surface_size();
        log::info!(
            "Render engine initialised on '{}' backend at {}x{}",
            backend.name(),
            surface.0,
            surface.1
        );

        Ok(Self {
            backend,
            config,
            scene: None,
            default_material: Arc::new(Material::default().with_name("default")),
            mesh_cache: MeshCache::new(),
            forward,
            instances: InstanceRenderer::new(),
            shadows: None,
            post: None,
            overlays: Vec::new(),
            frame: None,
            frame_index: 0,
            last_stats: None,
            surface,
        })
    }

    // ---- Accessors ---------------------------------------------------------

    /// Replace the scene; returns the previous one
    pub fn set_scene(&mut self, scene: Scene) -> Option<Scene> {
        self.scene.replace(scene)
    }

    /// Remove the scene
    pub fn take_scene(&mut self) -> Option<Scene> {
        self.scene.take()
    }

    /// Current scene
    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    /// Current scene, mutable
    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    /// Active configuration
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutable
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// GPU mesh cache
    pub fn mesh_cache(&self) -> &MeshCache {
        &self.mesh_cache
    }

    /// Display size the engine renders at
    pub fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    /// Whether `render()` has been called without a matching `present()`
    pub fn is_frame_in_progress(&self) -> bool {
        self.frame.is_some()
    }

    /// Statistics of the last presented frame
    pub fn last_frame_stats(&self) -> Option<&FrameStats> {
        self.last_stats.as_ref()
    }

    /// Enable or disable frustum culling
    pub fn set_culling(&mut self, enabled: bool) {
        self.config.culling_enabled = enabled;
    }

    /// Switch the main pass between filled and wireframe rendering
    pub fn set_wireframe(&mut self, enabled: bool) {
        self.config.wireframe = enabled;
        log::debug!("Wireframe {}", if enabled { "on" } else { "off" });
    }

    fn polygon_mode(&self) -> PolygonMode {
        if self.config.wireframe {
            PolygonMode::Wireframe
        } else {
            PolygonMode::Fill
        }
    }

    // ---- Frame -------------------------------------------------------------

    /// Run the shadow pass and the culled main pass
    ///
    /// Fails without drawing anything when there is no scene or no camera,
    /// or when the previous frame was never presented.
    pub fn render(&mut self) -> RenderResult<FrameStats> {
        if self.frame.is_some() {
            return Err(RenderError::FrameInProgress);
        }
        let polygon_mode = self.polygon_mode();

        let Self {
            backend,
            config,
            scene,
            default_material,
            mesh_cache,
            forward,
            instances,
            shadows,
            post,
            frame_index,
            surface,
            ..
        } = self;
        let backend: &mut dyn GpuBackend = backend;
        let default_material: &Arc<Material> = default_material;

        let scene = scene.as_ref().ok_or(RenderError::NoScene)?;
        let camera = scene.camera().ok_or(RenderError::NoCamera)?;
        let graph = scene.graph();
        let mut stats = FrameStats::new(*frame_index);

        // Resolve every visible mesh node once; both passes read this list
        let mut items = Vec::new();
        for id in graph.visible_nodes() {
            let Some(node) = graph.node(id) else { continue };
            let Some(mesh) = node.mesh() else { continue };
            if mesh.vertices().is_empty() {
                log::trace!("Skipping node '{}' with an empty mesh", node.name());
                continue;
            }
            let Some(model) = graph.world_matrix(id) else { continue };
            let material = node.material().unwrap_or(default_material);
            items.push((mesh, material, model));
        }

        let (target, viewport) = match post.as_ref() {
            Some(post) => {
                let hdr = post.hdr_target();
                (Some(hdr.handle), hdr.viewport())
            }
            None => (None, Viewport::new(surface.0, surface.1)),
        };

        // Meshes whose upload failed this frame; both passes leave them out
        let mut skipped: HashSet<MeshId> = HashSet::new();

        // Shadow pass
        let mut shadow_uniforms = None;
        if let Some(shadows) = shadows.as_ref() {
            let light_space = scene
                .directional_light()
                .and_then(|light| shadows.light_space(light.direction, camera.position()));
            match (light_space, shadows.depth_texture()) {
                (Some(light_space), Some(depth_map)) => {
                    shadows.begin(backend);
                    for (mesh, _, model) in items.iter().filter(|(m, _, _)| m.topology() == PrimitiveTopology::Triangles) {
                        let Some(gpu) = upload_or_skip(backend, mesh_cache, &mut skipped, mesh) else { continue };
                        if shadows.draw(backend, gpu, &light_space, model)?.is_some() {
                            stats.shadow_casters += 1;
                        }
                    }
                    shadows.end(backend, target, viewport, polygon_mode);
                    shadow_uniforms = Some(ShadowUniforms {
                        light_space,
                        depth_map,
                        bias: shadows.settings().depth_bias,
                    });
                }
                _ => log::debug!("No usable directional light, shadow pass skipped"),
            }
        }
        stats.shadows_active = shadow_uniforms.is_some();

        // Main pass
        backend.bind_framebuffer(target, viewport);
        backend.set_polygon_mode(polygon_mode);
        backend.set_depth_test(true);
        backend.clear(ClearFlags::COLOR | ClearFlags::DEPTH, config.clear_color, 1.0);

        let view_projection = camera.view_projection_matrix();
        let uniforms = FrameUniforms {
            view_projection,
            camera_position: camera.position(),
            ambient: scene.ambient(),
            lights: PackedLights::pack(scene.lights()),
            shadow: shadow_uniforms,
        };
        forward.begin_frame();

        let frustum = camera.frustum();
        let mut groups: Vec<DrawGroup> = Vec::new();
        let mut group_index: HashMap<(MeshId, MaterialId), usize> = HashMap::new();
        for (mesh, material, model) in items {
            if config.culling_enabled {
                let inside = world_bounds(mesh, &model).map_or(true, |bounds| frustum.intersects_aabb(&bounds));
                if !inside {
                    stats.culled_nodes += 1;
                    continue;
                }
            }
            let key = (mesh.id(), material.id());
            let index = *group_index.entry(key).or_insert_with(|| {
                groups.push(DrawGroup { mesh, material, models: Vec::new() });
                groups.len() - 1
            });
            groups[index].models.push(model);
        }

        let threshold = config.instancing_threshold;
        for group in &groups {
            if upload_or_skip(backend, mesh_cache, &mut skipped, group.mesh).is_none() {
                continue;
            }
            if threshold > 0 && group.models.len() >= threshold {
                let call = instances.draw(
                    backend,
                    mesh_cache,
                    forward,
                    &uniforms,
                    group.mesh,
                    group.material,
                    &group.models,
                )?;
                if let Some(call) = call {
                    stats.draw_calls += 1;
                    stats.instanced_draws += 1;
                    stats.instances_drawn += call.instance_count;
                    stats.primitives += call.primitive_count();
                }
            } else {
                let Some(gpu) = mesh_cache.get(group.mesh.id()) else { continue };
                for model in &group.models {
                    let call = forward.draw_single(backend, &uniforms, gpu, group.material, model)?;
                    stats.draw_calls += 1;
                    stats.primitives += call.primitive_count();
                }
            }
        }

        stats.skipped_meshes = skipped.len() as u32;

        log::trace!(
            "Frame {}: {} draws ({} instanced), {} culled, {} shadow casters",
            stats.frame_index,
            stats.draw_calls,
            stats.instanced_draws,
            stats.culled_nodes,
            stats.shadow_casters
        );

        self.frame = Some(FrameContext {
            stats,
            uniforms,
            projection: camera.projection_matrix(),
            target,
            viewport,
        });
        Ok(stats)
    }

    /// Draw `mesh` once per model matrix with a single instanced call
    ///
    /// Lands in the same target as the main pass, so it has to be called
    /// between `render()` and `present()`. Returns the number of instances
    /// drawn.
    pub fn draw_instanced(&mut self, mesh: &Mesh, material: &Material, models: &[Mat4]) -> RenderResult<u32> {
        let frame = self.frame.as_mut().ok_or(RenderError::NoFrameInProgress("draw_instanced"))?;
        let backend: &mut dyn GpuBackend = &mut self.backend;

        backend.bind_framebuffer(frame.target, frame.viewport);
        let call = self.instances.draw(
            backend,
            &mut self.mesh_cache,
            &mut self.forward,
            &frame.uniforms,
            mesh,
            material,
            models,
        )?;

        match call {
            Some(call) => {
                frame.stats.draw_calls += 1;
                frame.stats.instanced_draws += 1;
                frame.stats.instances_drawn += call.instance_count;
                frame.stats.primitives += call.primitive_count();
                Ok(call.instance_count)
            }
            None => Ok(0),
        }
    }

    /// Queue a draw for after the composite
    pub fn queue_overlay(&mut self, overlay: OverlayDraw) -> RenderResult<()> {
        if self.frame.is_none() {
            return Err(RenderError::NoFrameInProgress("queue_overlay"));
        }
        self.overlays.push(overlay);
        Ok(())
    }

    /// Run post-processing, flush overlays and present the display surface
    ///
    /// An outdated surface is not an error: the engine resizes to the
    /// backend's current surface size and the next frame renders normally.
    pub fn present(&mut self) -> RenderResult<FrameStats> {
        let frame = self.frame.take().ok_or(RenderError::NoFrameInProgress("present"))?;
        let mut stats = frame.stats;
        let display = Viewport::new(self.surface.0, self.surface.1);
        let overlays = std::mem::take(&mut self.overlays);

        let backend: &mut dyn GpuBackend = &mut self.backend;
        backend.set_polygon_mode(PolygonMode::Fill);

        if let Some(post) = self.post.as_mut() {
            stats.post_process_passes = post.run(backend, &frame.projection, display, &self.config.tone_mapping)?;
        }

        if !overlays.is_empty() {
            backend.bind_framebuffer(None, display);
            backend.set_depth_test(true);
            backend.clear(ClearFlags::DEPTH, [0.0; 4], 1.0);
            // Post-processing replaced the bound program
            self.forward.begin_frame();
            let mut skipped = HashSet::new();
            for overlay in &overlays {
                let Some(gpu) = upload_or_skip(backend, &mut self.mesh_cache, &mut skipped, &overlay.mesh) else {
                    continue;
                };
                let call = self
                    .forward
                    .draw_single(backend, &frame.uniforms, gpu, &overlay.material, &overlay.transform)?;
                stats.overlay_draws += 1;
                stats.primitives += call.primitive_count();
            }
            stats.skipped_meshes += skipped.len() as u32;
        }

        let presented = backend.present();
        self.frame_index += 1;
        self.last_stats = Some(stats);

        match presented {
            Ok(()) => Ok(stats),
            Err(e) if e.is_transient() => {
                let (width, height) = self.backend.surface_size();
                log::warn!("{}; resizing to {}x{}", e, width, height);
                self.resize(width, height)?;
                Ok(stats)
            }
            Err(e) => Err(e),
        }
    }

    /// Recreate resolution-dependent targets and update the camera aspect
    ///
    /// The shadow map keeps its resolution. A zero-sized surface (minimised
    /// window) is ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if self.frame.is_some() {
            return Err(RenderError::FrameInProgress);
        }
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {}x{}", width, height);
            return Ok(());
        }

        self.surface = (width, height);
        if let Some(camera) = self.scene.as_mut().and_then(Scene::camera_mut) {
            camera.set_aspect_ratio(width as f32 / height as f32);
        }

        let resized = match self.post.as_mut() {
            Some(post) => post.resize(&mut self.backend, width, height),
            None => Ok(()),
        };
        if let Err(e) = resized {
            log::warn!("Post-processing disabled after failed resize: {}", e);
            self.disable_post_process();
            return Err(e);
        }

        log::info!("Resized to {}x{}", width, height);
        Ok(())
    }

    // ---- Features ----------------------------------------------------------

    /// Allocate a `resolution`² shadow map and shade with it
    ///
    /// On failure shadows stay disabled and the error is returned.
    pub fn enable_shadows(&mut self, resolution: u32) -> RenderResult<()> {
        if self.frame.is_some() {
            return Err(RenderError::FrameInProgress);
        }
        self.disable_shadows();
        match ShadowPass::new(&mut self.backend, resolution, self.config.shadows.clone()) {
            Ok(pass) => {
                self.shadows = Some(pass);
                Ok(())
            }
            Err(e) => {
                log::warn!("Shadows stay disabled: {}", e);
                Err(e)
            }
        }
    }

    /// Release the shadow map; returns whether shadows were enabled
    pub fn disable_shadows(&mut self) -> bool {
        match self.shadows.take() {
            Some(pass) => {
                pass.destroy(&mut self.backend);
                true
            }
            None => false,
        }
    }

    /// Whether the shadow pass runs
    pub fn shadows_enabled(&self) -> bool {
        self.shadows.is_some()
    }

    /// Render the main pass into an HDR target and tone-map it at present
    pub fn enable_post_process(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if self.frame.is_some() {
            return Err(RenderError::FrameInProgress);
        }
        self.disable_post_process();
        match PostProcessStack::new(&mut self.backend, width, height) {
            Ok(stack) => {
                self.post = Some(stack);
                Ok(())
            }
            Err(e) => {
                log::warn!("Post-processing stays disabled: {}", e);
                Err(e)
            }
        }
    }

    /// Release the HDR target and every effect; returns whether it was enabled
    pub fn disable_post_process(&mut self) -> bool {
        match self.post.take() {
            Some(stack) => {
                stack.destroy(&mut self.backend);
                true
            }
            None => false,
        }
    }

    /// Whether the main pass renders into the HDR target
    pub fn post_process_enabled(&self) -> bool {
        self.post.is_some()
    }

    /// Add bloom to the post-process chain
    ///
    /// Requires post-processing to be enabled.
    pub fn enable_bloom(&mut self) -> RenderResult<()> {
        if self.frame.is_some() {
            return Err(RenderError::FrameInProgress);
        }
        let post = self.post.as_mut().ok_or(RenderError::MissingPrerequisite {
            feature: "bloom",
            requires: "post-processing",
        })?;
        post.enable_bloom(&mut self.backend, self.config.bloom.clone()).map_err(|e| {
            log::warn!("Bloom stays disabled: {}", e);
            e
        })
    }

    /// Remove bloom; returns whether it was enabled
    pub fn disable_bloom(&mut self) -> bool {
        match self.post.as_mut() {
            Some(post) => post.disable_bloom(&mut self.backend),
            None => false,
        }
    }

    /// Whether bloom runs at present
    pub fn bloom_enabled(&self) -> bool {
        self.post.as_ref().is_some_and(PostProcessStack::bloom_enabled)
    }

    /// Add ambient occlusion to the post-process chain
    ///
    /// Requires post-processing to be enabled.
    pub fn enable_ssao(&mut self) -> RenderResult<()> {
        if self.frame.is_some() {
            return Err(RenderError::FrameInProgress);
        }
        let post = self.post.as_mut().ok_or(RenderError::MissingPrerequisite {
            feature: "SSAO",
            requires: "post-processing",
        })?;
        post.enable_ssao(&mut self.backend, self.config.ssao.clone()).map_err(|e| {
            log::warn!("SSAO stays disabled: {}", e);
            e
        })
    }

    /// Remove ambient occlusion; returns whether it was enabled
    pub fn disable_ssao(&mut self) -> bool {
        match self.post.as_mut() {
            Some(post) => post.disable_ssao(&mut self.backend),
            None => false,
        }
    }

    /// Whether ambient occlusion runs at present
    pub fn ssao_enabled(&self) -> bool {
        self.post.as_ref().is_some_and(PostProcessStack::ssao_enabled)
    }

    // ---- Resources ---------------------------------------------------------

    /// Free the GPU buffers of one mesh; returns whether it was resident
    ///
    /// The mesh is uploaded again the next time it is drawn.
    pub fn release_mesh(&mut self, mesh: MeshId) -> bool {
        self.mesh_cache.release_mesh(&mut self.backend, mesh)
    }

    /// Release every GPU resource the engine owns and hand back the backend
    pub fn destroy(mut self) -> B {
        if self.frame.take().is_some() {
            log::warn!("Destroying the render engine in the middle of a frame");
        }
        self.overlays.clear();
        self.disable_post_process();
        self.disable_shadows();
        self.mesh_cache.release_all(&mut self.backend);
        self.forward.destroy(&mut self.backend);
        log::info!("Render engine destroyed after {} frames", self.frame_index);
        self.backend
    }
}
