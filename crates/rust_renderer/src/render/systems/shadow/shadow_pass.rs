//! Shadow pass
//!
//! Lifecycle: created by `enable_shadows` (allocates the depth framebuffer
//! and the depth-only program), then every frame `begin` → `draw` per
//! visible triangle mesh → `end`. The shadow camera is rebuilt each frame
//! from the directional light and the main camera position.

use crate::core::ShadowSettings;
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::render::api::{
    ClearFlags, DrawCall, Framebuffer, FramebufferDesc, FramebufferHandle, GpuBackend, PolygonMode,
    PrimitiveTopology, ProgramHandle, TextureFilter, TextureFormat, TextureHandle, TextureWrap, Viewport,
};
use crate::render::resources::{shaders, GpuMesh};
use crate::render::{RenderError, RenderResult};

/// Above this |cos| between light direction and +Y the shadow camera uses +Z as up
const PARALLEL_UP_THRESHOLD: f32 = 0.999;

/// World to light clip space for a directional light
///
/// The shadow camera sits `settings.light_offset` units behind `focus`
/// along the light direction and looks at `focus` through an orthographic
/// box of `settings.half_extent`. Returns `None` for a zero-length direction
/// or an empty light volume.
pub fn light_space_matrix(direction: Vec3, focus: Vec3, settings: &ShadowSettings) -> Option<Mat4> {
    if settings.volume_error().is_some() {
        return None;
    }
    let dir = direction.try_normalize(1e-6)?;

    let up = if dir.dot(&Vec3::y()).abs() > PARALLEL_UP_THRESHOLD {
        Vec3::z()
    } else {
        Vec3::y()
    };
    let eye = focus - dir * settings.light_offset;
    let view = Mat4::look_at_rh(&Point3::from(eye), &Point3::from(focus), &up);

    let h = settings.half_extent;
    let projection = Mat4::new_orthographic(-h, h, -h, h, settings.near, settings.far);
    Some(projection * view)
}

/// Depth-only render pass from the directional light
#[derive(Debug)]
pub struct ShadowPass {
    framebuffer: Framebuffer,
    program: ProgramHandle,
    settings: ShadowSettings,
}

impl ShadowPass {
    /// Allocate the shadow map at `resolution`² and compile the depth program
    ///
    /// Nothing stays allocated when either step fails, and nothing is
    /// allocated for an unusable light volume.
    pub fn new(backend: &mut dyn GpuBackend, resolution: u32, settings: ShadowSettings) -> RenderResult<Self> {
        if let Some(reason) = settings.volume_error() {
            return Err(RenderError::InvalidSettings { section: "shadow", reason });
        }
        let framebuffer = backend.create_framebuffer(&FramebufferDesc {
            label: "shadow_map".to_string(),
            width: resolution,
            height: resolution,
            color: None,
            depth: Some(TextureFormat::Depth24),
            filter: TextureFilter::Comparison,
            wrap: TextureWrap::ClampToBorderWhite,
        })?;

        let program = match backend.create_program(&shaders::shadow_depth()) {
            Ok(program) => program,
            Err(e) => {
                backend.destroy_framebuffer(framebuffer.handle);
                return Err(e);
            }
        };

        log::info!("Shadow map allocated at {}x{}", resolution, resolution);
        Ok(Self {
            framebuffer,
            program,
            settings: ShadowSettings { resolution, ..settings },
        })
    }

    /// Shadow map resolution in texels
    pub fn resolution(&self) -> u32 {
        self.framebuffer.width
    }

    /// Depth texture sampled by the main pass
    pub fn depth_texture(&self) -> Option<TextureHandle> {
        self.framebuffer.depth
    }

    /// Parameters of the light volume
    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    /// Light-space matrix for this frame, `None` when the light is degenerate
    pub fn light_space(&self, direction: Vec3, focus: Vec3) -> Option<Mat4> {
        light_space_matrix(direction, focus, &self.settings)
    }

    /// Bind the shadow map, clear depth and select the depth program
    pub fn begin(&self, backend: &mut dyn GpuBackend) {
        backend.bind_framebuffer(Some(self.framebuffer.handle), self.framebuffer.viewport());
        backend.set_polygon_mode(PolygonMode::Fill);
        backend.set_depth_test(true);
        backend.clear(ClearFlags::DEPTH, [0.0; 4], 1.0);
        backend.bind_program(self.program);
    }

    /// Render one mesh into the shadow map
    ///
    /// Only triangle meshes cast shadows; others return `Ok(None)`.
    pub fn draw(
        &self,
        backend: &mut dyn GpuBackend,
        gpu: &GpuMesh,
        light_space: &Mat4,
        model: &Mat4,
    ) -> RenderResult<Option<DrawCall>> {
        if gpu.topology != PrimitiveTopology::Triangles {
            return Ok(None);
        }
        let light_mvp = light_space * model;
        backend.set_uniform("u_light_mvp", (&light_mvp).into());
        gpu.bind(backend);
        backend.bind_instance_buffer(None);
        let call = gpu.draw_call(1);
        backend.draw(&call)?;
        Ok(Some(call))
    }

    /// Restore the main render target, its viewport and the display polygon mode
    pub fn end(
        &self,
        backend: &mut dyn GpuBackend,
        target: Option<FramebufferHandle>,
        viewport: Viewport,
        polygon_mode: PolygonMode,
    ) {
        backend.bind_framebuffer(target, viewport);
        backend.set_polygon_mode(polygon_mode);
    }

    /// Free the shadow map and program
    pub fn destroy(self, backend: &mut dyn GpuBackend) {
        backend.destroy_program(self.program);
        backend.destroy_framebuffer(self.framebuffer.handle);
        log::info!("Shadow map released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::utils;
    use crate::render::backends::HeadlessBackend;
    use crate::render::primitives::Mesh;
    use crate::render::resources::MeshCache;
    use approx::assert_relative_eq;

    #[test]
    fn test_focus_projects_to_center_of_shadow_map() {
        let settings = ShadowSettings::default();
        let focus = Vec3::new(3.0, 0.0, -2.0);
        let m = light_space_matrix(Vec3::new(-0.3, -1.0, -0.5), focus, &settings).unwrap();

        let clip = utils::transform_point(&m, &focus);
        assert_relative_eq!(clip.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(clip.y, 0.0, epsilon = 1e-4);
        assert!(clip.z > -1.0 && clip.z < 1.0);
    }

    #[test]
    fn test_straight_down_light_is_finite() {
        let m = light_space_matrix(Vec3::new(0.0, -1.0, 0.0), Vec3::zeros(), &ShadowSettings::default()).unwrap();
        assert!(m.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_degenerate_direction_has_no_matrix() {
        assert!(light_space_matrix(Vec3::zeros(), Vec3::zeros(), &ShadowSettings::default()).is_none());
        assert!(light_space_matrix(Vec3::new(1e-9, 0.0, 0.0), Vec3::zeros(), &ShadowSettings::default()).is_none());
    }

    #[test]
    fn test_empty_light_volume_has_no_matrix() {
        let dir = Vec3::new(-0.3, -1.0, -0.5);
        let flat = ShadowSettings { half_extent: 0.0, ..ShadowSettings::default() };
        assert!(light_space_matrix(dir, Vec3::zeros(), &flat).is_none());
        let thin = ShadowSettings { near: 10.0, far: 10.0, ..ShadowSettings::default() };
        assert!(light_space_matrix(dir, Vec3::zeros(), &thin).is_none());
        let nan = ShadowSettings { light_offset: f32::NAN, ..ShadowSettings::default() };
        assert!(light_space_matrix(dir, Vec3::zeros(), &nan).is_none());
    }

    #[test]
    fn test_invalid_settings_allocate_nothing() {
        let mut backend = HeadlessBackend::new(64, 64);
        let settings = ShadowSettings { near: 50.0, far: 1.0, ..ShadowSettings::default() };
        let result = ShadowPass::new(&mut backend, 256, settings);
        assert!(matches!(result, Err(RenderError::InvalidSettings { section: "shadow", .. })));
        assert_eq!(backend.live_handle_count(), 0);
    }

    #[test]
    fn test_only_triangle_meshes_cast_shadows() {
        let mut backend = HeadlessBackend::new(64, 64);
        let pass = ShadowPass::new(&mut backend, 256, ShadowSettings::default()).unwrap();
        let mut cache = MeshCache::new();

        let cube = Mesh::cube(1.0);
        let lines = Mesh::with_topology(cube.vertices().to_vec(), None, PrimitiveTopology::Lines);
        let cube_gpu = cache.ensure_uploaded(&mut backend, &cube).unwrap().clone();
        let lines_gpu = cache.ensure_uploaded(&mut backend, &lines).unwrap().clone();

        pass.begin(&mut backend);
        let identity = Mat4::identity();
        assert!(pass.draw(&mut backend, &cube_gpu, &identity, &identity).unwrap().is_some());
        assert!(pass.draw(&mut backend, &lines_gpu, &identity, &identity).unwrap().is_none());
        pass.end(&mut backend, None, Viewport::new(64, 64), PolygonMode::Wireframe);

        assert_eq!(backend.draws().len(), 1);
        assert_eq!(backend.draws()[0].program_label, "shadow_depth");
        assert_eq!(backend.polygon_mode(), PolygonMode::Wireframe);
        assert_eq!(backend.bound_target(), (None, Viewport::new(64, 64)));
    }

    #[test]
    fn test_failed_program_releases_shadow_map() {
        let mut backend = HeadlessBackend::new(64, 64);
        backend.fail_next_program();
        assert!(ShadowPass::new(&mut backend, 256, ShadowSettings::default()).is_err());
        assert_eq!(backend.live_handle_count(), 0);
    }
}
