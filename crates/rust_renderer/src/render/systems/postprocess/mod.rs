//! HDR post-processing
//!
//! The main pass renders into an HDR framebuffer owned by
//! [`PostProcessStack`]. At present time three full-screen passes run in
//! order, each consuming the previous one's output:
//!
//! ```text
//! HDR depth ──► SSAO ──► box blur ─────────────┐
//! HDR colour ─► bright pass ─► blur × 2P ──────┤
//! HDR colour ──────────────────────────────────┴─► composite ─► display
//! ```
//!
//! SSAO and bloom are optional; the composite always runs.

pub mod bloom;
pub mod ssao;
pub mod tonemap;

pub use bloom::{gaussian_weights, BloomPass, PingPong};
pub use ssao::{generate_kernel, generate_noise, SsaoPass};
pub use tonemap::CompositePass;

use crate::core::{BloomSettings, SsaoSettings, ToneMapSettings};
use crate::foundation::math::Mat4;
use crate::render::api::{
    DrawCall, Framebuffer, FramebufferDesc, FramebufferHandle, GpuBackend, ProgramHandle,
    ShaderSource, TextureDesc, TextureFilter, TextureFormat, TextureHandle, TextureWrap, Viewport,
};
use crate::render::{RenderError, RenderResult};

/// GPU objects created so far by a multi-step constructor
///
/// On failure the constructor releases everything recorded here, so a
/// failed feature never leaves handles behind.
#[derive(Debug, Default)]
pub(crate) struct Allocations {
    framebuffers: Vec<FramebufferHandle>,
    textures: Vec<TextureHandle>,
    programs: Vec<ProgramHandle>,
}

impl Allocations {
    pub(crate) fn framebuffer(
        &mut self,
        backend: &mut dyn GpuBackend,
        desc: &FramebufferDesc,
    ) -> RenderResult<Framebuffer> {
        let framebuffer = backend.create_framebuffer(desc)?;
        self.framebuffers.push(framebuffer.handle);
        Ok(framebuffer)
    }

    pub(crate) fn texture(
        &mut self,
        backend: &mut dyn GpuBackend,
        desc: &TextureDesc,
        data: Option<&[u8]>,
    ) -> RenderResult<TextureHandle> {
        let texture = backend.create_texture(desc, data)?;
        self.textures.push(texture);
        Ok(texture)
    }

    pub(crate) fn program(&mut self, backend: &mut dyn GpuBackend, source: &ShaderSource) -> RenderResult<ProgramHandle> {
        let program = backend.create_program(source)?;
        self.programs.push(program);
        Ok(program)
    }

    pub(crate) fn release(self, backend: &mut dyn GpuBackend) {
        for program in self.programs {
            backend.destroy_program(program);
        }
        for texture in self.textures {
            backend.destroy_texture(texture);
        }
        for framebuffer in self.framebuffers {
            backend.destroy_framebuffer(framebuffer);
        }
    }
}

/// Single colour-attachment target for a full-screen pass
pub(crate) fn color_target(label: &str, width: u32, height: u32, format: TextureFormat) -> FramebufferDesc {
    FramebufferDesc {
        label: label.to_string(),
        width,
        height,
        color: Some(format),
        depth: None,
        filter: TextureFilter::Linear,
        wrap: TextureWrap::ClampToEdge,
    }
}

/// `width x height` scaled by `scale`, never below one texel
pub fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    let w = ((width as f32 * scale).round() as u32).max(1);
    let h = ((height as f32 * scale).round() as u32).max(1);
    (w, h)
}

/// Colour attachment of `framebuffer`, or an error naming the pass
pub(crate) fn color_of(framebuffer: &Framebuffer, pass: &str) -> RenderResult<TextureHandle> {
    framebuffer
        .color
        .ok_or_else(|| RenderError::FramebufferIncomplete(format!("{} target has no colour attachment", pass)))
}

/// Bind `target` and issue one full-screen triangle with the current program
pub(crate) fn draw_fullscreen(backend: &mut dyn GpuBackend, target: Option<FramebufferHandle>, viewport: Viewport) -> RenderResult<()> {
    backend.bind_framebuffer(target, viewport);
    backend.unbind_vertex_input();
    backend.bind_instance_buffer(None);
    backend.draw(&DrawCall::fullscreen_triangle())
}

/// HDR target plus the optional effects and the composite
#[derive(Debug)]
pub struct PostProcessStack {
    hdr: Framebuffer,
    composite: CompositePass,
    ssao: Option<SsaoPass>,
    bloom: Option<BloomPass>,
}

impl PostProcessStack {
    /// Allocate the HDR framebuffer and compile the composite program
    pub fn new(backend: &mut dyn GpuBackend, width: u32, height: u32) -> RenderResult<Self> {
        let mut allocations = Allocations::default();
        match Self::allocate(backend, &mut allocations, width, height) {
            Ok((hdr, composite)) => {
                log::info!("Post-process stack created at {}x{}", width, height);
                Ok(Self { hdr, composite, ssao: None, bloom: None })
            }
            Err(e) => {
                allocations.release(backend);
                Err(e)
            }
        }
    }

    fn allocate(
        backend: &mut dyn GpuBackend,
        allocations: &mut Allocations,
        width: u32,
        height: u32,
    ) -> RenderResult<(Framebuffer, CompositePass)> {
        let hdr = allocations.framebuffer(backend, &Self::hdr_desc(width, height))?;
        let composite = CompositePass::new(backend)?;
        Ok((hdr, composite))
    }

    fn hdr_desc(width: u32, height: u32) -> FramebufferDesc {
        FramebufferDesc {
            depth: Some(TextureFormat::Depth24),
            ..color_target("hdr_scene", width, height, TextureFormat::Rgba16F)
        }
    }

    /// HDR render target of the main pass
    pub fn hdr_target(&self) -> &Framebuffer {
        &self.hdr
    }

    /// Current width and height of the HDR target
    pub fn size(&self) -> (u32, u32) {
        (self.hdr.width, self.hdr.height)
    }

    /// Whether ambient occlusion is active
    pub fn ssao_enabled(&self) -> bool {
        self.ssao.is_some()
    }

    /// Whether bloom is active
    pub fn bloom_enabled(&self) -> bool {
        self.bloom.is_some()
    }

    /// Create the SSAO pass; replaces an existing one
    pub fn enable_ssao(&mut self, backend: &mut dyn GpuBackend, settings: SsaoSettings) -> RenderResult<()> {
        let pass = SsaoPass::new(backend, self.hdr.width, self.hdr.height, settings)?;
        if let Some(old) = self.ssao.replace(pass) {
            old.destroy(backend);
        }
        Ok(())
    }

    /// Release the SSAO pass; returns whether it was active
    pub fn disable_ssao(&mut self, backend: &mut dyn GpuBackend) -> bool {
        match self.ssao.take() {
            Some(pass) => {
                pass.destroy(backend);
                true
            }
            None => false,
        }
    }

    /// Create the bloom pass; replaces an existing one
    pub fn enable_bloom(&mut self, backend: &mut dyn GpuBackend, settings: BloomSettings) -> RenderResult<()> {
        let pass = BloomPass::new(backend, self.hdr.width, self.hdr.height, settings)?;
        if let Some(old) = self.bloom.replace(pass) {
            old.destroy(backend);
        }
        Ok(())
    }

    /// Release the bloom pass; returns whether it was active
    pub fn disable_bloom(&mut self, backend: &mut dyn GpuBackend) -> bool {
        match self.bloom.take() {
            Some(pass) => {
                pass.destroy(backend);
                true
            }
            None => false,
        }
    }

    /// Recreate every resolution-dependent target
    ///
    /// A failing optional effect is dropped with a warning; failure of the
    /// HDR target itself is returned and leaves the previous target alive.
    pub fn resize(&mut self, backend: &mut dyn GpuBackend, width: u32, height: u32) -> RenderResult<()> {
        if (width, height) == self.size() {
            return Ok(());
        }

        let hdr = backend.create_framebuffer(&Self::hdr_desc(width, height))?;
        backend.destroy_framebuffer(self.hdr.handle);
        self.hdr = hdr;

        let ssao_failure = self.ssao.as_mut().and_then(|ssao| ssao.resize(backend, width, height).err());
        if let Some(e) = ssao_failure {
            log::warn!("SSAO disabled after failed resize: {}", e);
            self.disable_ssao(backend);
        }
        let bloom_failure = self.bloom.as_mut().and_then(|bloom| bloom.resize(backend, width, height).err());
        if let Some(e) = bloom_failure {
            log::warn!("Bloom disabled after failed resize: {}", e);
            self.disable_bloom(backend);
        }

        log::info!("Post-process targets resized to {}x{}", width, height);
        Ok(())
    }

    /// Run SSAO, bloom and the composite into the display surface
    ///
    /// Returns the number of full-screen passes issued.
    pub fn run(
        &mut self,
        backend: &mut dyn GpuBackend,
        projection: &Mat4,
        display: Viewport,
        tone_mapping: &ToneMapSettings,
    ) -> RenderResult<u32> {
        let scene = color_of(&self.hdr, "HDR")?;
        let depth = self
            .hdr
            .depth
            .ok_or_else(|| RenderError::FramebufferIncomplete("HDR target has no depth attachment".to_string()))?;

        backend.set_depth_test(false);
        let mut passes = 0;

        let ao = match self.ssao.as_ref() {
            Some(ssao) => {
                let texture = ssao.run(backend, depth, projection)?;
                passes += SsaoPass::PASS_COUNT;
                Some((texture, ssao.settings().strength))
            }
            None => None,
        };

        let bloom = match self.bloom.as_mut() {
            Some(bloom) => {
                let texture = bloom.run(backend, scene)?;
                passes += bloom.pass_count();
                Some((texture, bloom.settings().strength))
            }
            None => None,
        };

        self.composite.run(backend, scene, bloom, ao, tone_mapping, display)?;
        passes += 1;

        backend.set_depth_test(true);
        Ok(passes)
    }

    /// Release every target and program
    pub fn destroy(mut self, backend: &mut dyn GpuBackend) {
        self.disable_ssao(backend);
        self.disable_bloom(backend);
        self.composite.destroy(backend);
        backend.destroy_framebuffer(self.hdr.handle);
        log::info!("Post-process stack released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::HeadlessBackend;

    #[test]
    fn test_scaled_size_never_reaches_zero() {
        assert_eq!(scaled_size(1280, 720, 0.5), (640, 360));
        assert_eq!(scaled_size(1, 1, 0.5), (1, 1));
        assert_eq!(scaled_size(100, 50, f32::NAN), (100, 50));
    }

    #[test]
    fn test_composite_only_draws_once_to_display() {
        let mut backend = HeadlessBackend::new(320, 240);
        let mut stack = PostProcessStack::new(&mut backend, 320, 240).unwrap();

        let passes = stack
            .run(&mut backend, &Mat4::identity(), Viewport::new(320, 240), &ToneMapSettings::default())
            .unwrap();

        assert_eq!(passes, 1);
        let draws = backend.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].program_label, "composite");
        assert_eq!(draws[0].framebuffer, None);
    }

    #[test]
    fn test_full_chain_runs_in_order() {
        let mut backend = HeadlessBackend::new(320, 240);
        let mut stack = PostProcessStack::new(&mut backend, 320, 240).unwrap();
        stack.enable_ssao(&mut backend, SsaoSettings::default()).unwrap();
        let bloom = BloomSettings { blur_passes: 2, ..BloomSettings::default() };
        stack.enable_bloom(&mut backend, bloom).unwrap();

        let passes = stack
            .run(&mut backend, &Mat4::identity(), Viewport::new(320, 240), &ToneMapSettings::default())
            .unwrap();

        let labels: Vec<_> = backend.draws().iter().map(|d| d.program_label).collect();
        assert_eq!(
            labels,
            vec!["ssao", "ssao_blur", "bloom_bright", "gaussian_blur", "gaussian_blur", "gaussian_blur", "gaussian_blur", "composite"]
        );
        assert_eq!(passes, labels.len() as u32);
    }

    #[test]
    fn test_enable_disable_cycle_leaks_nothing() {
        let mut backend = HeadlessBackend::new(320, 240);
        let mut stack = PostProcessStack::new(&mut backend, 320, 240).unwrap();
        let baseline = backend.live_handle_count();

        stack.enable_bloom(&mut backend, BloomSettings::default()).unwrap();
        stack.enable_ssao(&mut backend, SsaoSettings::default()).unwrap();
        assert!(backend.live_handle_count() > baseline);
        assert!(stack.disable_bloom(&mut backend));
        assert!(stack.disable_ssao(&mut backend));
        assert!(!stack.disable_bloom(&mut backend));
        assert_eq!(backend.live_handle_count(), baseline);

        stack.destroy(&mut backend);
        assert_eq!(backend.live_handle_count(), 0);
    }

    #[test]
    fn test_resize_keeps_handle_count() {
        let mut backend = HeadlessBackend::new(320, 240);
        let mut stack = PostProcessStack::new(&mut backend, 320, 240).unwrap();
        stack.enable_ssao(&mut backend, SsaoSettings::default()).unwrap();
        stack.enable_bloom(&mut backend, BloomSettings::default()).unwrap();
        let before = backend.live_handle_count();

        stack.resize(&mut backend, 640, 480).unwrap();
        assert_eq!(stack.size(), (640, 480));
        assert_eq!(backend.live_handle_count(), before);
        assert!(stack.ssao_enabled() && stack.bloom_enabled());
    }

    #[test]
    fn test_failed_hdr_target_leaves_nothing() {
        let mut backend = HeadlessBackend::new(320, 240);
        backend.fail_next_framebuffer();
        assert!(PostProcessStack::new(&mut backend, 320, 240).is_err());

        backend.fail_next_program();
        assert!(PostProcessStack::new(&mut backend, 320, 240).is_err());
        assert_eq!(backend.live_handle_count(), 0);
    }
}
