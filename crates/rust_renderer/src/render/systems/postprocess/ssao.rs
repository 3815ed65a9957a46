//! Screen-space ambient occlusion
//!
//! Occlusion is estimated from the HDR depth buffer with a hemisphere
//! kernel, rotated per fragment by a small tiling noise texture, and then
//! box-blurred. Both buffers run at `resolution_scale` of the main target.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{color_of, color_target, draw_fullscreen, scaled_size, Allocations};
use crate::core::SsaoSettings;
use crate::foundation::math::{utils, Mat4, Vec3};
use crate::render::api::{
    Framebuffer, GpuBackend, ProgramHandle, TextureDesc, TextureFilter, TextureFormat, TextureHandle, TextureWrap,
    UniformValue,
};
use crate::render::resources::shaders::{self, MAX_SSAO_KERNEL};
use crate::render::RenderResult;

/// Hemisphere sample kernel oriented along +Z
///
/// Samples lie inside the unit hemisphere (`z >= 0`, length `<= 1`) and are
/// pulled toward the origin by `lerp(0.1, 1.0, t²)` with `t = i / size`.
/// The same seed always yields the same kernel. `size` is clamped to the
/// shader's storage.
pub fn generate_kernel(size: usize, seed: u64) -> Vec<Vec3> {
    let size = size.clamp(1, MAX_SSAO_KERNEL);
    let mut rng = StdRng::seed_from_u64(seed);

    (0..size)
        .map(|i| {
            let direction = Vec3::new(
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(0.0..=1.0),
            )
            .try_normalize(1e-6)
            .unwrap_or_else(Vec3::z);

            let t = i as f32 / size as f32;
            let scale = utils::lerp(0.1, 1.0, t * t);
            direction * rng.gen_range(0.0..=1.0f32) * scale
        })
        .collect()
}

/// Rotation vectors in the XY plane for the `size x size` noise texture
pub fn generate_noise(size: u32, seed: u64) -> Vec<[f32; 2]> {
    // Decorrelated from the kernel stream
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    (0..size * size)
        .map(|_| [rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0)])
        .collect()
}

/// Occlusion estimate followed by a box blur
#[derive(Debug)]
pub struct SsaoPass {
    settings: SsaoSettings,
    kernel: Vec<Vec3>,
    noise: TextureHandle,
    occlusion: Framebuffer,
    blurred: Framebuffer,
    ssao_program: ProgramHandle,
    blur_program: ProgramHandle,
}

impl SsaoPass {
    /// Full-screen passes issued per run
    pub const PASS_COUNT: u32 = 2;

    /// Build the kernel and noise and allocate the occlusion buffers for a
    /// `width x height` main target
    pub fn new(backend: &mut dyn GpuBackend, width: u32, height: u32, settings: SsaoSettings) -> RenderResult<Self> {
        let mut allocations = Allocations::default();
        let result = Self::allocate(backend, &mut allocations, width, height, settings);
        if result.is_err() {
            allocations.release(backend);
        }
        result
    }

    fn allocate(
        backend: &mut dyn GpuBackend,
        allocations: &mut Allocations,
        width: u32,
        height: u32,
        settings: SsaoSettings,
    ) -> RenderResult<Self> {
        let kernel = generate_kernel(settings.kernel_size, settings.seed);

        let noise_size = settings.noise_size.max(1);
        let noise_data = generate_noise(noise_size, settings.seed);
        let noise = allocations.texture(
            backend,
            &TextureDesc {
                label: "ssao_noise".to_string(),
                width: noise_size,
                height: noise_size,
                format: TextureFormat::Rg32F,
                filter: TextureFilter::Nearest,
                wrap: TextureWrap::Repeat,
            },
            Some(bytemuck::cast_slice(&noise_data)),
        )?;

        let (w, h) = scaled_size(width, height, settings.resolution_scale);
        let occlusion = allocations.framebuffer(backend, &color_target("ssao", w, h, TextureFormat::R16F))?;
        let blurred = allocations.framebuffer(backend, &color_target("ssao_blur", w, h, TextureFormat::R16F))?;
        let ssao_program = allocations.program(backend, &shaders::ssao())?;
        let blur_program = allocations.program(backend, &shaders::ssao_blur())?;

        log::info!("SSAO enabled: {} samples at {}x{}", kernel.len(), w, h);
        Ok(Self {
            settings,
            kernel,
            noise,
            occlusion,
            blurred,
            ssao_program,
            blur_program,
        })
    }

    /// Active parameters
    pub fn settings(&self) -> &SsaoSettings {
        &self.settings
    }

    /// The sample kernel uploaded every run
    pub fn kernel(&self) -> &[Vec3] {
        &self.kernel
    }

    /// Size of the occlusion buffers
    pub fn buffer_size(&self) -> (u32, u32) {
        (self.occlusion.width, self.occlusion.height)
    }

    /// Reallocate both occlusion buffers for a new main target size
    ///
    /// The old buffers survive a failed allocation.
    pub fn resize(&mut self, backend: &mut dyn GpuBackend, width: u32, height: u32) -> RenderResult<()> {
        let (w, h) = scaled_size(width, height, self.settings.resolution_scale);
        let occlusion = backend.create_framebuffer(&color_target("ssao", w, h, TextureFormat::R16F))?;
        let blurred = match backend.create_framebuffer(&color_target("ssao_blur", w, h, TextureFormat::R16F)) {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                backend.destroy_framebuffer(occlusion.handle);
                return Err(e);
            }
        };

        backend.destroy_framebuffer(self.occlusion.handle);
        backend.destroy_framebuffer(self.blurred.handle);
        self.occlusion = occlusion;
        self.blurred = blurred;
        log::debug!("SSAO buffers resized to {}x{}", w, h);
        Ok(())
    }

    /// Estimate and blur occlusion; returns the blurred occlusion texture
    pub fn run(&self, backend: &mut dyn GpuBackend, depth: TextureHandle, projection: &Mat4) -> RenderResult<TextureHandle> {
        let noise_size = self.settings.noise_size.max(1) as f32;

        backend.bind_program(self.ssao_program);
        backend.bind_texture(0, Some(depth));
        backend.bind_texture(1, Some(self.noise));
        backend.set_uniform(
            "u_samples",
            UniformValue::Vec3Array(self.kernel.iter().map(|s| [s.x, s.y, s.z]).collect()),
        );
        backend.set_uniform("u_kernel_size", (self.kernel.len() as i32).into());
        backend.set_uniform("u_radius", self.settings.radius.into());
        backend.set_uniform("u_bias", self.settings.bias.into());
        backend.set_uniform("u_projection", projection.into());
        backend.set_uniform("u_inverse_projection", (&utils::safe_inverse(projection)).into());
        backend.set_uniform(
            "u_noise_scale",
            UniformValue::Vec2([
                self.occlusion.width as f32 / noise_size,
                self.occlusion.height as f32 / noise_size,
            ]),
        );
        draw_fullscreen(backend, Some(self.occlusion.handle), self.occlusion.viewport())?;

        backend.bind_program(self.blur_program);
        backend.bind_texture(0, Some(color_of(&self.occlusion, "SSAO")?));
        backend.bind_texture(1, None);
        backend.set_uniform("u_blur_radius", self.settings.blur_radius.max(0).into());
        draw_fullscreen(backend, Some(self.blurred.handle), self.blurred.viewport())?;

        color_of(&self.blurred, "SSAO blur")
    }

    /// Free buffers, noise texture and programs
    pub fn destroy(self, backend: &mut dyn GpuBackend) {
        backend.destroy_program(self.ssao_program);
        backend.destroy_program(self.blur_program);
        backend.destroy_texture(self.noise);
        backend.destroy_framebuffer(self.occlusion.handle);
        backend.destroy_framebuffer(self.blurred.handle);
        log::info!("SSAO disabled");
    }
}
