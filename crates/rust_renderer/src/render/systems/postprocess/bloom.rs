//! Bloom
//!
//! Bright pass into one half of a ping-pong pair, then `blur_passes`
//! horizontal + vertical Gaussian pairs bouncing between the two halves.
//! An even number of blur iterations always ends in the slot the bright
//! pass wrote, so the composite reads a fixed buffer.

use super::{color_of, color_target, draw_fullscreen, scaled_size, Allocations};
use crate::core::BloomSettings;
use crate::render::api::{Framebuffer, GpuBackend, ProgramHandle, TextureFormat, TextureHandle, UniformValue};
use crate::render::resources::shaders::{self, MAX_BLUR_WEIGHTS};
use crate::render::RenderResult;

/// One-sided normalized Gaussian weights, centre first
///
/// `w[0] + 2 * (w[1] + ... + w[n-1]) == 1`. A non-positive or non-finite
/// `sigma` degenerates to the single weight `[1.0]`.
pub fn gaussian_weights(sigma: f32, count: usize) -> Vec<f32> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return vec![1.0];
    }
    let count = count.clamp(1, MAX_BLUR_WEIGHTS);
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut weights: Vec<f32> = (0..count)
        .map(|offset| {
            let x = offset as f32;
            (-(x * x) / two_sigma_sq).exp()
        })
        .collect();

    let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
    for weight in &mut weights {
        *weight /= total;
    }
    weights
}

/// Number of taps covering three standard deviations
fn tap_count(sigma: f32) -> usize {
    if sigma.is_finite() && sigma > 0.0 {
        (3.0 * sigma).ceil() as usize + 1
    } else {
        1
    }
}

/// Two render targets read and written alternately
#[derive(Debug, Clone, PartialEq)]
pub struct PingPong<T> {
    slots: [T; 2],
    current: usize,
}

impl<T> PingPong<T> {
    /// Start with slot 0 holding the current image
    pub fn new(first: T, second: T) -> Self {
        Self { slots: [first, second], current: 0 }
    }

    /// Slot index holding the latest result
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Target holding the latest result (read side)
    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    /// Target the next pass writes into
    pub fn next(&self) -> &T {
        &self.slots[1 - self.current]
    }

    /// Make the written target current
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Make slot 0 current again
    pub fn reset(&mut self) {
        self.current = 0;
    }

    /// Both targets, slot order
    pub fn slots(&self) -> &[T; 2] {
        &self.slots
    }

    /// Take both targets back
    pub fn into_slots(self) -> [T; 2] {
        self.slots
    }
}

/// Bright pass and separable blur
#[derive(Debug)]
pub struct BloomPass {
    settings: BloomSettings,
    weights: Vec<f32>,
    targets: PingPong<Framebuffer>,
    bright_program: ProgramHandle,
    blur_program: ProgramHandle,
}

impl BloomPass {
    /// Allocate both blur targets for a `width x height` main target
    pub fn new(backend: &mut dyn GpuBackend, width: u32, height: u32, settings: BloomSettings) -> RenderResult<Self> {
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
        settings: BloomSettings,
    ) -> RenderResult<Self> {
        let (w, h) = scaled_size(width, height, settings.resolution_scale);
        let first = allocations.framebuffer(backend, &color_target("bloom_ping", w, h, TextureFormat::Rgba16F))?;
        let second = allocations.framebuffer(backend, &color_target("bloom_pong", w, h, TextureFormat::Rgba16F))?;
        let bright_program = allocations.program(backend, &shaders::bloom_bright())?;
        let blur_program = allocations.program(backend, &shaders::gaussian_blur())?;

        let weights = gaussian_weights(settings.sigma, tap_count(settings.sigma));
        log::info!(
            "Bloom enabled at {}x{}: threshold {}, {} blur passes, {} taps",
            w,
            h,
            settings.threshold,
            settings.blur_passes,
            weights.len()
        );
        Ok(Self {
            settings,
            weights,
            targets: PingPong::new(first, second),
            bright_program,
            blur_program,
        })
    }

    /// Active parameters
    pub fn settings(&self) -> &BloomSettings {
        &self.settings
    }

    /// Blur weights uploaded every blur pass
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Full-screen passes per run: bright pass plus `2 * blur_passes`
    pub fn pass_count(&self) -> u32 {
        1 + 2 * self.settings.blur_passes
    }

    /// Size of the blur targets
    pub fn buffer_size(&self) -> (u32, u32) {
        let target = self.targets.current();
        (target.width, target.height)
    }

    /// Reallocate both targets; the old pair survives a failure
    pub fn resize(&mut self, backend: &mut dyn GpuBackend, width: u32, height: u32) -> RenderResult<()> {
        let (w, h) = scaled_size(width, height, self.settings.resolution_scale);
        let first = backend.create_framebuffer(&color_target("bloom_ping", w, h, TextureFormat::Rgba16F))?;
        let second = match backend.create_framebuffer(&color_target("bloom_pong", w, h, TextureFormat::Rgba16F)) {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                backend.destroy_framebuffer(first.handle);
                return Err(e);
            }
        };

        let old = std::mem::replace(&mut self.targets, PingPong::new(first, second));
        for target in old.into_slots() {
            backend.destroy_framebuffer(target.handle);
        }
        log::debug!("Bloom targets resized to {}x{}", w, h);
        Ok(())
    }

    /// Extract and blur bright pixels of `scene`; returns the blurred texture
    pub fn run(&mut self, backend: &mut dyn GpuBackend, scene: TextureHandle) -> RenderResult<TextureHandle> {
        self.targets.reset();

        backend.bind_program(self.bright_program);
        backend.bind_texture(0, Some(scene));
        backend.set_uniform("u_threshold", self.settings.threshold.into());
        let bright = self.targets.current();
        draw_fullscreen(backend, Some(bright.handle), bright.viewport())?;

        backend.bind_program(self.blur_program);
        backend.set_uniform("u_weight_count", (self.weights.len() as i32).into());
        backend.set_uniform("u_weights", UniformValue::FloatArray(self.weights.clone()));
        for iteration in 0..2 * self.settings.blur_passes {
            let source = color_of(self.targets.current(), "bloom")?;
            let target = self.targets.next();
            backend.bind_texture(0, Some(source));
            backend.set_uniform("u_horizontal", (iteration % 2 == 0).into());
            draw_fullscreen(backend, Some(target.handle), target.viewport())?;
            self.targets.swap();
        }

        color_of(self.targets.current(), "bloom")
    }

    /// Free both targets and the programs
    pub fn destroy(self, backend: &mut dyn GpuBackend) {
        backend.destroy_program(self.bright_program);
        backend.destroy_program(self.blur_program);
        for target in self.targets.into_slots() {
            backend.destroy_framebuffer(target.handle);
        }
        log::info!("Bloom disabled");
    }
}
