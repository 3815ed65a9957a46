//! Tone mapping composite
//!
//! Final full-screen pass writing to the display surface:
//! `hdr * mix(1, ao, ao_strength) + bloom * bloom_strength`, exposure,
//! `1 - exp(-c * exposure)`, then gamma.

use super::draw_fullscreen;
use crate::core::ToneMapSettings;
use crate::render::api::{GpuBackend, ProgramHandle, TextureHandle, Viewport};
use crate::render::resources::shaders;
use crate::render::RenderResult;

const SCENE_SLOT: u32 = 0;
const BLOOM_SLOT: u32 = 1;
const AO_SLOT: u32 = 2;

/// Composite program
#[derive(Debug)]
pub struct CompositePass {
    program: ProgramHandle,
}

impl CompositePass {
    /// Compile the composite program
    pub fn new(backend: &mut dyn GpuBackend) -> RenderResult<Self> {
        let program = backend.create_program(&shaders::composite())?;
        Ok(Self { program })
    }

    /// Combine the inputs and write the tone-mapped image to the display
    ///
    /// `bloom` and `ao` carry their texture and strength when the effect ran.
    pub fn run(
        &self,
        backend: &mut dyn GpuBackend,
        scene: TextureHandle,
        bloom: Option<(TextureHandle, f32)>,
        ao: Option<(TextureHandle, f32)>,
        settings: &ToneMapSettings,
        display: Viewport,
    ) -> RenderResult<()> {
        backend.bind_program(self.program);
        backend.bind_texture(SCENE_SLOT, Some(scene));

        backend.bind_texture(BLOOM_SLOT, bloom.map(|(texture, _)| texture));
        backend.set_uniform("u_has_bloom", bloom.is_some().into());
        backend.set_uniform("u_bloom_strength", bloom.map_or(0.0, |(_, strength)| strength).into());

        backend.bind_texture(AO_SLOT, ao.map(|(texture, _)| texture));
        backend.set_uniform("u_has_ao", ao.is_some().into());
        backend.set_uniform("u_ao_strength", ao.map_or(0.0, |(_, strength)| strength.clamp(0.0, 1.0)).into());

        backend.set_uniform("u_exposure", settings.exposure.into());
        backend.set_uniform("u_gamma", settings.gamma.into());

        draw_fullscreen(backend, None, display)
    }

    /// Free the program
    pub fn destroy(&self, backend: &mut dyn GpuBackend) {
        backend.destroy_program(self.program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// The composite shader's curve for one channel
    fn tone_map(hdr: f32, settings: &ToneMapSettings) -> f32 {
        let mapped = 1.0 - (-hdr.max(0.0) * settings.exposure).exp();
        let gamma = if settings.gamma > 0.0 { settings.gamma } else { 1.0 };
        mapped.powf(1.0 / gamma)
    }

    #[test]
    fn test_tone_curve_is_bounded_and_monotonic() {
        let settings = ToneMapSettings::default();
        assert_relative_eq!(tone_map(0.0, &settings), 0.0);
        let samples: Vec<f32> = [0.01, 0.5, 1.0, 4.0, 100.0].iter().map(|&v| tone_map(v, &settings)).collect();
        assert!(samples.windows(2).all(|w| w[0] < w[1]));
        assert!(samples.iter().all(|&v| v <= 1.0));
    }

    #[test]
    fn test_exposure_brightens() {
        let dim = ToneMapSettings { exposure: 0.5, ..ToneMapSettings::default() };
        let bright = ToneMapSettings { exposure: 2.0, ..ToneMapSettings::default() };
        assert!(tone_map(0.5, &bright) > tone_map(0.5, &dim));
    }
}
