//! # Renderer Configuration
//!
//! All tunables of the render pipeline live here so they can be loaded from
//! a TOML or RON file and handed to [`RenderEngine::new`](crate::render::RenderEngine::new).
//!
//! ## Configuration Categories
//!
//! - **Main pass**: culling toggle, clear colour, wireframe, automatic instancing
//! - **Shadows**: depth map resolution and the orthographic light volume
//! - **SSAO**: sample kernel, radius, blur and strength
//! - **Bloom**: bright-pass threshold, blur passes and strength
//! - **Tone mapping**: exposure and gamma

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// # Shadow Settings
///
/// Parameters for the directional-light shadow map. The resolution is fixed
/// when shadows are enabled; resizing the window never touches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// Square depth map resolution in texels
    pub resolution: u32,
    /// Half-size of the orthographic light volume in world units
    pub half_extent: f32,
    /// Distance the shadow camera is pulled back along the negated light direction
    pub light_offset: f32,
    /// Near plane of the light projection
    pub near: f32,
    /// Far plane of the light projection
    pub far: f32,
    /// Depth bias applied when comparing against the shadow map
    pub depth_bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            resolution: 2048,
            half_extent: 20.0,
            light_offset: 50.0,
            near: 0.1,
            far: 150.0,
            depth_bias: 0.005,
        }
    }
}

impl ShadowSettings {
    /// Why the orthographic light volume cannot be built, if it cannot
    pub fn volume_error(&self) -> Option<String> {
        let values = [self.half_extent, self.light_offset, self.near, self.far];
        if values.iter().any(|v| !v.is_finite()) {
            return Some("light volume parameters must be finite".to_string());
        }
        if self.half_extent <= 0.0 {
            return Some(format!("half_extent must be positive, got {}", self.half_extent));
        }
        if self.far <= self.near {
            return Some(format!("far ({}) must be greater than near ({})", self.far, self.near));
        }
        None
    }
}

/// # Screen-Space Ambient Occlusion Settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoSettings {
    /// Number of hemisphere samples in the kernel
    pub kernel_size: usize,
    /// Sampling radius in view-space units
    pub radius: f32,
    /// Depth comparison bias against self-occlusion acne
    pub bias: f32,
    /// Side length of the tiling rotation-noise texture
    pub noise_size: u32,
    /// Box blur radius in texels
    pub blur_radius: i32,
    /// Blend between no occlusion (0.0) and full occlusion (1.0) in the composite
    pub strength: f32,
    /// Fraction of the main resolution the occlusion buffers are allocated at
    pub resolution_scale: f32,
    /// Seed for the deterministic kernel and noise generation
    pub seed: u64,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            kernel_size: 32,
            radius: 0.5,
            bias: 0.025,
            noise_size: 4,
            blur_radius: 2,
            strength: 1.0,
            resolution_scale: 0.5,
            seed: 0x55A0,
        }
    }
}

/// # Bloom Settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    /// Luminance above which a pixel contributes to bloom
    pub threshold: f32,
    /// Scale applied to the blurred bright image when added to the scene
    pub strength: f32,
    /// Number of horizontal + vertical blur pairs
    pub blur_passes: u32,
    /// Fraction of the main resolution the bloom buffers are allocated at
    pub resolution_scale: f32,
    /// Gaussian standard deviation in texels
    pub sigma: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            strength: 0.3,
            blur_passes: 5,
            resolution_scale: 0.5,
            sigma: 2.0,
        }
    }
}

/// # Tone Mapping Settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMapSettings {
    /// Exposure multiplier applied before the tone curve
    pub exposure: f32,
    /// Display gamma
    pub gamma: f32,
}

impl Default for ToneMapSettings {
    fn default() -> Self {
        Self { exposure: 1.0, gamma: 2.2 }
    }
}

/// # Renderer Configuration
///
/// Top-level settings for [`RenderEngine`](crate::render::RenderEngine).
/// Optional features are still switched on at runtime through the engine's
/// `enable_*` calls; this struct only carries their parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Skip nodes whose world bounds fall outside the camera frustum
    pub culling_enabled: bool,
    /// Clear colour of the main pass (linear RGBA)
    pub clear_color: [f32; 4],
    /// Draw the main pass as wireframe
    pub wireframe: bool,
    /// Minimum number of nodes sharing a mesh and material before they are
    /// drawn with one instanced call; 0 disables automatic instancing
    pub instancing_threshold: usize,
    /// Shadow map parameters
    pub shadows: ShadowSettings,
    /// Ambient occlusion parameters
    pub ssao: SsaoSettings,
    /// Bloom parameters
    pub bloom: BloomSettings,
    /// Tone mapping parameters
    pub tone_mapping: ToneMapSettings,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            culling_enabled: true,
            clear_color: [0.05, 0.05, 0.08, 1.0],
            wireframe: false,
            instancing_threshold: 8,
            shadows: ShadowSettings::default(),
            ssao: SsaoSettings::default(),
            bloom: BloomSettings::default(),
            tone_mapping: ToneMapSettings::default(),
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable frustum culling
    pub fn with_culling(mut self, enabled: bool) -> Self {
        self.culling_enabled = enabled;
        self
    }

    /// Set the main pass clear colour
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the automatic instancing threshold (0 disables)
    pub fn with_instancing_threshold(mut self, threshold: usize) -> Self {
        self.instancing_threshold = threshold;
        self
    }

    /// Replace the shadow settings
    pub fn with_shadows(mut self, shadows: ShadowSettings) -> Self {
        self.shadows = shadows;
        self
    }

    /// Replace the SSAO settings
    pub fn with_ssao(mut self, ssao: SsaoSettings) -> Self {
        self.ssao = ssao;
        self
    }

    /// Replace the bloom settings
    pub fn with_bloom(mut self, bloom: BloomSettings) -> Self {
        self.bloom = bloom;
        self
    }

    /// Replace the tone mapping settings
    pub fn with_tone_mapping(mut self, tone_mapping: ToneMapSettings) -> Self {
        self.tone_mapping = tone_mapping;
        self
    }
}
