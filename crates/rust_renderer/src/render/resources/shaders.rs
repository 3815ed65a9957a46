//! Embedded shader programs
//!
//! GLSL sources are compiled into the binary; each constructor pairs the
//! stages of one program and sets its defines.

use crate::render::api::ShaderSource;
use crate::render::systems::lighting::MAX_LIGHTS;

const FORWARD_VERT: &str = include_str!("../../../shaders/forward.vert");
const PHONG_FRAG: &str = include_str!("../../../shaders/phong.frag");
const PBR_FRAG: &str = include_str!("../../../shaders/pbr.frag");
const SHADOW_DEPTH_VERT: &str = include_str!("../../../shaders/shadow_depth.vert");
const SHADOW_DEPTH_FRAG: &str = include_str!("../../../shaders/shadow_depth.frag");
const FULLSCREEN_VERT: &str = include_str!("../../../shaders/fullscreen.vert");
const SSAO_FRAG: &str = include_str!("../../../shaders/ssao.frag");
const SSAO_BLUR_FRAG: &str = include_str!("../../../shaders/ssao_blur.frag");
const BLOOM_BRIGHT_FRAG: &str = include_str!("../../../shaders/bloom_bright.frag");
const GAUSSIAN_BLUR_FRAG: &str = include_str!("../../../shaders/gaussian_blur.frag");
const COMPOSITE_FRAG: &str = include_str!("../../../shaders/composite.frag");

/// Largest SSAO kernel the shader declares storage for
pub const MAX_SSAO_KERNEL: usize = 64;

/// Largest number of one-sided Gaussian weights the blur shader accepts
pub const MAX_BLUR_WEIGHTS: usize = 16;

/// Forward program for the given shading model and draw path
pub fn forward(pbr: bool, instanced: bool) -> ShaderSource {
    let (label, fragment) = match (pbr, instanced) {
        (false, false) => ("forward_phong", PHONG_FRAG),
        (false, true) => ("forward_phong_instanced", PHONG_FRAG),
        (true, false) => ("forward_pbr", PBR_FRAG),
        (true, true) => ("forward_pbr_instanced", PBR_FRAG),
    };
    let source = ShaderSource::new(label, FORWARD_VERT, fragment).with_define("MAX_LIGHTS", MAX_LIGHTS);
    if instanced {
        source.with_define("INSTANCED", 1)
    } else {
        source
    }
}

/// Depth-only program of the shadow pass
pub fn shadow_depth() -> ShaderSource {
    ShaderSource::new("shadow_depth", SHADOW_DEPTH_VERT, SHADOW_DEPTH_FRAG)
}

/// Ambient occlusion estimate
pub fn ssao() -> ShaderSource {
    ShaderSource::new("ssao", FULLSCREEN_VERT, SSAO_FRAG).with_define("MAX_KERNEL_SIZE", MAX_SSAO_KERNEL)
}

/// `(2r + 1)²` box blur centred on each occlusion texel
pub fn ssao_blur() -> ShaderSource {
    ShaderSource::new("ssao_blur", FULLSCREEN_VERT, SSAO_BLUR_FRAG)
}

/// Luminance threshold pass
pub fn bloom_bright() -> ShaderSource {
    ShaderSource::new("bloom_bright", FULLSCREEN_VERT, BLOOM_BRIGHT_FRAG)
}

/// Single-axis separable Gaussian blur
pub fn gaussian_blur() -> ShaderSource {
    ShaderSource::new("gaussian_blur", FULLSCREEN_VERT, GAUSSIAN_BLUR_FRAG).with_define("MAX_WEIGHTS", MAX_BLUR_WEIGHTS)
}

/// Tone mapping composite
pub fn composite() -> ShaderSource {
    ShaderSource::new("composite", FULLSCREEN_VERT, COMPOSITE_FRAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_program_has_both_stages() {
        let programs = [
            forward(false, false),
            forward(true, true),
            shadow_depth(),
            ssao(),
            ssao_blur(),
            bloom_bright(),
            gaussian_blur(),
            composite(),
        ];
        for program in programs {
            assert!(program.vertex.starts_with("#version"), "{}", program.label);
            assert!(program.fragment.starts_with("#version"), "{}", program.label);
            assert!(program.fragment.contains("void main"), "{}", program.label);
        }
    }

    #[test]
    fn test_ssao_blur_window_is_centred() {
        let blur = ssao_blur();
        assert!(blur.fragment.contains("x = -u_blur_radius; x <= u_blur_radius"));
        assert!(blur.fragment.contains("y = -u_blur_radius; y <= u_blur_radius"));
    }

    #[test]
    fn test_instanced_variant_sets_define() {
        assert!(forward(true, true).defines.iter().any(|(name, _)| *name == "INSTANCED"));
        assert!(!forward(true, false).defines.iter().any(|(name, _)| *name == "INSTANCED"));
    }
}
