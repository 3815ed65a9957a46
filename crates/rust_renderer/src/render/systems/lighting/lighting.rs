//! Scene lights
//!
//! Light definitions are plain data; the main pass packs them into uniform
//! arrays with [`PackedLights`] once per frame. The first directional light
//! also drives the shadow pass.

use crate::foundation::math::Vec3;

/// Maximum number of lights the forward shaders iterate over
pub const MAX_LIGHTS: usize = 8;

/// Light types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    /// Directional light (like sunlight)
    Directional,
    /// Point light (like a lightbulb)
    Point,
    /// Spot light (like a flashlight)
    Spot,
}

impl LightType {
    /// Integer tag the shaders switch on
    pub fn shader_tag(self) -> f32 {
        match self {
            LightType::Directional => 0.0,
            LightType::Point => 1.0,
            LightType::Spot => 2.0,
        }
    }
}

/// Light source
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    /// Light type
    pub light_type: LightType,
    /// Light position (for point/spot lights)
    pub position: Vec3,
    /// Direction the light travels (for directional/spot lights)
    pub direction: Vec3,
    /// Light color
    pub color: Vec3,
    /// Light intensity
    pub intensity: f32,
    /// Light range (for point/spot lights)
    pub range: f32,
    /// Inner cone angle for spot lights (in radians)
    pub inner_cone_angle: f32,
    /// Outer cone angle for spot lights (in radians)
    pub outer_cone_angle: f32,
}

/// Normalize, leaving near-zero vectors at zero so callers can detect them
fn normalize_or_zero(v: Vec3) -> Vec3 {
    v.try_normalize(1e-6).unwrap_or_else(Vec3::zeros)
}

impl Light {
    /// Create a directional light
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            light_type: LightType::Directional,
            position: Vec3::zeros(),
            direction: normalize_or_zero(direction),
            color,
            intensity,
            range: 0.0,
            inner_cone_angle: 0.0,
            outer_cone_angle: 0.0,
        }
    }

    /// Create a point light
    pub fn point(position: Vec3, color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            light_type: LightType::Point,
            position,
            direction: Vec3::zeros(),
            color,
            intensity,
            range,
            inner_cone_angle: 0.0,
            outer_cone_angle: 0.0,
        }
    }

    /// Create a spot light
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        range: f32,
        inner_cone_angle: f32,
        outer_cone_angle: f32,
    ) -> Self {
        Self {
            light_type: LightType::Spot,
            position,
            direction: normalize_or_zero(direction),
            color,
            intensity,
            range,
            inner_cone_angle,
            outer_cone_angle,
        }
    }

    /// True for directional lights
    pub fn is_directional(&self) -> bool {
        self.light_type == LightType::Directional
    }

    /// Direction is too short to orient anything
    pub fn has_degenerate_direction(&self) -> bool {
        self.direction.norm_squared() < 1e-12
    }
}

/// Lights flattened into the uniform arrays of the forward shaders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedLights {
    /// Number of valid entries
    pub count: usize,
    /// World positions
    pub positions: Vec<Vec3>,
    /// Normalized directions
    pub directions: Vec<Vec3>,
    /// Color premultiplied by intensity
    pub colors: Vec<Vec3>,
    /// Per light: type tag, range, cos(inner), cos(outer)
    pub params: Vec<f32>,
}

impl PackedLights {
    /// Pack up to [`MAX_LIGHTS`] lights, dropping the rest with a warning
    pub fn pack(lights: &[Light]) -> Self {
        if lights.len() > MAX_LIGHTS {
            log::warn!(
                "Scene has {} lights; only the first {} are shaded",
                lights.len(),
                MAX_LIGHTS
            );
        }

        let mut packed = Self::default();
        for light in lights.iter().take(MAX_LIGHTS) {
            packed.positions.push(light.position);
            packed.directions.push(light.direction);
            packed.colors.push(light.color * light.intensity);
            packed.params.extend_from_slice(&[
                light.light_type.shader_tag(),
                light.range,
                light.inner_cone_angle.cos(),
                light.outer_cone_angle.cos(),
            ]);
            packed.count += 1;
        }
        packed
    }
}
