//! Material parameter types for the two shading workflows

use crate::foundation::math::Vec3;

/// Phong-style parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PhongParams {
    /// Diffuse color
    pub albedo: Vec3,
    /// Specular highlight color
    pub specular: Vec3,
    /// Specular exponent
    pub shininess: f32,
}

impl Default for PhongParams {
    fn default() -> Self {
        Self {
            albedo: Vec3::new(0.8, 0.8, 0.8),
            specular: Vec3::new(0.5, 0.5, 0.5),
            shininess: 32.0,
        }
    }
}

/// Metallic-roughness PBR parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PbrParams {
    /// Base color (albedo) - RGB values
    pub albedo: Vec3,
    /// Metallic factor (0.0 = dielectric, 1.0 = metallic)
    pub metallic: f32,
    /// Roughness factor (0.0 = mirror, 1.0 = completely rough)
    pub roughness: f32,
    /// Emitted radiance, added after lighting
    pub emissive: Vec3,
}

impl Default for PbrParams {
    fn default() -> Self {
        Self {
            albedo: Vec3::new(0.8, 0.8, 0.8),
            metallic: 0.0,
            roughness: 0.5,
            emissive: Vec3::zeros(),
        }
    }
}
