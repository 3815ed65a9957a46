//! Material definitions
//!
//! A material picks one of two shading models and carries up to four
//! optional textures. Materials are shared between nodes through `Arc` and
//! identified by a [`MaterialId`] so draws can be grouped without comparing
//! pointers.

use std::sync::atomic::{AtomicU64, Ordering};

use super::{PbrParams, PhongParams};
use crate::foundation::math::Vec3;
use crate::render::api::{TextureHandle, UniformValue};

/// Texture unit the shadow map is bound to; material textures use the units below it
pub const SHADOW_MAP_SLOT: u32 = 4;

/// Shading model of a material
#[derive(Debug, Clone, PartialEq)]
pub enum ShadingModel {
    /// Blinn-Phong diffuse + specular
    Phong(PhongParams),
    /// Metallic-roughness physically based shading
    Pbr(PbrParams),
}

impl ShadingModel {
    /// Whether the PBR fragment program is needed
    pub fn is_pbr(&self) -> bool {
        matches!(self, ShadingModel::Pbr(_))
    }

    /// Albedo of either model
    pub fn albedo(&self) -> Vec3 {
        match self {
            ShadingModel::Phong(p) => p.albedo,
            ShadingModel::Pbr(p) => p.albedo,
        }
    }
}

/// Optional texture bindings of a material
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    /// Base color texture (slot 0)
    pub albedo: Option<TextureHandle>,
    /// Tangent-space normal map (slot 1)
    pub normal: Option<TextureHandle>,
    /// Metallic in B, roughness in G (slot 2)
    pub metallic_roughness: Option<TextureHandle>,
    /// Emissive color texture (slot 3)
    pub emissive: Option<TextureHandle>,
}

impl MaterialTextures {
    /// Textures paired with their slot and the uniform flag telling the shader the slot is bound
    pub fn slots(&self) -> [(u32, &'static str, Option<TextureHandle>); 4] {
        [
            (0, "u_has_albedo_map", self.albedo),
            (1, "u_has_normal_map", self.normal),
            (2, "u_has_metallic_roughness_map", self.metallic_roughness),
            (3, "u_has_emissive_map", self.emissive),
        ]
    }
}

/// Unique identifier for materials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

impl MaterialId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Surface description shared by any number of nodes
#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    /// Shading model and its parameters
    pub shading: ShadingModel,
    /// Texture bindings for this material
    pub textures: MaterialTextures,
    /// Skip lighting and output albedo (plus emissive) directly
    pub unlit: bool,
    /// Optional name for debugging
    pub name: Option<String>,
}

impl Clone for Material {
    fn clone(&self) -> Self {
        Self {
            id: MaterialId::next(),
            shading: self.shading.clone(),
            textures: self.textures,
            unlit: self.unlit,
            name: self.name.clone(),
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::phong(PhongParams::default())
    }
}

impl Material {
    /// Create a Phong material
    pub fn phong(params: PhongParams) -> Self {
        Self::with_shading(ShadingModel::Phong(params))
    }

    /// Create a PBR material
    pub fn pbr(params: PbrParams) -> Self {
        Self::with_shading(ShadingModel::Pbr(params))
    }

    fn with_shading(shading: ShadingModel) -> Self {
        Self {
            id: MaterialId::next(),
            shading,
            textures: MaterialTextures::default(),
            unlit: false,
            name: None,
        }
    }

    /// Identity used to group draws
    pub fn id(&self) -> MaterialId {
        self.id
    }

    /// Set the material name for debugging
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark the material as unlit
    pub fn with_unlit(mut self, unlit: bool) -> Self {
        self.unlit = unlit;
        self
    }

    /// Replace all texture bindings
    pub fn with_textures(mut self, textures: MaterialTextures) -> Self {
        self.textures = textures;
        self
    }

    /// Scalar and vector uniforms consumed by the fragment programs
    pub fn uniforms(&self) -> Vec<(&'static str, UniformValue)> {
        let mut out = vec![
            ("u_unlit", UniformValue::from(self.unlit)),
            ("u_albedo", UniformValue::from(self.shading.albedo())),
        ];
        match &self.shading {
            ShadingModel::Phong(p) => {
                out.push(("u_specular", UniformValue::from(p.specular)));
                out.push(("u_shininess", UniformValue::from(p.shininess)));
            }
            ShadingModel::Pbr(p) => {
                out.push(("u_metallic", UniformValue::from(p.metallic)));
                out.push(("u_roughness", UniformValue::from(p.roughness)));
                out.push(("u_emissive", UniformValue::from(p.emissive)));
            }
        }
        out
    }
}
