//! Material system
//!
//! Shading models, their parameters and texture bindings.

pub mod material;
pub mod material_params;

pub use material::{Material, MaterialId, MaterialTextures, ShadingModel, SHADOW_MAP_SLOT};
pub use material_params::{PbrParams, PhongParams};
