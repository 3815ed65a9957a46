//! Directional shadow mapping
//!
//! Depth-only rendering from the scene's directional light into a fixed
//! resolution shadow map, sampled with 3x3 PCF by the forward programs.

pub mod shadow_pass;

pub use shadow_pass::{light_space_matrix, ShadowPass};
