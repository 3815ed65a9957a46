//! Active rendering systems
//!
//! The passes a frame is made of: lighting uniforms, the forward main pass,
//! instanced drawing, the directional shadow map and the HDR post-process
//! chain.

pub mod lighting;
pub mod forward;
pub mod instancing;
pub mod shadow;
pub mod postprocess;
