//! Instanced rendering
//!
//! Per-instance data built on the CPU and drawn with one call per mesh.

pub mod instance_renderer;

pub use instance_renderer::{InstanceData, InstanceRenderer};
