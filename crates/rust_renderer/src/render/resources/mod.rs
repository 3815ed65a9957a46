//! Resource management
//!
//! Passive resources shared by the passes: materials, embedded shader
//! sources and the cache of uploaded meshes.

pub mod materials;
pub mod mesh_cache;
pub mod shaders;

pub use mesh_cache::{GpuMesh, InstanceBuffer, MeshCache};
