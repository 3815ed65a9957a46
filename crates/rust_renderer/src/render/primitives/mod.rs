//! Core primitive types for rendering
//!
//! Meshes, vertices and the camera.

pub mod mesh;
pub mod camera;

pub use mesh::{Mesh, MeshId, Vertex};
pub use camera::Camera;
