//! Public rendering API
//!
//! This module contains the backend-facing API: the GPU capability trait,
//! its handle and descriptor types, and per-frame statistics.

pub mod render_backend;
pub mod frame_data;

// Re-export commonly used types
pub use render_backend::{
    GpuBackend, BackendResult,
    BufferHandle, TextureHandle, FramebufferHandle, ProgramHandle,
    BufferKind, TextureFormat, TextureFilter, TextureWrap, TextureDesc,
    Framebuffer, FramebufferDesc, Viewport, ClearFlags, PolygonMode, PrimitiveTopology,
    ShaderSource, UniformValue, AttributeFormat, VertexAttribute, VertexLayout, DrawCall,
};
pub use frame_data::FrameStats;
