//! # Rendering System
//!
//! Multi-pass forward renderer driven by [`RenderEngine`].
//!
//! ## Architecture
//!
//! - **api**: the [`GpuBackend`] capability set, handles and descriptors
//! - **primitives**: meshes, vertices and the camera
//! - **resources**: materials, shader sources and the GPU mesh cache
//! - **systems**: lighting, the forward pass, instancing, shadows and post-processing
//! - **backends**: concrete [`GpuBackend`] implementations
//!
//! One frame runs `render()` (shadow pass, culled main pass), then any
//! number of extra instanced draws, then `present()` (post-process chain,
//! overlays, swap).

use thiserror::Error;

pub mod api;
pub mod primitives;
pub mod resources;
pub mod systems;
pub mod backends;

mod render_engine;

#[cfg(test)]
mod render_engine_tests;

pub use api::{FrameStats, GpuBackend};
pub use primitives::{Camera, Mesh, MeshId, Vertex};
pub use resources::materials::{Material, PbrParams, PhongParams, ShadingModel};
pub use systems::lighting::{Light, LightType};
pub use backends::HeadlessBackend;
pub use render_engine::{OverlayDraw, RenderEngine};

/// Rendering system errors
///
/// Configuration errors are reported by the call that detects them and the
/// frame is skipped. Resource-creation errors leave the affected feature
/// disabled while the rest of the pipeline keeps running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// `render()` was called without a scene
    #[error("No scene has been set")]
    NoScene,

    /// The scene has no active camera
    #[error("The scene has no active camera")]
    NoCamera,

    /// A feature was enabled before the feature it depends on
    #[error("Cannot enable {feature}: {requires} must be enabled first")]
    MissingPrerequisite {
        /// Feature being enabled
        feature: &'static str,
        /// Feature that has to be enabled first
        requires: &'static str,
    },

    /// A settings block describes an unusable volume or range
    #[error("Invalid {section} settings: {reason}")]
    InvalidSettings {
        /// Settings block that was rejected
        section: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// A per-frame call was made outside `render()` .. `present()`
    #[error("{0} called outside of a frame")]
    NoFrameInProgress(&'static str),

    /// `render()` was called again before `present()`
    #[error("A frame is already in progress")]
    FrameInProgress,

    /// Framebuffer attachments could not be combined into a complete target
    #[error("Framebuffer incomplete: {0}")]
    FramebufferIncomplete(String),

    /// Shader compilation or linking failed
    #[error("Shader compilation failed for {label}: {message}")]
    ShaderCompilation {
        /// Program label
        label: String,
        /// Compiler or linker log
        message: String,
    },

    /// GPU memory allocation failed
    #[error("Out of GPU memory allocating {0} bytes")]
    OutOfMemory(usize),

    /// The swap target no longer matches the surface (transient)
    #[error("Presentation surface is outdated")]
    SurfaceOutdated,

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl RenderError {
    /// Whether the error clears up after a resize
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::SurfaceOutdated)
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
