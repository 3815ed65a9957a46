//! # Rust Renderer
//!
//! A multi-pass real-time 3D scene renderer over an abstract GPU backend.
//!
//! ## Features
//!
//! - **Scene Graph**: Cached hierarchical transforms with dirty propagation
//! - **Frustum Culling**: World-space AABB against the camera frustum
//! - **Mesh Cache & Instancing**: Lazy uploads, grow-only instance buffers
//! - **Shadows**: Directional shadow map with 3x3 PCF
//! - **Post-Processing**: SSAO, bloom and exponential tone mapping on an HDR target
//! - **Backend Agnostic**: Everything talks to the `GpuBackend` trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rust_renderer::prelude::*;
//!
//! fn main() -> Result<(), RenderError> {
//!     let mut scene = Scene::new();
//!     scene.set_camera(Camera::perspective(Vec3::new(0.0, 2.0, 6.0), 60.0, 16.0 / 9.0, 0.1, 100.0));
//!     scene.add_light(Light::directional(Vec3::new(-0.4, -1.0, -0.3), Vec3::repeat(1.0), 3.0));
//!
//!     let cube = scene.graph_mut().create_node("cube");
//!     scene.graph_mut().set_mesh(cube, Some(Arc::new(Mesh::cube(1.0)))).ok();
//!
//!     let mut engine = RenderEngine::new(HeadlessBackend::new(1280, 720), RendererConfig::default())?;
//!     engine.set_scene(scene);
//!     engine.enable_shadows(2048)?;
//!
//!     engine.render()?;
//!     engine.present()?;
//!     engine.destroy();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::must_use_candidate
)]

pub mod core;
pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        core::config::{RendererConfig, ShadowSettings, SsaoSettings, BloomSettings, ToneMapSettings},
        foundation::math::{Vec3, Mat4, Quat, Transform},
        render::{
            Camera, FrameStats, GpuBackend, HeadlessBackend, Light, LightType, Material, Mesh,
            OverlayDraw, PbrParams, PhongParams, RenderEngine, RenderError, RenderResult, ShadingModel,
        },
        scene::{Aabb, Frustum, NodeId, Scene, SceneGraph},
    };
}
