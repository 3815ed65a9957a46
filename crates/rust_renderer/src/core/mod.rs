//! # Core Renderer Module
//!
//! Shared configuration used by every render pass.
//!
//! ## Organization
//!
//! - **Config**: Renderer settings (culling, shadows, SSAO, bloom, tone mapping)

pub mod config;

pub use config::{
    RendererConfig,
    ShadowSettings,
    SsaoSettings,
    BloomSettings,
    ToneMapSettings,
    Config,
    ConfigError,
};
