//! Lighting system
//!
//! Light types and their packing into shader uniforms.

pub mod lighting;

pub use lighting::*;
