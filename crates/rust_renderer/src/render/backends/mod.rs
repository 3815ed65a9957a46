//! Backend implementations for the render module
//!
//! Only the in-memory headless backend ships with the crate; window-system
//! backends implement [`GpuBackend`](crate::render::api::GpuBackend) outside it.

pub mod headless;

pub use headless::{HeadlessBackend, HeadlessCounters, RecordedDraw};
