//! Per-frame rendering statistics
//!
//! Filled in by the render engine while a frame is recorded and returned
//! from `render()`; `present()` adds the post-process and overlay draws.

/// Counters for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame index since engine creation
    pub frame_index: u64,
    /// Main-pass draw calls (instanced batches count once)
    pub draw_calls: u32,
    /// Draw calls that went through the instanced path
    pub instanced_draws: u32,
    /// Nodes drawn as part of an instanced batch
    pub instances_drawn: u32,
    /// Mesh nodes rejected by frustum culling
    pub culled_nodes: u32,
    /// Draw calls issued into the shadow map
    pub shadow_casters: u32,
    /// Whether the main pass sampled a valid shadow map this frame
    pub shadows_active: bool,
    /// Meshes left out of this frame because their upload failed
    pub skipped_meshes: u32,
    /// Primitives submitted by the main pass
    pub primitives: u64,
    /// Full-screen post-process passes executed at present
    pub post_process_passes: u32,
    /// Overlay draws flushed at present
    pub overlay_draws: u32,
}

impl FrameStats {
    /// Start counting a new frame
    pub fn new(frame_index: u64) -> Self {
        Self { frame_index, ..Default::default() }
    }
}
