//! Scene description
//!
//! What the renderer draws each frame: a transform hierarchy whose nodes
//! reference shared meshes and materials, the light list, the active camera
//! and an ambient term. Also hosts the bounding-volume and frustum types the
//! main pass culls with.
//!
//! ## Architecture
//!
//! ```text
//! Scene ── SceneGraph (nodes, world matrices)
//!       ├─ lights
//!       └─ camera ──► Frustum ──► per-node Aabb test
//! ```

mod culling;
mod render_scene;
mod scene_graph;

pub use culling::{world_bounds, Aabb, Frustum, FrustumSide, Plane};
pub use render_scene::Scene;
pub use scene_graph::{Node, NodeId, SceneError, SceneGraph};
