//! Mesh representation for 3D models
//!
//! A [`Mesh`] is CPU-side geometry: interleaved vertices, optional indices,
//! a primitive topology and a local-space bounding box computed once at
//! construction. Meshes are immutable after construction and shared between
//! scene nodes through `Arc<Mesh>`.
//!
//! Meshes own no GPU state. The renderer's
//! [`MeshCache`](crate::render::resources::MeshCache) maps each mesh's
//! stable [`MeshId`] to its uploaded buffers.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::foundation::math::Vec3;
use crate::render::api::{AttributeFormat, PrimitiveTopology, VertexAttribute, VertexLayout};
use crate::scene::Aabb;

/// 3D vertex data structure for rendering
///
/// # Memory Layout
/// `#[repr(C)]` with only `f32` arrays, so the vertex slice can be uploaded
/// with `bytemuck::cast_slice` and described by [`Vertex::layout`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position in mesh-local space
    pub position: [f32; 3],

    /// Normal vector
    pub normal: [f32; 3],

    /// Texture coordinates
    pub uv: [f32; 2],

    /// Vertex colour (linear RGBA)
    pub color: [f32; 4],

    /// Tangent vector for normal mapping
    pub tangent: [f32; 3],

    /// Bitangent vector for normal mapping
    pub bitangent: [f32; 3],
}

impl Vertex {
    /// Create a white vertex; tangents are filled in by [`Mesh::new`]
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            color: [1.0, 1.0, 1.0, 1.0],
            tangent: [0.0; 3],
            bitangent: [0.0; 3],
        }
    }

    /// Replace the vertex colour
    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    /// Attribute layout shared by every shader that consumes mesh vertices
    ///
    /// Locations: 0 position, 1 normal, 2 uv, 3 colour, 4 tangent, 5 bitangent.
    pub fn layout() -> VertexLayout {
        let mut offset = 0;
        let mut attributes = Vec::with_capacity(6);
        for (location, format) in [
            AttributeFormat::Float3,
            AttributeFormat::Float3,
            AttributeFormat::Float2,
            AttributeFormat::Float4,
            AttributeFormat::Float3,
            AttributeFormat::Float3,
        ]
        .into_iter()
        .enumerate()
        {
            attributes.push(VertexAttribute { location: location as u32, format, offset });
            offset += format.size();
        }
        VertexLayout { stride: std::mem::size_of::<Self>(), attributes }
    }
}

/// Stable identity of a mesh, assigned at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

impl MeshId {
    fn next() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// 3D mesh containing vertices and optional indices
///
/// Cloning a mesh produces a new, distinct mesh with its own [`MeshId`], so
/// the clone gets its own GPU upload.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    name: Option<String>,
    vertices: Vec<Vertex>,
    indices: Option<Vec<u32>>,
    topology: PrimitiveTopology,
    local_bounds: Option<Aabb>,
}

impl Clone for Mesh {
    fn clone(&self) -> Self {
        Self {
            id: MeshId::next(),
            name: self.name.clone(),
            vertices: self.vertices.clone(),
            indices: self.indices.clone(),
            topology: self.topology,
            local_bounds: self.local_bounds,
        }
    }
}

impl Mesh {
    /// Create a triangle mesh, computing tangents and the local bounding box
    pub fn new(vertices: Vec<Vertex>, indices: Option<Vec<u32>>) -> Self {
        Self::with_topology(vertices, indices, PrimitiveTopology::Triangles)
    }

    /// Create a mesh with an explicit topology
    ///
    /// Tangents are only derived for triangle meshes.
    pub fn with_topology(
        mut vertices: Vec<Vertex>,
        indices: Option<Vec<u32>>,
        topology: PrimitiveTopology,
    ) -> Self {
        if topology == PrimitiveTopology::Triangles {
            compute_tangents(&mut vertices, indices.as_deref());
        }
        let local_bounds = Aabb::from_points(vertices.iter().map(|v| Vec3::from(v.position)));

        Self {
            id: MeshId::next(),
            name: None,
            vertices,
            indices,
            topology,
            local_bounds,
        }
    }

    /// Attach a debug name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Stable identity used as the GPU cache key
    pub fn id(&self) -> MeshId {
        self.id
    }

    /// Debug name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Vertex data
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Index data, if the mesh is indexed
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// Primitive topology
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Bounding box in mesh-local space (`None` for an empty mesh)
    pub fn local_bounds(&self) -> Option<Aabb> {
        self.local_bounds
    }

    /// Number of elements a draw consumes (indices if indexed, else vertices)
    pub fn element_count(&self) -> u32 {
        self.indices.as_ref().map_or(self.vertices.len(), Vec::len) as u32
    }

    /// Axis-aligned box spanning `[-half, half]` on each axis, 24 vertices
    pub fn cube(half: f32) -> Self {
        // (normal, u axis, v axis) per face
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u_axis, v_axis) in faces {
            let (n, u, v) = (Vec3::from(normal), Vec3::from(u_axis), Vec3::from(v_axis));
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (n + u * su + v * sv) * half;
                vertices.push(Vertex::new(p.into(), normal, [(su + 1.0) * 0.5, (sv + 1.0) * 0.5]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self::new(vertices, Some(indices)).with_name("cube")
    }

    /// Flat plane in XZ facing +Y, `size_x` by `size_z` units, UVs tiled by `uv_scale`
    pub fn plane(size_x: f32, size_z: f32, uv_scale: f32) -> Self {
        let (hx, hz) = (size_x * 0.5, size_z * 0.5);
        let up = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex::new([-hx, 0.0, hz], up, [0.0, 0.0]),
            Vertex::new([hx, 0.0, hz], up, [uv_scale, 0.0]),
            Vertex::new([hx, 0.0, -hz], up, [uv_scale, uv_scale]),
            Vertex::new([-hx, 0.0, -hz], up, [0.0, uv_scale]),
        ];
        Self::new(vertices, Some(vec![0, 1, 2, 2, 3, 0])).with_name("plane")
    }
}

/// Derive per-vertex tangents and bitangents from positions and UVs
///
/// Triangles whose UV mapping has (near) zero area contribute nothing.
/// Vertices left without any contribution get an arbitrary frame
/// perpendicular to their normal.
fn compute_tangents(vertices: &mut [Vertex], indices: Option<&[u32]>) {
    let triangle_count = indices.map_or(vertices.len(), <[u32]>::len) / 3;
    let mut tangents = vec![Vec3::zeros(); vertices.len()];
    let mut bitangents = vec![Vec3::zeros(); vertices.len()];

    for t in 0..triangle_count {
        let corner = |k: usize| indices.map_or(t * 3 + k, |idx| idx[t * 3 + k] as usize);
        let (i0, i1, i2) = (corner(0), corner(1), corner(2));
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            log::warn!("Triangle {} references a vertex out of range, skipping tangents", t);
            continue;
        }

        let (v0, v1, v2) = (&vertices[i0], &vertices[i1], &vertices[i2]);
        let e1 = Vec3::from(v1.position) - Vec3::from(v0.position);
        let e2 = Vec3::from(v2.position) - Vec3::from(v0.position);
        let (du1, dv1) = (v1.uv[0] - v0.uv[0], v1.uv[1] - v0.uv[1]);
        let (du2, dv2) = (v2.uv[0] - v0.uv[0], v2.uv[1] - v0.uv[1]);

        let det = du1 * dv2 - du2 * dv1;
        if det.abs() < 1e-8 {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (e1 * dv2 - e2 * dv1) * r;
        let bitangent = (e2 * du1 - e1 * du2) * r;

        for i in [i0, i1, i2] {
            tangents[i] += tangent;
            bitangents[i] += bitangent;
        }
    }

    for (i, vertex) in vertices.iter_mut().enumerate() {
        let normal = Vec3::from(vertex.normal);
        // Gram-Schmidt against the normal
        let mut tangent = tangents[i] - normal * normal.dot(&tangents[i]);
        if tangent.norm_squared() < 1e-12 {
            let axis = if normal.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
            tangent = axis - normal * normal.dot(&axis);
        }
        let tangent = tangent.try_normalize(1e-12).unwrap_or_else(Vec3::x);

        let mut bitangent = normal.cross(&tangent);
        if bitangents[i].dot(&bitangent) < 0.0 {
            bitangent = -bitangent;
        }

        vertex.tangent = tangent.into();
        vertex.bitangent = bitangent.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_bounds_and_counts() {
        let cube = Mesh::cube(1.0);
        assert_eq!(cube.vertices().len(), 24);
        assert_eq!(cube.element_count(), 36);

        let bounds = cube.local_bounds().unwrap();
        assert_relative_eq!(bounds.min, Vec3::new(-1.0, -1.0, -1.0));
        assert_relative_eq!(bounds.max, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_mesh_ids_are_unique_across_clones() {
        let a = Mesh::plane(2.0, 2.0, 1.0);
        let b = a.clone();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.vertices(), b.vertices());
    }

    #[test]
    fn test_plane_tangents_follow_u_axis() {
        let plane = Mesh::plane(4.0, 4.0, 1.0);
        for v in plane.vertices() {
            assert_relative_eq!(Vec3::from(v.tangent), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);
            assert_relative_eq!(Vec3::from(v.bitangent), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_degenerate_uvs_produce_finite_tangents() {
        // All UVs identical: zero-area UV triangle
        let vertices = vec![
            Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.5, 0.5]),
            Vertex::new([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.5, 0.5]),
            Vertex::new([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.5, 0.5]),
        ];
        let mesh = Mesh::new(vertices, None);
        for v in mesh.vertices() {
            assert!(v.tangent.iter().chain(v.bitangent.iter()).all(|c| c.is_finite()));
            assert_relative_eq!(Vec3::from(v.tangent).norm(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(Vec3::from(v.tangent).dot(&Vec3::from(v.normal)), 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_vertex_layout_matches_struct() {
        let layout = Vertex::layout();
        assert_eq!(layout.stride, 72);
        assert_eq!(layout.attributes.len(), 6);
        assert_eq!(layout.attributes[5].offset, 60);
    }

    #[test]
    fn test_empty_mesh_has_no_bounds() {
        let mesh = Mesh::new(Vec::new(), None);
        assert!(mesh.local_bounds().is_none());
        assert_eq!(mesh.element_count(), 0);
    }
}
