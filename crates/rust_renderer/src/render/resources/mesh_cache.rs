//! GPU mesh cache
//!
//! Maps each [`MeshId`] to the buffers holding that mesh on the GPU. Uploads
//! happen lazily on first use and never repeat; each mesh also owns an
//! optional per-instance buffer that only ever grows.
//!
//! The cache is mutated from the rendering thread only. Sharing it across
//! threads would need a lock around every call.

use std::collections::HashMap;

use crate::render::api::{
    BufferHandle, BufferKind, DrawCall, GpuBackend, PrimitiveTopology, VertexLayout,
};
use crate::render::primitives::{Mesh, MeshId, Vertex};
use crate::render::systems::instancing::InstanceData;
use crate::render::{RenderError, RenderResult};

/// Per-mesh instance storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceBuffer {
    /// Backend buffer
    pub buffer: BufferHandle,
    /// Instances the buffer holds without reallocating
    pub capacity: usize,
}

/// Uploaded state of one mesh
#[derive(Debug, Clone, PartialEq)]
pub struct GpuMesh {
    /// Interleaved vertex data
    pub vertex_buffer: BufferHandle,
    /// u32 indices, if the mesh is indexed
    pub index_buffer: Option<BufferHandle>,
    /// Number of vertices
    pub vertex_count: u32,
    /// Number of indices
    pub index_count: Option<u32>,
    /// Primitive assembly mode
    pub topology: PrimitiveTopology,
    /// Attribute layout of `vertex_buffer`
    pub layout: VertexLayout,
    /// Instance data storage, allocated on the first instanced draw
    pub instances: Option<InstanceBuffer>,
}

impl GpuMesh {
    /// Draw call covering the whole mesh `instance_count` times
    pub fn draw_call(&self, instance_count: u32) -> DrawCall {
        DrawCall {
            topology: self.topology,
            vertex_count: self.vertex_count,
            index_count: self.index_count,
            instance_count,
        }
    }

    /// Bind vertex and index buffers for drawing
    pub fn bind(&self, backend: &mut dyn GpuBackend) {
        backend.bind_vertex_buffers(self.vertex_buffer, &self.layout, self.index_buffer);
    }

    fn destroy(self, backend: &mut dyn GpuBackend) {
        backend.destroy_buffer(self.vertex_buffer);
        if let Some(index) = self.index_buffer {
            backend.destroy_buffer(index);
        }
        if let Some(instances) = self.instances {
            backend.destroy_buffer(instances.buffer);
        }
    }
}

/// Mesh identity to GPU buffers
#[derive(Debug, Default)]
pub struct MeshCache {
    entries: HashMap<MeshId, GpuMesh>,
    uploads: u64,
    instance_reallocations: u64,
}

impl MeshCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of meshes resident on the GPU
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no mesh is resident
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mesh uploads performed over the cache's lifetime
    pub fn upload_count(&self) -> u64 {
        self.uploads
    }

    /// Times an existing instance buffer was replaced by a larger one
    pub fn instance_reallocations(&self) -> u64 {
        self.instance_reallocations
    }

    /// Cached state of a mesh, if uploaded
    pub fn get(&self, id: MeshId) -> Option<&GpuMesh> {
        self.entries.get(&id)
    }

    /// Upload `mesh` on first use and return its GPU state
    ///
    /// Later calls return the cached entry without touching the backend.
    pub fn ensure_uploaded(&mut self, backend: &mut dyn GpuBackend, mesh: &Mesh) -> RenderResult<&GpuMesh> {
        if !self.entries.contains_key(&mesh.id()) {
            let gpu = Self::upload(backend, mesh)?;
            self.uploads += 1;
            log::debug!(
                "Uploaded mesh {:?} ({}) with {} vertices",
                mesh.id(),
                mesh.name().unwrap_or("unnamed"),
                gpu.vertex_count
            );
            self.entries.insert(mesh.id(), gpu);
        }
        self.entries
            .get(&mesh.id())
            .ok_or_else(|| RenderError::Backend(format!("mesh {:?} missing from cache", mesh.id())))
    }

    fn upload(backend: &mut dyn GpuBackend, mesh: &Mesh) -> RenderResult<GpuMesh> {
        if mesh.vertices().is_empty() {
            return Err(RenderError::Backend(format!("mesh {:?} has no vertices", mesh.id())));
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(mesh.vertices());
        let vertex_buffer = backend.create_buffer(BufferKind::Vertex, vertex_bytes.len())?;
        if let Err(e) = backend.upload_buffer(vertex_buffer, 0, vertex_bytes) {
            backend.destroy_buffer(vertex_buffer);
            return Err(e);
        }

        let index_buffer = match mesh.indices().filter(|i| !i.is_empty()) {
            Some(indices) => {
                let index_bytes: &[u8] = bytemuck::cast_slice(indices);
                let uploaded = backend
                    .create_buffer(BufferKind::Index, index_bytes.len())
                    .and_then(|buffer| match backend.upload_buffer(buffer, 0, index_bytes) {
                        Ok(()) => Ok(buffer),
                        Err(e) => {
                            backend.destroy_buffer(buffer);
                            Err(e)
                        }
                    });
                match uploaded {
                    Ok(buffer) => Some(buffer),
                    Err(e) => {
                        backend.destroy_buffer(vertex_buffer);
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        Ok(GpuMesh {
            vertex_buffer,
            index_buffer,
            vertex_count: mesh.vertices().len() as u32,
            index_count: index_buffer.and(mesh.indices()).map(|i| i.len() as u32),
            topology: mesh.topology(),
            layout: Vertex::layout(),
            instances: None,
        })
    }

    /// Write instance data for an uploaded mesh and return the buffer holding it
    ///
    /// Storage grows to exactly `data.len()` instances when too small and is
    /// overwritten in place otherwise; it never shrinks.
    pub fn upload_instances(
        &mut self,
        backend: &mut dyn GpuBackend,
        mesh: MeshId,
        data: &[InstanceData],
    ) -> RenderResult<BufferHandle> {
        let entry = self
            .entries
            .get_mut(&mesh)
            .ok_or_else(|| RenderError::Backend(format!("instance upload for non-resident mesh {:?}", mesh)))?;
        if data.is_empty() {
            return Err(RenderError::Backend("instance upload with no instances".to_string()));
        }

        let needed = data.len();
        let current = entry.instances;
        let buffer = match current {
            Some(existing) if existing.capacity >= needed => existing.buffer,
            previous => {
                let buffer = backend.create_buffer(BufferKind::Instance, needed * InstanceData::SIZE)?;
                if let Some(old) = previous {
                    backend.destroy_buffer(old.buffer);
                    self.instance_reallocations += 1;
                    log::debug!(
                        "Grew instance buffer of mesh {:?} from {} to {} instances",
                        mesh,
                        old.capacity,
                        needed
                    );
                }
                entry.instances = Some(InstanceBuffer { buffer, capacity: needed });
                buffer
            }
        };

        backend.upload_buffer(buffer, 0, bytemuck::cast_slice(data))?;
        Ok(buffer)
    }

    /// Free a mesh's buffers; returns whether it was resident
    pub fn release_mesh(&mut self, backend: &mut dyn GpuBackend, mesh: MeshId) -> bool {
        match self.entries.remove(&mesh) {
            Some(gpu) => {
                gpu.destroy(backend);
                log::debug!("Released GPU buffers of mesh {:?}", mesh);
                true
            }
            None => false,
        }
    }

    /// Free every resident mesh
    pub fn release_all(&mut self, backend: &mut dyn GpuBackend) {
        let count = self.entries.len();
        for (_, gpu) in self.entries.drain() {
            gpu.destroy(backend);
        }
        if count > 0 {
            log::debug!("Released {} cached meshes", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4;
    use crate::render::backends::HeadlessBackend;

    fn instances(count: usize) -> Vec<InstanceData> {
        vec![InstanceData::new(&Mat4::identity(), &Mat4::identity()); count]
    }

    #[test]
    fn test_ensure_uploaded_is_idempotent() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut cache = MeshCache::new();
        let mesh = Mesh::cube(1.0);

        let first = cache.ensure_uploaded(&mut backend, &mesh).unwrap().clone();
        let second = cache.ensure_uploaded(&mut backend, &mesh).unwrap().clone();

        assert_eq!(first, second);
        assert_eq!(cache.upload_count(), 1);
        assert_eq!(backend.buffers_created(BufferKind::Vertex), 1);
        assert_eq!(backend.upload_count(first.vertex_buffer), 1);
        assert_eq!(first.index_count, Some(36));
    }

    #[test]
    fn test_cloned_mesh_is_uploaded_separately() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut cache = MeshCache::new();
        let mesh = Mesh::cube(1.0);
        let copy = mesh.clone();

        cache.ensure_uploaded(&mut backend, &mesh).unwrap();
        cache.ensure_uploaded(&mut backend, &copy).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_instance_buffer_grows_only() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut cache = MeshCache::new();
        let mesh = Mesh::cube(1.0);
        cache.ensure_uploaded(&mut backend, &mesh).unwrap();

        let a = cache.upload_instances(&mut backend, mesh.id(), &instances(5)).unwrap();
        assert_eq!(cache.instance_reallocations(), 0);

        let b = cache.upload_instances(&mut backend, mesh.id(), &instances(50)).unwrap();
        assert_eq!(cache.instance_reallocations(), 1);
        assert_ne!(a, b);
        assert_eq!(backend.buffer_size(b), Some(50 * InstanceData::SIZE));

        let c = cache.upload_instances(&mut backend, mesh.id(), &instances(5)).unwrap();
        assert_eq!(cache.instance_reallocations(), 1);
        assert_eq!(b, c);
        assert_eq!(cache.get(mesh.id()).unwrap().instances.unwrap().capacity, 50);
        assert_eq!(backend.live_buffers(BufferKind::Instance), 1);
    }

    #[test]
    fn test_release_is_idempotent_and_frees_everything() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut cache = MeshCache::new();
        let mesh = Mesh::cube(1.0);
        cache.ensure_uploaded(&mut backend, &mesh).unwrap();
        cache.upload_instances(&mut backend, mesh.id(), &instances(3)).unwrap();
        assert_eq!(backend.live_handle_count(), 3);

        assert!(cache.release_mesh(&mut backend, mesh.id()));
        assert!(!cache.release_mesh(&mut backend, mesh.id()));
        assert_eq!(backend.live_handle_count(), 0);
    }

    #[test]
    fn test_empty_mesh_is_rejected() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut cache = MeshCache::new();
        let mesh = Mesh::new(Vec::new(), None);

        assert!(cache.ensure_uploaded(&mut backend, &mesh).is_err());
        assert!(cache.is_empty());
        assert_eq!(backend.live_handle_count(), 0);
    }
}
