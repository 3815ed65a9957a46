//! Instance Renderer
//!
//! Draws one mesh N times with a single call. Per-instance matrices are
//! computed on the CPU, uploaded into the mesh's grow-only instance buffer
//! held by the [`MeshCache`], and read by the `INSTANCED` variant of the
//! forward program through vertex attributes.
//!
//! ```text
//! world transforms → InstanceData[] → MeshCache instance buffer → draw(N)
//! ```

use crate::foundation::math::{utils, Mat4};
use crate::render::api::{AttributeFormat, DrawCall, GpuBackend, VertexAttribute, VertexLayout};
use crate::render::primitives::Mesh;
use crate::render::resources::materials::Material;
use crate::render::resources::MeshCache;
use crate::render::systems::forward::{ForwardPass, FrameUniforms};
use crate::render::RenderResult;

/// First attribute location used by instance data (after the six vertex attributes)
pub const FIRST_INSTANCE_LOCATION: u32 = 6;

/// Instance data structure for GPU upload
///
/// 32 floats: clip-space matrix then model matrix, both column-major.
/// Must match the `INSTANCED` attribute layout of `forward.vert`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceData {
    /// `projection * view * model`
    pub mvp: [f32; 16],
    /// Model (world) matrix
    pub model: [f32; 16],
}

impl InstanceData {
    /// Size of one instance in bytes
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Build the instance for one world transform
    pub fn new(view_projection: &Mat4, model: &Mat4) -> Self {
        Self {
            mvp: utils::mat4_to_cols(&(view_projection * model)),
            model: utils::mat4_to_cols(model),
        }
    }

    /// Attribute layout: eight `vec4` columns starting at [`FIRST_INSTANCE_LOCATION`]
    pub fn layout() -> VertexLayout {
        let attributes = (0..8u32)
            .map(|column| VertexAttribute {
                location: FIRST_INSTANCE_LOCATION + column,
                format: AttributeFormat::Float4,
                offset: column as usize * AttributeFormat::Float4.size(),
            })
            .collect();
        VertexLayout { stride: Self::SIZE, attributes }
    }
}

/// Builds instance data and issues instanced draws
#[derive(Debug)]
pub struct InstanceRenderer {
    /// Reused between draws to avoid reallocating every frame
    scratch: Vec<InstanceData>,
    layout: VertexLayout,
}

impl Default for InstanceRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRenderer {
    /// Create an instance renderer
    pub fn new() -> Self {
        Self {
            scratch: Vec::new(),
            layout: InstanceData::layout(),
        }
    }

    /// Per-instance data for `models` under one camera
    pub fn build(&mut self, view_projection: &Mat4, models: &[Mat4]) -> &[InstanceData] {
        self.scratch.clear();
        self.scratch
            .extend(models.iter().map(|model| InstanceData::new(view_projection, model)));
        &self.scratch
    }

    /// Draw `mesh` once per entry of `models` with a single call
    ///
    /// Uploads the mesh on first use. Returns `None` when `models` is empty.
    pub fn draw(
        &mut self,
        backend: &mut dyn GpuBackend,
        cache: &mut MeshCache,
        forward: &mut ForwardPass,
        frame: &FrameUniforms,
        mesh: &Mesh,
        material: &Material,
        models: &[Mat4],
    ) -> RenderResult<Option<DrawCall>> {
        if models.is_empty() {
            return Ok(None);
        }

        cache.ensure_uploaded(backend, mesh)?;
        self.build(&frame.view_projection, models);
        let instance_buffer = cache.upload_instances(backend, mesh.id(), &self.scratch)?;

        forward.bind_material(backend, frame, material, true)?;

        let call = match cache.get(mesh.id()) {
            Some(gpu) => {
                gpu.bind(backend);
                gpu.draw_call(models.len() as u32)
            }
            None => return Ok(None),
        };
        backend.bind_instance_buffer(Some((instance_buffer, &self.layout)));
        let result = backend.draw(&call);
        backend.bind_instance_buffer(None);
        result?;

        log::trace!("Instanced draw of {} x {:?}", models.len(), mesh.id());
        Ok(Some(call))
    }
}
