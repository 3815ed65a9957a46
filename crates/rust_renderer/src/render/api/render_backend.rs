//! Backend abstraction traits for the rendering system
//!
//! This module defines the capability set every GPU backend must provide to
//! the render passes: framebuffer, texture, buffer and program lifetime,
//! state binding, draw submission and presentation. Nothing here is tied to
//! a particular graphics API; an OpenGL, Vulkan, Metal or D3D backend maps
//! these calls onto its own objects.
//!
//! All calls are made from the single rendering thread, in program order.

use bitflags::bitflags;

use crate::render::RenderError;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Handle to a GPU buffer (vertex, index, instance or uniform storage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// Handle to a GPU texture (framebuffer attachment or sampled image)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// Handle to an off-screen render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferHandle(pub u64);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u64);

/// What a buffer is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex attribute data
    Vertex,
    /// Triangle/line indices (u32)
    Index,
    /// Per-instance attribute data
    Instance,
}

/// Texel formats used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit normalized RGBA (display / LDR)
    Rgba8,
    /// Half-float RGBA (HDR colour)
    Rgba16F,
    /// 32-bit float RG (SSAO rotation noise)
    Rg32F,
    /// Single-channel half float (occlusion factor)
    R16F,
    /// 24-bit depth
    Depth24,
    /// 32-bit float depth
    Depth32F,
}

impl TextureFormat {
    /// Whether this is a depth format
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth24 | Self::Depth32F)
    }

    /// Size of one texel in bytes
    pub fn bytes_per_texel(self) -> usize {
        match self {
            Self::Rgba8 | Self::Depth24 | Self::Depth32F => 4,
            Self::Rgba16F | Self::Rg32F => 8,
            Self::R16F => 2,
        }
    }
}

/// Texture sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    Linear,
    /// Hardware depth comparison (shadow sampler)
    Comparison,
}

/// Texture addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    /// Clamp to the edge texel
    ClampToEdge,
    /// Clamp to a border value of 1.0 (depth maps: outside reads as "lit")
    ClampToBorderWhite,
    /// Tile
    Repeat,
}

/// Description of a standalone texture
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    /// Debug label
    pub label: String,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: TextureFormat,
    /// Sampling filter
    pub filter: TextureFilter,
    /// Addressing mode
    pub wrap: TextureWrap,
}

/// Description of a framebuffer and its attachments
#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferDesc {
    /// Debug label
    pub label: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Colour attachment format, if any
    pub color: Option<TextureFormat>,
    /// Depth attachment format, if any
    pub depth: Option<TextureFormat>,
    /// Sampling filter for the attachments when read by later passes
    pub filter: TextureFilter,
    /// Addressing mode for the attachments when read by later passes
    pub wrap: TextureWrap,
}

/// A created framebuffer with its attachment textures
///
/// The attachments are owned by the framebuffer; destroying the framebuffer
/// destroys them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    /// Backend handle
    pub handle: FramebufferHandle,
    /// Colour attachment texture
    pub color: Option<TextureHandle>,
    /// Depth attachment texture
    pub depth: Option<TextureHandle>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Framebuffer {
    /// Viewport covering the whole framebuffer
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }
}

/// Render target viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Left edge
    pub x: u32,
    /// Bottom edge
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Viewport {
    /// Viewport anchored at the origin
    pub fn new(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

bitflags! {
    /// Attachments to clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Colour attachment
        const COLOR = 0b01;
        /// Depth attachment
        const DEPTH = 0b10;
    }
}

/// Rasterization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Filled triangles
    #[default]
    Fill,
    /// Triangle edges only
    Wireframe,
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent triangles
    #[default]
    Triangles,
    /// Independent line segments
    Lines,
    /// Points
    Points,
}

/// Source of a shader program
///
/// Sources are GLSL; backends for other APIs are expected to cross-compile.
/// Each `(name, value)` define is injected as `#define name value` right after
/// the `#version` line of both stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    /// Debug label
    pub label: &'static str,
    /// Vertex stage source
    pub vertex: &'static str,
    /// Fragment stage source
    pub fragment: &'static str,
    /// Preprocessor defines
    pub defines: Vec<(&'static str, String)>,
}

impl ShaderSource {
    /// Create a program source without defines
    pub fn new(label: &'static str, vertex: &'static str, fragment: &'static str) -> Self {
        Self { label, vertex, fragment, defines: Vec::new() }
    }

    /// Add a preprocessor define
    pub fn with_define(mut self, name: &'static str, value: impl ToString) -> Self {
        self.defines.push((name, value.to_string()));
        self
    }
}

/// Value of a shader uniform
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// Signed integer (also used for booleans and sampler slots)
    Int(i32),
    /// Float
    Float(f32),
    /// 2-component vector
    Vec2([f32; 2]),
    /// 3-component vector
    Vec3([f32; 3]),
    /// 4-component vector
    Vec4([f32; 4]),
    /// 4x4 matrix, column-major
    Mat4([f32; 16]),
    /// Array of floats
    FloatArray(Vec<f32>),
    /// Array of 3-component vectors
    Vec3Array(Vec<[f32; 3]>),
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        Self::Int(i32::from(value))
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<&crate::foundation::math::Mat4> for UniformValue {
    fn from(value: &crate::foundation::math::Mat4) -> Self {
        Self::Mat4(crate::foundation::math::utils::mat4_to_cols(value))
    }
}

impl From<crate::foundation::math::Vec3> for UniformValue {
    fn from(value: crate::foundation::math::Vec3) -> Self {
        Self::Vec3([value.x, value.y, value.z])
    }
}

/// Scalar type of a vertex attribute component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    /// Two floats
    Float2,
    /// Three floats
    Float3,
    /// Four floats
    Float4,
}

impl AttributeFormat {
    /// Size in bytes
    pub fn size(self) -> usize {
        match self {
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
        }
    }
}

/// One attribute inside an interleaved buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader attribute location
    pub location: u32,
    /// Component layout
    pub format: AttributeFormat,
    /// Byte offset inside one element
    pub offset: usize,
}

/// Layout of an interleaved vertex or instance buffer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Size of one element in bytes
    pub stride: usize,
    /// Attributes inside one element
    pub attributes: Vec<VertexAttribute>,
}

/// One draw submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// Primitive assembly mode
    pub topology: PrimitiveTopology,
    /// Vertices to draw (non-indexed draws)
    pub vertex_count: u32,
    /// Indices to draw; `Some` selects the indexed path
    pub index_count: Option<u32>,
    /// Instances to draw; values above 1 select the instanced path
    pub instance_count: u32,
}

impl DrawCall {
    /// A full-screen triangle with no vertex input bound
    pub fn fullscreen_triangle() -> Self {
        Self {
            topology: PrimitiveTopology::Triangles,
            vertex_count: 3,
            index_count: None,
            instance_count: 1,
        }
    }

    /// Whether this call draws more than one instance
    pub fn is_instanced(&self) -> bool {
        self.instance_count > 1
    }

    /// Number of primitives this call assembles across all instances
    pub fn primitive_count(&self) -> u64 {
        let elements = u64::from(self.index_count.unwrap_or(self.vertex_count));
        let per_instance = match self.topology {
            PrimitiveTopology::Triangles => elements / 3,
            PrimitiveTopology::Lines => elements / 2,
            PrimitiveTopology::Points => elements,
        };
        per_instance * u64::from(self.instance_count)
    }
}

/// GPU backend capability set
///
/// Every render pass talks to the GPU through this trait, receiving the
/// backend explicitly as `&mut dyn GpuBackend`; there is no global device.
///
/// Creation calls report failure (incomplete framebuffer, shader compile
/// error, out of memory) as a [`RenderError`] so the caller can keep the
/// affected feature disabled. Destroy calls on unknown handles are no-ops.
pub trait GpuBackend {
    /// Human readable backend name for logging
    fn name(&self) -> &str;

    /// Current drawable surface size in pixels
    fn surface_size(&self) -> (u32, u32);

    /// Create a framebuffer with the requested attachments
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> BackendResult<Framebuffer>;

    /// Destroy a framebuffer and its attachments
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Create a texture, optionally initialised with tightly packed texel data
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> BackendResult<TextureHandle>;

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Allocate a buffer of `size` bytes
    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> BackendResult<BufferHandle>;

    /// Free a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Write `data` into a buffer starting at `offset` bytes
    fn upload_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> BackendResult<()>;

    /// Compile and link a shader program
    fn create_program(&mut self, source: &ShaderSource) -> BackendResult<ProgramHandle>;

    /// Destroy a shader program
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Bind a render target (`None` is the display surface) and viewport
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>, viewport: Viewport);

    /// Clear attachments of the bound render target
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32);

    /// Set rasterization mode
    fn set_polygon_mode(&mut self, mode: PolygonMode);

    /// Enable or disable depth testing and writing
    fn set_depth_test(&mut self, enabled: bool);

    /// Make a program current
    fn bind_program(&mut self, program: ProgramHandle);

    /// Set a uniform on the current program
    fn set_uniform(&mut self, name: &str, value: UniformValue);

    /// Bind a texture to a sampler slot (`None` unbinds)
    fn bind_texture(&mut self, slot: u32, texture: Option<TextureHandle>);

    /// Bind vertex and optional index buffers for subsequent draws
    fn bind_vertex_buffers(&mut self, vertex: BufferHandle, layout: &VertexLayout, index: Option<BufferHandle>);

    /// Bind or unbind the per-instance attribute buffer
    fn bind_instance_buffer(&mut self, instance: Option<(BufferHandle, &VertexLayout)>);

    /// Unbind all vertex input (full-screen passes generate vertices in the shader)
    fn unbind_vertex_input(&mut self);

    /// Submit a draw
    fn draw(&mut self, call: &DrawCall) -> BackendResult<()>;

    /// Present the display surface
    ///
    /// Returns [`RenderError::SurfaceOutdated`] when the swap target no longer
    /// matches the surface; the caller recovers by resizing.
    fn present(&mut self) -> BackendResult<()>;
}
