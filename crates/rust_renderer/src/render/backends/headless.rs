//! Headless GPU backend
//!
//! Implements [`GpuBackend`] entirely in memory. Nothing is rasterized;
//! instead every call is validated the way a driver would reject it
//! (unknown handles, out-of-bounds uploads, incomplete framebuffers, draws
//! without the required bindings) and recorded so callers can inspect what
//! a frame submitted.
//!
//! Used for offscreen tooling, the demo application and as the call-counting
//! double in tests. Failures can be injected to exercise recovery paths.

use std::collections::HashMap;

use crate::render::api::{
    BackendResult, BufferHandle, BufferKind, ClearFlags, DrawCall, Framebuffer, FramebufferDesc,
    FramebufferHandle, GpuBackend, PolygonMode, ProgramHandle, ShaderSource, TextureDesc,
    TextureHandle, UniformValue, VertexLayout, Viewport,
};
use crate::render::RenderError;

#[derive(Debug, Clone, Copy)]
struct BufferRecord {
    kind: BufferKind,
    size: usize,
}

#[derive(Debug, Clone, Copy)]
struct TextureRecord {
    owner: Option<FramebufferHandle>,
    bytes: usize,
}

/// One submitted draw as seen by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    /// Render target (`None` is the display surface)
    pub framebuffer: Option<FramebufferHandle>,
    /// Program that was current
    pub program: ProgramHandle,
    /// Label of that program
    pub program_label: &'static str,
    /// Polygon mode at submission time
    pub polygon_mode: PolygonMode,
    /// The call itself
    pub call: DrawCall,
}

/// Operation counters
#[derive(Debug, Clone, Default)]
pub struct HeadlessCounters {
    /// Buffer allocations per kind
    pub buffers_created: HashMap<BufferKind, u64>,
    /// Upload calls per buffer
    pub uploads: HashMap<BufferHandle, u64>,
    /// Total bytes written by uploads
    pub bytes_uploaded: u64,
    /// Framebuffers created over the backend's lifetime
    pub framebuffers_created: u64,
    /// Programs compiled over the backend's lifetime
    pub programs_created: u64,
    /// Clear calls
    pub clears: u64,
    /// Successful presents
    pub presents: u64,
    /// Uniform writes
    pub uniform_writes: u64,
}

/// Pending injected failures, each consumed by the next matching call
#[derive(Debug, Clone, Copy, Default)]
struct InjectedFailures {
    framebuffer: bool,
    program: bool,
    buffer: bool,
    surface_outdated: bool,
}

/// In-memory [`GpuBackend`]
#[derive(Debug)]
pub struct HeadlessBackend {
    surface: (u32, u32),
    next_handle: u64,
    buffers: HashMap<BufferHandle, BufferRecord>,
    textures: HashMap<TextureHandle, TextureRecord>,
    framebuffers: HashMap<FramebufferHandle, Framebuffer>,
    programs: HashMap<ProgramHandle, &'static str>,

    bound_framebuffer: Option<FramebufferHandle>,
    viewport: Viewport,
    polygon_mode: PolygonMode,
    depth_test: bool,
    program: Option<ProgramHandle>,
    vertex_input: Option<(BufferHandle, Option<BufferHandle>)>,
    instance_input: Option<(BufferHandle, usize)>,

    draws: Vec<RecordedDraw>,
    counters: HeadlessCounters,
    failures: InjectedFailures,
}

impl HeadlessBackend {
    /// Create a backend with a display surface of the given size
    pub fn new(width: u32, height: u32) -> Self {
        log::debug!("Creating headless backend with a {}x{} surface", width, height);
        Self {
            surface: (width, height),
            next_handle: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            bound_framebuffer: None,
            viewport: Viewport::new(width, height),
            polygon_mode: PolygonMode::Fill,
            depth_test: true,
            program: None,
            vertex_input: None,
            instance_input: None,
            draws: Vec::new(),
            counters: HeadlessCounters::default(),
            failures: InjectedFailures::default(),
        }
    }

    /// Resize the display surface
    ///
    /// Like a window resize racing the swap chain, the next present reports
    /// the surface as outdated.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
        self.failures.surface_outdated = true;
    }

    /// Make the next framebuffer creation fail as incomplete
    pub fn fail_next_framebuffer(&mut self) {
        self.failures.framebuffer = true;
    }

    /// Make the next program creation fail to compile
    pub fn fail_next_program(&mut self) {
        self.failures.program = true;
    }

    /// Make the next buffer allocation run out of memory
    pub fn fail_next_buffer(&mut self) {
        self.failures.buffer = true;
    }

    /// Make the next present report an outdated surface
    pub fn mark_surface_outdated(&mut self) {
        self.failures.surface_outdated = true;
    }

    /// Live buffers, textures, framebuffers and programs
    pub fn live_handle_count(&self) -> usize {
        self.buffers.len() + self.textures.len() + self.framebuffers.len() + self.programs.len()
    }

    /// Live framebuffers
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    /// Live buffers of one kind
    pub fn live_buffers(&self, kind: BufferKind) -> usize {
        self.buffers.values().filter(|b| b.kind == kind).count()
    }

    /// Size in bytes of a live buffer
    pub fn buffer_size(&self, buffer: BufferHandle) -> Option<usize> {
        self.buffers.get(&buffer).map(|b| b.size)
    }

    /// Bytes held by live textures
    pub fn texture_memory(&self) -> usize {
        self.textures.values().map(|t| t.bytes).sum()
    }

    /// Operation counters
    pub fn counters(&self) -> &HeadlessCounters {
        &self.counters
    }

    /// Buffer allocations of one kind so far
    pub fn buffers_created(&self, kind: BufferKind) -> u64 {
        self.counters.buffers_created.get(&kind).copied().unwrap_or(0)
    }

    /// Upload calls made to one buffer
    pub fn upload_count(&self, buffer: BufferHandle) -> u64 {
        self.counters.uploads.get(&buffer).copied().unwrap_or(0)
    }

    /// Draws recorded since the last [`take_draws`](Self::take_draws)
    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    /// Drain the recorded draws
    pub fn take_draws(&mut self) -> Vec<RecordedDraw> {
        std::mem::take(&mut self.draws)
    }

    /// Current polygon mode
    pub fn polygon_mode(&self) -> PolygonMode {
        self.polygon_mode
    }

    /// Currently bound render target and viewport
    pub fn bound_target(&self) -> (Option<FramebufferHandle>, Viewport) {
        (self.bound_framebuffer, self.viewport)
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn insert_texture(&mut self, owner: Option<FramebufferHandle>, bytes: usize) -> TextureHandle {
        let handle = TextureHandle(self.allocate_handle());
        self.textures.insert(handle, TextureRecord { owner, bytes });
        handle
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> BackendResult<Framebuffer> {
        if std::mem::take(&mut self.failures.framebuffer) {
            return Err(RenderError::FramebufferIncomplete(format!("{}: injected failure", desc.label)));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::FramebufferIncomplete(format!(
                "{}: zero-sized attachments {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        if desc.color.is_none() && desc.depth.is_none() {
            return Err(RenderError::FramebufferIncomplete(format!("{}: no attachments", desc.label)));
        }
        if desc.color.is_some_and(|f| f.is_depth()) || desc.depth.is_some_and(|f| !f.is_depth()) {
            return Err(RenderError::FramebufferIncomplete(format!(
                "{}: attachment format mismatch",
                desc.label
            )));
        }

        let handle = FramebufferHandle(self.allocate_handle());
        let texels = desc.width as usize * desc.height as usize;
        let color = desc.color.map(|f| self.insert_texture(Some(handle), texels * f.bytes_per_texel()));
        let depth = desc.depth.map(|f| self.insert_texture(Some(handle), texels * f.bytes_per_texel()));

        let framebuffer = Framebuffer {
            handle,
            color,
            depth,
            width: desc.width,
            height: desc.height,
        };
        self.framebuffers.insert(handle, framebuffer);
        self.counters.framebuffers_created += 1;
        log::trace!("Created framebuffer {:?} '{}' {}x{}", handle, desc.label, desc.width, desc.height);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(&framebuffer).is_some() {
            self.textures.retain(|_, t| t.owner != Some(framebuffer));
            if self.bound_framebuffer == Some(framebuffer) {
                self.bound_framebuffer = None;
            }
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::Backend(format!("texture '{}' has zero size", desc.label)));
        }
        let bytes = desc.width as usize * desc.height as usize * desc.format.bytes_per_texel();
        if let Some(data) = data {
            if data.len() != bytes {
                return Err(RenderError::Backend(format!(
                    "texture '{}' expects {} bytes of data, got {}",
                    desc.label,
                    bytes,
                    data.len()
                )));
            }
        }
        Ok(self.insert_texture(None, bytes))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        // Attachments die with their framebuffer
        if self.textures.get(&texture).is_some_and(|t| t.owner.is_none()) {
            self.textures.remove(&texture);
        }
    }

    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> BackendResult<BufferHandle> {
        if std::mem::take(&mut self.failures.buffer) {
            return Err(RenderError::OutOfMemory(size));
        }
        if size == 0 {
            return Err(RenderError::Backend(format!("zero-sized {:?} buffer", kind)));
        }
        let handle = BufferHandle(self.allocate_handle());
        self.buffers.insert(handle, BufferRecord { kind, size });
        *self.counters.buffers_created.entry(kind).or_insert(0) += 1;
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        if self.vertex_input.is_some_and(|(v, i)| v == buffer || i == Some(buffer)) {
            self.vertex_input = None;
        }
        if self.instance_input.is_some_and(|(b, _)| b == buffer) {
            self.instance_input = None;
        }
    }

    fn upload_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> BackendResult<()> {
        let record = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| RenderError::Backend(format!("upload to unknown buffer {:?}", buffer)))?;
        let end = offset.checked_add(data.len()).unwrap_or(usize::MAX);
        if end > record.size {
            return Err(RenderError::Backend(format!(
                "upload of {} bytes at offset {} overflows {:?} buffer of {} bytes",
                data.len(),
                offset,
                record.kind,
                record.size
            )));
        }
        *self.counters.uploads.entry(buffer).or_insert(0) += 1;
        self.counters.bytes_uploaded += data.len() as u64;
        Ok(())
    }

    fn create_program(&mut self, source: &ShaderSource) -> BackendResult<ProgramHandle> {
        if std::mem::take(&mut self.failures.program) {
            return Err(RenderError::ShaderCompilation {
                label: source.label.to_string(),
                message: "injected failure".to_string(),
            });
        }
        for (stage, text) in [("vertex", source.vertex), ("fragment", source.fragment)] {
            if !text.trim_start().starts_with("#version") || !text.contains("void main") {
                return Err(RenderError::ShaderCompilation {
                    label: source.label.to_string(),
                    message: format!("{} stage has no #version header or main()", stage),
                });
            }
        }
        let handle = ProgramHandle(self.allocate_handle());
        self.programs.insert(handle, source.label);
        self.counters.programs_created += 1;
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>, viewport: Viewport) {
        if let Some(fb) = framebuffer {
            if !self.framebuffers.contains_key(&fb) {
                log::warn!("Binding unknown framebuffer {:?}; falling back to the surface", fb);
                self.bound_framebuffer = None;
                self.viewport = Viewport::new(self.surface.0, self.surface.1);
                return;
            }
        }
        self.bound_framebuffer = framebuffer;
        self.viewport = viewport;
    }

    fn clear(&mut self, _flags: ClearFlags, _color: [f32; 4], _depth: f32) {
        self.counters.clears += 1;
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.polygon_mode = mode;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn bind_program(&mut self, program: ProgramHandle) {
        self.program = self.programs.contains_key(&program).then_some(program);
    }

    fn set_uniform(&mut self, _name: &str, _value: UniformValue) {
        self.counters.uniform_writes += 1;
    }

    fn bind_texture(&mut self, _slot: u32, _texture: Option<TextureHandle>) {}

    fn bind_vertex_buffers(&mut self, vertex: BufferHandle, _layout: &VertexLayout, index: Option<BufferHandle>) {
        self.vertex_input = Some((vertex, index));
    }

    fn bind_instance_buffer(&mut self, instance: Option<(BufferHandle, &VertexLayout)>) {
        self.instance_input = instance.map(|(buffer, layout)| (buffer, layout.stride));
    }

    fn unbind_vertex_input(&mut self) {
        self.vertex_input = None;
        self.instance_input = None;
    }

    fn draw(&mut self, call: &DrawCall) -> BackendResult<()> {
        let program = self
            .program
            .ok_or_else(|| RenderError::Backend("draw without a bound program".to_string()))?;

        if call.index_count.is_some() && !self.vertex_input.is_some_and(|(_, index)| index.is_some()) {
            return Err(RenderError::Backend("indexed draw without an index buffer".to_string()));
        }
        if call.is_instanced() {
            let (buffer, stride) = self
                .instance_input
                .ok_or_else(|| RenderError::Backend("instanced draw without an instance buffer".to_string()))?;
            let size = self.buffers.get(&buffer).map_or(0, |b| b.size);
            if size < stride * call.instance_count as usize {
                return Err(RenderError::Backend(format!(
                    "instance buffer of {} bytes is too small for {} instances",
                    size, call.instance_count
                )));
            }
        }

        self.draws.push(RecordedDraw {
            framebuffer: self.bound_framebuffer,
            program,
            program_label: self.programs.get(&program).copied().unwrap_or("unknown"),
            polygon_mode: self.polygon_mode,
            call: *call,
        });
        Ok(())
    }

    fn present(&mut self) -> BackendResult<()> {
        if std::mem::take(&mut self.failures.surface_outdated) {
            return Err(RenderError::SurfaceOutdated);
        }
        self.counters.presents += 1;
        Ok(())
    }
}
