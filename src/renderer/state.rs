//! Tracked GPU State
//!
//! [`GpuState`] owns the device and mirrors every piece of fixed-function
//! and binding state it has set. A setter whose value equals the mirrored one
//! is elided; anything else is forwarded and recorded. A slot holding `None`
//! means "unknown": the next set always reaches the driver. Resource calls
//! pass straight through, and destroying a resource forgets any binding that
//! referred to it so a recycled driver name is never mistaken for it.

use smallvec::SmallVec;
use wgpu::{CompareFunction, Face, IndexFormat, PrimitiveTopology};

use crate::errors::Result;
use crate::renderer::device::{
    BlendEquation, BlendFunc, BufferTarget, FramebufferId, GpuBufferId, GpuDevice, GpuProgramId, GpuTextureId,
    GpuVertexArrayId, ProgramInfo, TextureDescriptor, UniformLocation, UniformValue, VertexBinding, Viewport,
};

/// Issued vs. elided state calls since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounters {
    pub issued: u64,
    pub elided: u64,
}

/// Records `value` in `slot`. Returns whether the driver must be called.
fn track<T: PartialEq + Copy>(slot: &mut Option<T>, value: T, counters: &mut StateCounters) -> bool {
    if *slot == Some(value) {
        counters.elided += 1;
        false
    } else {
        *slot = Some(value);
        counters.issued += 1;
        true
    }
}

/// Forgets a binding slot if it currently holds `resource`.
fn forget<T: PartialEq + Copy>(slot: &mut Option<Option<T>>, resource: T) {
    if *slot == Some(Some(resource)) {
        *slot = None;
    }
}

/// Redundancy-eliminating wrapper around a [`GpuDevice`].
pub struct GpuState<D: GpuDevice> {
    device: D,

    depth_test: Option<bool>,
    depth_func: Option<CompareFunction>,
    depth_mask: Option<bool>,
    cull_enabled: Option<bool>,
    cull_face: Option<Face>,
    blend_enabled: Option<bool>,
    blend_func: Option<BlendFunc>,
    blend_equation: Option<BlendEquation>,

    textures: SmallVec<[Option<Option<GpuTextureId>>; 16]>,
    program: Option<Option<GpuProgramId>>,
    vertex_array: Option<Option<GpuVertexArrayId>>,
    framebuffer: Option<Option<FramebufferId>>,
    viewport: Option<Viewport>,
    clear_color: Option<[f32; 4]>,

    counters: StateCounters,
}

impl<D: GpuDevice> GpuState<D> {
    #[must_use]
    pub fn new(device: D) -> Self {
        Self {
            device,
            depth_test: None,
            depth_func: None,
            depth_mask: None,
            cull_enabled: None,
            cull_face: None,
            blend_enabled: None,
            blend_func: None,
            blend_equation: None,
            textures: SmallVec::new(),
            program: None,
            vertex_array: None,
            framebuffer: None,
            viewport: None,
            clear_color: None,
            counters: StateCounters::default(),
        }
    }

    /// Read-only access to the wrapped device.
    #[inline]
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn counters(&self) -> StateCounters {
        self.counters
    }

    #[inline]
    #[must_use]
    pub fn is_context_lost(&self) -> bool {
        self.device.is_context_lost()
    }

    /// Marks every mirrored value unknown, e.g. after a context restore or
    /// when foreign code touched the device.
    pub fn invalidate(&mut self) {
        self.depth_test = None;
        self.depth_func = None;
        self.depth_mask = None;
        self.cull_enabled = None;
        self.cull_face = None;
        self.blend_enabled = None;
        self.blend_func = None;
        self.blend_equation = None;
        self.textures.clear();
        self.program = None;
        self.vertex_array = None;
        self.framebuffer = None;
        self.viewport = None;
        self.clear_color = None;
    }

    // ========================================================================
    // Fixed-function state
    // ========================================================================

    pub fn set_depth_test(&mut self, enabled: bool) {
        if track(&mut self.depth_test, enabled, &mut self.counters) {
            self.device.set_depth_test(enabled);
        }
    }

    pub fn set_depth_func(&mut self, func: CompareFunction) {
        if track(&mut self.depth_func, func, &mut self.counters) {
            self.device.set_depth_func(func);
        }
    }

    pub fn set_depth_mask(&mut self, write: bool) {
        if track(&mut self.depth_mask, write, &mut self.counters) {
            self.device.set_depth_mask(write);
        }
    }

    pub fn set_cull_enabled(&mut self, enabled: bool) {
        if track(&mut self.cull_enabled, enabled, &mut self.counters) {
            self.device.set_cull_enabled(enabled);
        }
    }

    pub fn set_cull_face(&mut self, face: Face) {
        if track(&mut self.cull_face, face, &mut self.counters) {
            self.device.set_cull_face(face);
        }
    }

    pub fn set_blend_enabled(&mut self, enabled: bool) {
        if track(&mut self.blend_enabled, enabled, &mut self.counters) {
            self.device.set_blend_enabled(enabled);
        }
    }

    pub fn set_blend_func(&mut self, func: BlendFunc) {
        if track(&mut self.blend_func, func, &mut self.counters) {
            self.device.set_blend_func(func);
        }
    }

    pub fn set_blend_equation(&mut self, equation: BlendEquation) {
        if track(&mut self.blend_equation, equation, &mut self.counters) {
            self.device.set_blend_equation(equation);
        }
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    pub fn bind_texture(&mut self, unit: u32, texture: Option<GpuTextureId>) {
        let index = unit as usize;
        if self.textures.len() <= index {
            self.textures.resize(index + 1, None);
        }
        if track(&mut self.textures[index], texture, &mut self.counters) {
            self.device.bind_texture(unit, texture);
        }
    }

    pub fn use_program(&mut self, program: Option<GpuProgramId>) {
        if track(&mut self.program, program, &mut self.counters) {
            self.device.use_program(program);
        }
    }

    pub fn bind_vertex_array(&mut self, vertex_array: Option<GpuVertexArrayId>) {
        if track(&mut self.vertex_array, vertex_array, &mut self.counters) {
            self.device.bind_vertex_array(vertex_array);
        }
    }

    pub fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        if track(&mut self.framebuffer, framebuffer, &mut self.counters) {
            self.device.bind_framebuffer(framebuffer);
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if track(&mut self.viewport, viewport, &mut self.counters) {
            self.device.set_viewport(viewport);
        }
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        if track(&mut self.clear_color, color, &mut self.counters) {
            self.device.set_clear_color(color);
        }
    }

    #[inline]
    #[must_use]
    pub fn current_program(&self) -> Option<GpuProgramId> {
        self.program.flatten()
    }

    // ========================================================================
    // Pass-through calls
    // ========================================================================

    pub fn clear(&mut self, color: bool, depth: bool) {
        self.device.clear(color, depth);
    }

    /// Uniform values are diffed per program by the program's own cache.
    pub fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        self.device.set_uniform(location, value);
    }

    pub fn draw_arrays(&mut self, topology: PrimitiveTopology, first: u32, count: u32) {
        self.device.draw_arrays(topology, first, count);
    }

    pub fn draw_elements(&mut self, topology: PrimitiveTopology, format: IndexFormat, first: u32, count: u32) {
        self.device.draw_elements(topology, format, first, count);
    }

    // ========================================================================
    // Resources
    // ========================================================================

    pub fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> GpuBufferId {
        self.device.create_buffer(target, data)
    }

    pub fn update_buffer(&mut self, buffer: GpuBufferId, data: &[u8]) {
        self.device.update_buffer(buffer, data);
    }

    pub fn destroy_buffer(&mut self, buffer: GpuBufferId) {
        self.device.destroy_buffer(buffer);
    }

    pub fn create_texture(&mut self, desc: &TextureDescriptor<'_>, data: Option<&[u8]>) -> GpuTextureId {
        self.device.create_texture(desc, data)
    }

    pub fn destroy_texture(&mut self, texture: GpuTextureId) {
        for slot in &mut self.textures {
            forget(slot, texture);
        }
        self.device.destroy_texture(texture);
    }

    pub fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> Result<ProgramInfo> {
        self.device.compile_program(label, vertex, fragment)
    }

    pub fn destroy_program(&mut self, program: GpuProgramId) {
        forget(&mut self.program, program);
        self.device.destroy_program(program);
    }

    pub fn create_vertex_array(&mut self, bindings: &[VertexBinding], index: Option<GpuBufferId>) -> GpuVertexArrayId {
        self.device.create_vertex_array(bindings, index)
    }

    pub fn destroy_vertex_array(&mut self, vertex_array: GpuVertexArrayId) {
        forget(&mut self.vertex_array, vertex_array);
        self.device.destroy_vertex_array(vertex_array);
    }
}
