//! GPU Device Abstraction
//!
//! [`GpuDevice`] is the seam between the engine and a concrete graphics
//! backend. It exposes a GL-style immediate interface: resource creation,
//! individual fixed-function state setters, uniform uploads and draws.
//!
//! The engine never calls a device directly; every call goes through
//! [`GpuState`](crate::renderer::state::GpuState), which elides redundant
//! state changes. [`HeadlessDevice`](crate::renderer::headless::HeadlessDevice)
//! implements the trait without a GPU for tests and tooling.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use wgpu::{BlendFactor, BlendOperation, CompareFunction, Face, IndexFormat, PrimitiveTopology, TextureFormat, VertexFormat};

use crate::errors::Result;

macro_rules! gpu_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

gpu_id! {
    /// Driver buffer object.
    GpuBufferId,
    /// Driver texture object.
    GpuTextureId,
    /// Linked driver program.
    GpuProgramId,
    /// Driver vertex array object.
    GpuVertexArrayId,
    /// Driver framebuffer; `None` in state calls means the default target.
    FramebufferId,
}

/// Location of an active uniform within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Buffer binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

/// Viewport rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    #[must_use]
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Source and destination blend factors, per color and alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl BlendFunc {
    #[must_use]
    pub fn uniform(src: BlendFactor, dst: BlendFactor) -> Self {
        Self::separate(src, dst, src, dst)
    }

    #[must_use]
    pub fn separate(src_color: BlendFactor, dst_color: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor) -> Self {
        Self {
            src_color,
            dst_color,
            src_alpha,
            dst_alpha,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendEquation {
    pub color: BlendOperation,
    pub alpha: BlendOperation,
}

impl BlendEquation {
    #[must_use]
    pub fn uniform(op: BlendOperation) -> Self {
        Self { color: op, alpha: op }
    }
}

/// Value uploaded to a single uniform location.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    /// Flat float array backing a `vecN name[count]` uniform.
    Floats(Vec<f32>),
}

/// One vertex attribute binding inside a vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub location: u32,
    pub buffer: GpuBufferId,
    pub format: VertexFormat,
    pub offset: u64,
    pub stride: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// An active attribute or uniform reported by program introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariable {
    pub name: String,
    pub location: u32,
}

/// Result of a successful program link.
#[derive(Debug, Clone)]
pub struct ProgramInfo {
    pub handle: GpuProgramId,
    pub attributes: Vec<ActiveVariable>,
    pub uniforms: Vec<ActiveVariable>,
}

/// GL-style graphics backend.
pub trait GpuDevice {
    // === Resources ===
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> GpuBufferId;
    fn update_buffer(&mut self, buffer: GpuBufferId, data: &[u8]);
    fn destroy_buffer(&mut self, buffer: GpuBufferId);

    fn create_texture(&mut self, desc: &TextureDescriptor<'_>, data: Option<&[u8]>) -> GpuTextureId;
    fn destroy_texture(&mut self, texture: GpuTextureId);

    /// Compiles and links a program. Failure carries the driver log.
    fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> Result<ProgramInfo>;
    fn destroy_program(&mut self, program: GpuProgramId);

    fn create_vertex_array(&mut self, bindings: &[VertexBinding], index: Option<GpuBufferId>) -> GpuVertexArrayId;
    fn destroy_vertex_array(&mut self, vertex_array: GpuVertexArrayId);

    // === Fixed-function state ===
    fn set_depth_test(&mut self, enabled: bool);
    fn set_depth_func(&mut self, func: CompareFunction);
    fn set_depth_mask(&mut self, write: bool);
    fn set_cull_enabled(&mut self, enabled: bool);
    fn set_cull_face(&mut self, face: Face);
    fn set_blend_enabled(&mut self, enabled: bool);
    fn set_blend_func(&mut self, func: BlendFunc);
    fn set_blend_equation(&mut self, equation: BlendEquation);

    // === Bindings ===
    fn bind_texture(&mut self, unit: u32, texture: Option<GpuTextureId>);
    fn use_program(&mut self, program: Option<GpuProgramId>);
    fn bind_vertex_array(&mut self, vertex_array: Option<GpuVertexArrayId>);
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn set_viewport(&mut self, viewport: Viewport);

    // === Frame ===
    fn set_clear_color(&mut self, color: [f32; 4]);
    fn clear(&mut self, color: bool, depth: bool);
    /// Uploads to the currently bound program.
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);
    fn draw_arrays(&mut self, topology: PrimitiveTopology, first: u32, count: u32);
    fn draw_elements(&mut self, topology: PrimitiveTopology, format: IndexFormat, first: u32, count: u32);

    fn is_context_lost(&self) -> bool;
}
