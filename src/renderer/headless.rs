//! Headless Device
//!
//! A [`GpuDevice`] that records every call instead of talking to a driver.
//! Program compilation performs a light introspection pass over the GLSL
//! source: vertex-stage `in` declarations become attributes and `uniform`
//! declarations in either stage become uniforms, both numbered in order of
//! first appearance. A source containing an `#error` directive fails to
//! compile, which is how tests exercise the fallback path.

use std::cell::{Cell, RefCell};

use rustc_hash::FxHashSet;
use wgpu::{CompareFunction, Face, IndexFormat, PrimitiveTopology};

use crate::errors::{Result, StrataError};
use crate::renderer::device::{
    ActiveVariable, BlendEquation, BlendFunc, BufferTarget, FramebufferId, GpuBufferId, GpuDevice, GpuProgramId,
    GpuTextureId, GpuVertexArrayId, ProgramInfo, TextureDescriptor, UniformLocation, UniformValue, VertexBinding,
    Viewport,
};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer(GpuBufferId),
    UpdateBuffer(GpuBufferId),
    DestroyBuffer(GpuBufferId),
    CreateTexture(GpuTextureId),
    DestroyTexture(GpuTextureId),
    CompileProgram(String),
    DestroyProgram(GpuProgramId),
    CreateVertexArray(GpuVertexArrayId),
    DestroyVertexArray(GpuVertexArrayId),
    DepthTest(bool),
    DepthFunc(CompareFunction),
    DepthMask(bool),
    CullEnabled(bool),
    CullFace(Face),
    BlendEnabled(bool),
    BlendFunc(BlendFunc),
    BlendEquation(BlendEquation),
    BindTexture(u32, Option<GpuTextureId>),
    UseProgram(Option<GpuProgramId>),
    BindVertexArray(Option<GpuVertexArrayId>),
    BindFramebuffer(Option<FramebufferId>),
    Viewport(Viewport),
    ClearColor([f32; 4]),
    Clear { color: bool, depth: bool },
    Uniform(UniformLocation, UniformValue),
    DrawArrays { first: u32, count: u32 },
    DrawElements { first: u32, count: u32 },
}

impl DeviceCall {
    /// True for fixed-function and binding calls.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            DeviceCall::DepthTest(_)
                | DeviceCall::DepthFunc(_)
                | DeviceCall::DepthMask(_)
                | DeviceCall::CullEnabled(_)
                | DeviceCall::CullFace(_)
                | DeviceCall::BlendEnabled(_)
                | DeviceCall::BlendFunc(_)
                | DeviceCall::BlendEquation(_)
                | DeviceCall::BindTexture(..)
                | DeviceCall::UseProgram(_)
                | DeviceCall::BindVertexArray(_)
                | DeviceCall::BindFramebuffer(_)
                | DeviceCall::Viewport(_)
                | DeviceCall::ClearColor(_)
        )
    }

    #[must_use]
    pub fn is_draw(&self) -> bool {
        matches!(self, DeviceCall::DrawArrays { .. } | DeviceCall::DrawElements { .. })
    }
}

#[derive(Debug, Default)]
struct LiveResources {
    buffers: FxHashSet<GpuBufferId>,
    textures: FxHashSet<GpuTextureId>,
    programs: FxHashSet<GpuProgramId>,
    vertex_arrays: FxHashSet<GpuVertexArrayId>,
}

/// Recording device with live-resource bookkeeping.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: u32,
    calls: Vec<DeviceCall>,
    live: RefCell<LiveResources>,
    context_lost: Cell<bool>,
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    #[must_use]
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(*c)).count()
    }

    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.count_calls(DeviceCall::is_draw)
    }

    #[must_use]
    pub fn state_change_count(&self) -> usize {
        self.count_calls(DeviceCall::is_state_change)
    }

    #[must_use]
    pub fn is_program_alive(&self, program: GpuProgramId) -> bool {
        self.live.borrow().programs.contains(&program)
    }

    #[must_use]
    pub fn live_program_count(&self) -> usize {
        self.live.borrow().programs.len()
    }

    #[must_use]
    pub fn live_buffer_count(&self) -> usize {
        self.live.borrow().buffers.len()
    }

    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.live.borrow().textures.len()
    }

    #[must_use]
    pub fn live_vertex_array_count(&self) -> usize {
        self.live.borrow().vertex_arrays.len()
    }

    /// Simulates a lost context: every driver object is gone.
    ///
    /// Takes `&self` so it can be triggered through the renderer's read-only
    /// device access.
    pub fn lose_context(&self) {
        self.context_lost.set(true);
        *self.live.borrow_mut() = LiveResources::default();
    }

    pub fn restore_context(&self) {
        self.context_lost.set(false);
    }

    fn record(&mut self, call: DeviceCall) {
        self.calls.push(call);
    }
}

/// Extracts declared names for `qualifier` (`in` or `uniform`) from GLSL.
fn declared_names(source: &str, qualifier: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let decl = line.strip_suffix(';')?;
            // Skip `layout(...)` prefixes.
            let decl = decl.rsplit_once(')').map_or(decl, |(_, rest)| rest).trim();
            let rest = decl.strip_prefix(qualifier)?.strip_prefix(' ')?;
            let name = rest.split_whitespace().last()?;
            let name = name.split_once('[').map_or(name, |(base, _)| base);
            Some(name.to_owned())
        })
        .collect()
}

fn number(names: impl IntoIterator<Item = String>) -> Vec<ActiveVariable> {
    let mut seen = FxHashSet::default();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .enumerate()
        .map(|(location, name)| ActiveVariable {
            name,
            location: location as u32,
        })
        .collect()
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&mut self, _target: BufferTarget, _data: &[u8]) -> GpuBufferId {
        let id = GpuBufferId(self.next_id());
        self.record(DeviceCall::CreateBuffer(id));
        self.live.get_mut().buffers.insert(id);
        id
    }

    fn update_buffer(&mut self, buffer: GpuBufferId, _data: &[u8]) {
        self.record(DeviceCall::UpdateBuffer(buffer));
    }

    fn destroy_buffer(&mut self, buffer: GpuBufferId) {
        self.record(DeviceCall::DestroyBuffer(buffer));
        self.live.get_mut().buffers.remove(&buffer);
    }

    fn create_texture(&mut self, _desc: &TextureDescriptor<'_>, _data: Option<&[u8]>) -> GpuTextureId {
        let id = GpuTextureId(self.next_id());
        self.record(DeviceCall::CreateTexture(id));
        self.live.get_mut().textures.insert(id);
        id
    }

    fn destroy_texture(&mut self, texture: GpuTextureId) {
        self.record(DeviceCall::DestroyTexture(texture));
        self.live.get_mut().textures.remove(&texture);
    }

    fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> Result<ProgramInfo> {
        self.record(DeviceCall::CompileProgram(label.to_owned()));

        if self.context_lost.get() {
            return Err(StrataError::ContextLost);
        }
        for (stage, source) in [("vertex", vertex), ("fragment", fragment)] {
            if let Some(line) = source.lines().find(|l| l.trim_start().starts_with("#error")) {
                return Err(StrataError::ShaderCompilation {
                    label: label.to_owned(),
                    log: format!("{stage}: {}", line.trim()),
                });
            }
        }

        let handle = GpuProgramId(self.next_id());
        self.live.get_mut().programs.insert(handle);

        let uniforms = declared_names(vertex, "uniform")
            .into_iter()
            .chain(declared_names(fragment, "uniform"));
        Ok(ProgramInfo {
            handle,
            attributes: number(declared_names(vertex, "in")),
            uniforms: number(uniforms),
        })
    }

    fn destroy_program(&mut self, program: GpuProgramId) {
        self.record(DeviceCall::DestroyProgram(program));
        self.live.get_mut().programs.remove(&program);
    }

    fn create_vertex_array(&mut self, _bindings: &[VertexBinding], _index: Option<GpuBufferId>) -> GpuVertexArrayId {
        let id = GpuVertexArrayId(self.next_id());
        self.record(DeviceCall::CreateVertexArray(id));
        self.live.get_mut().vertex_arrays.insert(id);
        id
    }

    fn destroy_vertex_array(&mut self, vertex_array: GpuVertexArrayId) {
        self.record(DeviceCall::DestroyVertexArray(vertex_array));
        self.live.get_mut().vertex_arrays.remove(&vertex_array);
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.record(DeviceCall::DepthTest(enabled));
    }

    fn set_depth_func(&mut self, func: CompareFunction) {
        self.record(DeviceCall::DepthFunc(func));
    }

    fn set_depth_mask(&mut self, write: bool) {
        self.record(DeviceCall::DepthMask(write));
    }

    fn set_cull_enabled(&mut self, enabled: bool) {
        self.record(DeviceCall::CullEnabled(enabled));
    }

    fn set_cull_face(&mut self, face: Face) {
        self.record(DeviceCall::CullFace(face));
    }

    fn set_blend_enabled(&mut self, enabled: bool) {
        self.record(DeviceCall::BlendEnabled(enabled));
    }

    fn set_blend_func(&mut self, func: BlendFunc) {
        self.record(DeviceCall::BlendFunc(func));
    }

    fn set_blend_equation(&mut self, equation: BlendEquation) {
        self.record(DeviceCall::BlendEquation(equation));
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<GpuTextureId>) {
        self.record(DeviceCall::BindTexture(unit, texture));
    }

    fn use_program(&mut self, program: Option<GpuProgramId>) {
        self.record(DeviceCall::UseProgram(program));
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<GpuVertexArrayId>) {
        self.record(DeviceCall::BindVertexArray(vertex_array));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.record(DeviceCall::BindFramebuffer(framebuffer));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.record(DeviceCall::Viewport(viewport));
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.record(DeviceCall::ClearColor(color));
    }

    fn clear(&mut self, color: bool, depth: bool) {
        self.record(DeviceCall::Clear { color, depth });
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        self.record(DeviceCall::Uniform(location, value.clone()));
    }

    fn draw_arrays(&mut self, _topology: PrimitiveTopology, first: u32, count: u32) {
        self.record(DeviceCall::DrawArrays { first, count });
    }

    fn draw_elements(&mut self, _topology: PrimitiveTopology, _format: IndexFormat, first: u32, count: u32) {
        self.record(DeviceCall::DrawElements { first, count });
    }

    fn is_context_lost(&self) -> bool {
        self.context_lost.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn introspection_reads_declarations() {
        let vertex = "in vec3 position;\nlayout(location = 1) in vec3 normal;\nuniform mat4 modelViewMatrix;\nout vec3 vNormal;\n";
        let fragment = "in vec3 vNormal;\nuniform highp vec3 lightDir[2];\nuniform mat4 modelViewMatrix;\n";

        let mut device = HeadlessDevice::new();
        let info = device.compile_program("test", vertex, fragment).unwrap();

        let attributes: Vec<_> = info.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(attributes, vec!["position", "normal"]);
        let uniforms: Vec<_> = info.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(uniforms, vec!["modelViewMatrix", "lightDir"]);
        assert!(device.is_program_alive(info.handle));
    }

    #[test]
    fn error_directive_fails_compilation() {
        let mut device = HeadlessDevice::new();
        let result = device.compile_program("bad", "#error nope\n", "");
        assert!(matches!(result, Err(StrataError::ShaderCompilation { .. })));
        assert_eq!(device.live_program_count(), 0);
    }
}
