//! Shader Programs
//!
//! A [`Program`] is one compiled shader variant. It is identified by a
//! [`ProgramKey`]: the template name plus the interned canonical form of the
//! merged render options, so every draw that resolves to the same key shares
//! the same driver program and two distinct option sets never share one.
//!
//! [`ProgramCache`] wraps a [`ResourceCache`] with the compile step. A variant
//! that fails to generate or link is replaced by a *blank* program that draws
//! nothing; the failure is logged once and kept as a [`ShaderDiagnostic`].

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::renderer::cache::{GpuResource, ResourceCache};
use crate::renderer::device::{GpuDevice, GpuProgramId, ProgramInfo, UniformLocation, UniformValue};
use crate::renderer::shader_gen::{self, ShaderSource};
use crate::renderer::state::GpuState;
use crate::resources::render_options::RenderOptions;
use crate::utils::interner::{self, Symbol};

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// Shader variant identity.
///
/// Equality covers the interned canonical option string, not only its digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramKey {
    pub shader: &'static str,
    pub options_hash: u64,
    options: Symbol,
}

impl ProgramKey {
    #[must_use]
    pub fn new(shader: &'static str, options: &RenderOptions) -> Self {
        Self {
            shader,
            options_hash: options.compute_hash(),
            options: interner::intern(&options.canonical()),
        }
    }

    /// Canonical `KEY=VALUE;` form of the options this variant was built from.
    #[must_use]
    pub fn options(&self) -> &'static str {
        interner::resolve(self.options)
    }

    /// Label handed to the driver and used in logs.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}#{:016x}", self.shader, self.options_hash)
    }
}

/// Which program a draw uses: a cached variant or the debug placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramSlot {
    Cached(ProgramKey),
    Placeholder,
}

/// A linked program with its introspected locations.
#[derive(Debug)]
pub struct Program {
    id: u64,
    key: ProgramKey,
    handle: Option<GpuProgramId>,
    attributes: FxHashMap<String, u32>,
    uniforms: FxHashMap<String, UniformLocation>,
    /// Last value uploaded per location.
    uniform_values: FxHashMap<UniformLocation, UniformValue>,
}

impl Program {
    fn from_info(key: ProgramKey, info: ProgramInfo) -> Self {
        Self {
            id: NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed),
            key,
            handle: Some(info.handle),
            attributes: info.attributes.into_iter().map(|a| (a.name, a.location)).collect(),
            uniforms: info
                .uniforms
                .into_iter()
                .map(|u| (u.name, UniformLocation(u.location)))
                .collect(),
            uniform_values: FxHashMap::default(),
        }
    }

    /// Stand-in for a variant that failed to build.
    fn blank(key: ProgramKey) -> Self {
        Self {
            id: NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed),
            key,
            handle: None,
            attributes: FxHashMap::default(),
            uniforms: FxHashMap::default(),
            uniform_values: FxHashMap::default(),
        }
    }

    /// Process-unique identity, distinct for every compiled instance.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> ProgramKey {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<GpuProgramId> {
        self.handle
    }

    /// True for the stand-in of a failed variant.
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.handle.is_none()
    }

    #[must_use]
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    #[must_use]
    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    /// Uploads `value` to the uniform `name` when it differs from the last
    /// upload. Inactive uniforms are ignored. Returns whether a call was made.
    ///
    /// The program must be bound.
    pub fn set_uniform<D: GpuDevice>(&mut self, gpu: &mut GpuState<D>, name: &str, value: UniformValue) -> bool {
        let Some(&location) = self.uniforms.get(name) else {
            return false;
        };
        debug_assert_eq!(gpu.current_program(), self.handle, "uniform upload to unbound program");
        if self.uniform_values.get(&location) == Some(&value) {
            return false;
        }
        gpu.set_uniform(location, &value);
        self.uniform_values.insert(location, value);
        true
    }

    /// Forgets cached uniform values so the next uploads reach the driver.
    pub fn reset_uniform_cache(&mut self) {
        self.uniform_values.clear();
    }
}

impl GpuResource for Program {
    fn destroy<D: GpuDevice>(self, gpu: &mut GpuState<D>) {
        if let Some(handle) = self.handle {
            gpu.destroy_program(handle);
        }
    }
}

/// A recorded shader build failure.
#[derive(Debug, Clone)]
pub struct ShaderDiagnostic {
    pub key: ProgramKey,
    pub message: String,
}

fn build_program<D: GpuDevice>(
    gpu: &mut GpuState<D>,
    key: ProgramKey,
    generate: impl FnOnce() -> Result<ShaderSource>,
) -> Result<Program> {
    let source = generate()?;
    let info = gpu.compile_program(&key.label(), &source.vertex, &source.fragment)?;
    Ok(Program::from_info(key, info))
}

/// Shader variant cache.
#[derive(Debug)]
pub struct ProgramCache {
    programs: ResourceCache<ProgramKey, Program>,
    placeholder: Option<Program>,
    diagnostics: Vec<ShaderDiagnostic>,
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            programs: ResourceCache::new("programs"),
            placeholder: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn begin_frame(&mut self, frame: u64) {
        self.programs.begin_frame(frame);
    }

    /// Returns the program for `key`, building it on first request.
    ///
    /// Never fails: a build error caches a blank program under `key` so the
    /// variant is not rebuilt every frame.
    pub fn get_or_create<D: GpuDevice>(
        &mut self,
        gpu: &mut GpuState<D>,
        key: ProgramKey,
        generate: impl FnOnce() -> Result<ShaderSource>,
    ) -> &mut Program {
        let diagnostics = &mut self.diagnostics;
        self.programs.get_or_create(key, || match build_program(gpu, key, generate) {
            Ok(program) => {
                log::debug!("Compiled shader variant {}", key.label());
                program
            }
            Err(err) => {
                log::error!("Shader variant {} failed, drawing with fallback: {err}", key.label());
                diagnostics.push(ShaderDiagnostic {
                    key,
                    message: err.to_string(),
                });
                Program::blank(key)
            }
        })
    }

    #[must_use]
    pub fn get(&self, key: &ProgramKey) -> Option<&Program> {
        self.programs.get(key)
    }

    pub fn get_mut(&mut self, key: &ProgramKey) -> Option<&mut Program> {
        self.programs.get_mut(key)
    }

    #[must_use]
    pub fn program(&self, slot: ProgramSlot) -> Option<&Program> {
        match slot {
            ProgramSlot::Cached(key) => self.programs.get(&key),
            ProgramSlot::Placeholder => self.placeholder.as_ref(),
        }
    }

    pub fn program_mut(&mut self, slot: ProgramSlot) -> Option<&mut Program> {
        match slot {
            ProgramSlot::Cached(key) => self.programs.get_mut(&key),
            ProgramSlot::Placeholder => self.placeholder.as_mut(),
        }
    }

    /// Compiles the magenta debug program drawn in place of failed variants.
    pub fn init_placeholder<D: GpuDevice>(&mut self, gpu: &mut GpuState<D>) -> Result<()> {
        if let Some(old) = self.placeholder.take() {
            old.destroy(gpu);
        }
        let key = ProgramKey::new(shader_gen::FALLBACK_SHADER, &RenderOptions::new());
        let program = build_program(gpu, key, || shader_gen::generate(shader_gen::FALLBACK_SHADER, &RenderOptions::new()))?;
        self.placeholder = Some(program);
        Ok(())
    }

    #[must_use]
    pub fn has_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[ShaderDiagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<ShaderDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn mark_used(&mut self, key: &ProgramKey) -> bool {
        self.programs.mark_used(key)
    }

    pub fn retain(&mut self, key: &ProgramKey) -> bool {
        self.programs.retain(key)
    }

    pub fn release(&mut self, key: &ProgramKey) -> bool {
        self.programs.release(key)
    }

    #[must_use]
    pub fn ref_count(&self, key: &ProgramKey) -> Option<u32> {
        self.programs.ref_count(key)
    }

    #[must_use]
    pub fn contains(&self, key: &ProgramKey) -> bool {
        self.programs.contains(key)
    }

    pub fn sweep<D: GpuDevice>(&mut self, gpu: &mut GpuState<D>) -> usize {
        self.programs.sweep(gpu)
    }

    pub fn sweep_unreferenced<D: GpuDevice>(&mut self, gpu: &mut GpuState<D>) -> usize {
        self.programs.sweep_unreferenced(gpu)
    }

    /// Drops every program without driver calls, placeholder included.
    pub fn invalidate(&mut self) -> usize {
        self.placeholder = None;
        self.programs.invalidate()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ProgramKey> {
        self.programs.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StrataError;
    use crate::renderer::headless::HeadlessDevice;

    fn source(fragment: &str) -> ShaderSource {
        ShaderSource {
            vertex: "in vec3 position;\nuniform mat4 modelViewMatrix;\n".to_owned(),
            fragment: fragment.to_owned(),
        }
    }

    #[test]
    fn same_key_compiles_once() {
        let mut gpu = GpuState::new(HeadlessDevice::new());
        let mut cache = ProgramCache::new();
        let key = ProgramKey::new("mesh_basic", &RenderOptions::new());

        let first = cache.get_or_create(&mut gpu, key, || Ok(source("uniform vec3 diffuse;\n"))).id();
        let second = cache
            .get_or_create(&mut gpu, key, || panic!("generator must not run for a cached key"))
            .id();
        assert_eq!(first, second);
        assert_eq!(gpu.device().live_program_count(), 1);
    }

    #[test]
    fn colliding_digests_stay_distinct_variants() {
        let mut gpu = GpuState::new(HeadlessDevice::new());
        let mut cache = ProgramCache::new();
        let plain = ProgramKey::new("mesh_basic", &RenderOptions::new());
        let mut mapped = ProgramKey::new("mesh_basic", &[("HAS_MAP", "1")].into_iter().collect());
        mapped.options_hash = plain.options_hash;

        assert_ne!(plain, mapped);
        assert_eq!(mapped.options(), "HAS_MAP=1;");
        cache.get_or_create(&mut gpu, plain, || Ok(source("uniform vec3 diffuse;\n")));
        cache.get_or_create(&mut gpu, mapped, || Ok(source("uniform sampler2D map;\n")));
        assert_eq!(cache.len(), 2);
        assert_eq!(gpu.device().live_program_count(), 2);
    }

    #[test]
    fn failed_build_caches_blank_program() {
        let mut gpu = GpuState::new(HeadlessDevice::new());
        let mut cache = ProgramCache::new();
        let key = ProgramKey::new("mesh_broken", &RenderOptions::new());

        let program = cache.get_or_create(&mut gpu, key, || Err(StrataError::TemplateNotFound("x".into())));
        assert!(program.is_blank());
        assert_eq!(cache.diagnostics().len(), 1);

        // Second request hits the cached blank entry.
        cache.get_or_create(&mut gpu, key, || panic!("failed key must not be rebuilt"));
        assert_eq!(cache.take_diagnostics().len(), 1);
        assert!(cache.diagnostics().is_empty());
    }

    #[test]
    fn uniform_upload_skips_unchanged_values() {
        let mut gpu = GpuState::new(HeadlessDevice::new());
        let mut cache = ProgramCache::new();
        let key = ProgramKey::new("mesh_basic", &RenderOptions::new());
        let program = cache.get_or_create(&mut gpu, key, || Ok(source("uniform float opacity;\n")));
        gpu.use_program(program.handle());

        assert!(program.set_uniform(&mut gpu, "opacity", UniformValue::Float(0.5)));
        assert!(!program.set_uniform(&mut gpu, "opacity", UniformValue::Float(0.5)));
        assert!(program.set_uniform(&mut gpu, "opacity", UniformValue::Float(1.0)));
        assert!(!program.set_uniform(&mut gpu, "missing", UniformValue::Float(1.0)));
    }
}
