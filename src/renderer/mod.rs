//! Rendering System
//!
//! [`Renderer`] turns a [`Scene`] plus a camera node into a sorted sequence
//! of draw calls on a [`GpuDevice`]. A frame runs through fixed phases:
//!
//! 1. **Traversing**: world matrices are brought up to date, visible meshes
//!    are queued and lights collected
//! 2. **Sorting**: shader variants are resolved and both queues sorted
//! 3. **Drawing**: programs, buffers and vertex arrays are fetched from the
//!    caches, state deltas applied, changed uniforms uploaded
//! 4. **Swept**: resources neither used this frame nor held by a mesh are
//!    destroyed
//!
//! # Module Structure
//!
//! - [`device`]: the driver seam ([`GpuDevice`]) and its value types
//! - [`headless`]: recording device for tests and tooling
//! - [`state`]: redundancy-eliminating state tracker
//! - [`cache`]: keyed, reference-counted resource caches
//! - [`program`], [`shader_gen`]: shader variants and their generation
//! - [`lights`], [`render_list`]: per-frame collections
//! - [`context`]: the caches of one renderer
//! - [`settings`]: configuration

pub mod cache;
pub mod context;
pub mod device;
pub mod headless;
pub mod lights;
pub mod program;
pub mod render_list;
pub mod settings;
pub mod shader_gen;
pub mod state;

pub use cache::{GpuResource, ResourceCache, ResourceKey};
pub use context::{RendererContext, SweepReport};
pub use device::{GpuDevice, UniformValue, Viewport};
pub use headless::{DeviceCall, HeadlessDevice};
pub use lights::{LightAggregator, LightCounts};
pub use program::{Program, ProgramKey, ShaderDiagnostic};
pub use render_list::{RenderItem, RenderList};
pub use settings::{FallbackMode, RendererSettings};
pub use state::{GpuState, StateCounters};

use glam::{Affine3A, Mat3, Mat4};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::errors::{Result, StrataError};
use crate::renderer::cache::TextureKey;
use crate::renderer::lights::LightUniforms;
use crate::renderer::program::ProgramSlot;
use crate::resources::material::{Material, Side};
use crate::resources::mesh::Mesh;
use crate::scene::camera::Frustum;
use crate::scene::node::NodeComponent;
use crate::scene::traversal::{DepthFirstWalk, TraversalControl};
use crate::scene::{NodeHandle, Scene};
use crate::utils::interner;

/// Where the renderer is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    #[default]
    Idle,
    Traversing,
    Sorting,
    Drawing,
    Swept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// [`Renderer::init`] has not completed.
    NotInitialized,
    /// The GPU context is lost and has not been restored.
    ContextLost,
}

/// Result of one [`Renderer::render`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered,
    Skipped(SkipReason),
}

/// Per-frame statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frame: u64,
    pub draw_calls: u32,
    pub triangles: u64,
    /// Meshes missing geometry or material.
    pub skipped_meshes: u32,
    /// Meshes outside the camera frustum.
    pub culled_meshes: u32,
    /// Meshes whose shader variant failed to build.
    pub fallback_meshes: u32,
    pub programs: usize,
    pub vertex_arrays: usize,
    pub buffers: usize,
    pub textures: usize,
    /// Buffer and texture uploads.
    pub uploads: u64,
    pub state_calls_issued: u64,
    pub state_calls_elided: u64,
    /// Resources destroyed by this frame's sweep.
    pub swept: usize,
}

/// Retained-mode renderer over a [`GpuDevice`].
pub struct Renderer<D: GpuDevice> {
    gpu: GpuState<D>,
    settings: RendererSettings,
    context: RendererContext,
    render_list: RenderList,
    lights: LightAggregator,
    phase: FramePhase,
    initialized: bool,
    context_lost: bool,
    reinit_pending: bool,
    stats: RenderStats,
}

impl<D: GpuDevice> Renderer<D> {
    #[must_use]
    pub fn new(device: D, settings: RendererSettings) -> Self {
        let lights = LightAggregator::new(settings.max_lights_per_type);
        Self {
            gpu: GpuState::new(device),
            settings,
            context: RendererContext::new(),
            render_list: RenderList::new(),
            lights,
            phase: FramePhase::Idle,
            initialized: false,
            context_lost: false,
            reinit_pending: false,
            stats: RenderStats::default(),
        }
    }

    /// Prepares the renderer for drawing. Until this succeeds every
    /// [`render`](Self::render) call is skipped.
    pub fn init(&mut self) -> Result<()> {
        if self.gpu.is_context_lost() {
            return Err(StrataError::ContextLost);
        }
        interner::preload_option_names();
        self.gpu.invalidate();

        if self.settings.fallback == FallbackMode::Placeholder
            && let Err(err) = self.context.programs.init_placeholder(&mut self.gpu)
        {
            log::error!("Placeholder program unavailable: {err}");
        }

        self.initialized = true;
        self.reinit_pending = false;
        log::info!("Renderer initialized");
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[inline]
    #[must_use]
    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    /// Drops every cached driver object; they died with the context.
    /// Frames are skipped until [`handle_context_restored`](Self::handle_context_restored).
    pub fn handle_context_lost(&mut self) {
        if self.context_lost {
            return;
        }
        log::warn!("GPU context lost; invalidating caches");
        self.context_lost = true;
        self.initialized = false;
        self.context.invalidate();
        self.gpu.invalidate();
    }

    /// Resumes rendering. Initialization re-runs on the next frame and
    /// resources are recreated on demand.
    pub fn handle_context_restored(&mut self) {
        if !self.context_lost {
            return;
        }
        log::info!("GPU context restored");
        self.context_lost = false;
        self.reinit_pending = true;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.settings.viewport.width = width;
        self.settings.viewport.height = height;
    }

    /// Renders one frame of `scene` as seen from `camera`.
    ///
    /// Errors only on misuse (an unknown node, or one without a camera);
    /// everything else is logged and reflected in [`stats`](Self::stats).
    pub fn render(&mut self, scene: &mut Scene, camera: NodeHandle) -> Result<FrameOutcome> {
        if self.gpu.is_context_lost() {
            self.handle_context_lost();
        }
        if self.context_lost {
            return Ok(FrameOutcome::Skipped(SkipReason::ContextLost));
        }
        if !self.initialized {
            if !self.reinit_pending {
                return Ok(FrameOutcome::Skipped(SkipReason::NotInitialized));
            }
            self.init()?;
        }

        let camera_key = scene
            .get_node(camera)
            .ok_or(StrataError::NodeNotFound(camera))?
            .component()
            .as_camera()
            .ok_or(StrataError::CameraNotFound(camera))?;

        let frame = self.context.begin_frame();
        let counters_before = self.gpu.counters();
        let mut stats = RenderStats {
            frame,
            ..RenderStats::default()
        };

        scene.textures.drain_completions();
        self.release_removed(scene);

        // === Traversing ===
        self.phase = FramePhase::Traversing;
        // Forced: every pending transform write is observed, including on
        // nodes that opted out of automatic updates.
        scene.update_world_matrix(true);

        let camera_world = scene.nodes[camera].world_matrix;
        let Some(camera_component) = scene.cameras.get_mut(camera_key) else {
            return Err(StrataError::CameraNotFound(camera));
        };
        camera_component.update_view(&camera_world);
        let view = *camera_component.view_matrix();
        let projection = *camera_component.projection_matrix();
        let frustum = *camera_component.frustum();

        self.render_list.reset();
        self.lights.reset();
        self.lights.set_max_per_type(self.settings.max_lights_per_type);
        self.collect(scene, &view, &frustum, &mut stats);
        self.lights.finalize(&view);

        for item in self.render_list.iter() {
            if let Some(mesh) = scene.meshes.get_mut(item.mesh) {
                mesh.sort_depth = item.sort_depth;
            }
        }

        // === Sorting ===
        self.phase = FramePhase::Sorting;
        self.render_list.resolve_programs(self.lights.counts());
        self.render_list.sort();

        // === Drawing ===
        self.phase = FramePhase::Drawing;
        self.gpu.bind_framebuffer(None);
        self.gpu.set_viewport(self.settings.viewport);
        self.gpu.set_clear_color(self.settings.clear_color);
        // Depth clears honor the write mask.
        self.gpu.set_depth_mask(true);
        self.gpu.clear(true, true);

        let mut draw = DrawPass {
            gpu: &mut self.gpu,
            context: &mut self.context,
            lights: self.lights.uniforms(),
            fallback: self.settings.fallback,
            view,
            projection,
            stats: &mut stats,
        };
        for item in self.render_list.iter() {
            draw.draw(scene, item);
        }

        // === Swept ===
        self.phase = FramePhase::Swept;
        if self.settings.sweep_due(frame) {
            stats.swept = self.context.sweep(&mut self.gpu).total();
        }

        let counters = self.gpu.counters();
        stats.state_calls_issued = counters.issued - counters_before.issued;
        stats.state_calls_elided = counters.elided - counters_before.elided;
        stats.programs = self.context.programs.len();
        stats.vertex_arrays = self.context.vertex_arrays.len();
        stats.buffers = self.context.buffers.len();
        stats.textures = self.context.textures.len();
        stats.uploads = self.context.uploads();
        self.stats = stats;

        self.phase = FramePhase::Idle;
        Ok(FrameOutcome::Rendered)
    }

    /// Walks the scene, queueing visible meshes and collecting lights.
    fn collect(&mut self, scene: &Scene, view: &Mat4, frustum: &Frustum, stats: &mut RenderStats) {
        let culling = self.settings.frustum_culling;
        let mut walk = DepthFirstWalk::new(scene.root());

        while let Some(handle) = walk.next(&scene.nodes) {
            let node = &scene.nodes[handle];
            if !node.visible {
                walk.apply(TraversalControl::SkipSubtree);
                continue;
            }

            match node.component() {
                NodeComponent::Mesh(key) => {
                    let Some(mesh) = scene.meshes.get(key) else {
                        continue;
                    };
                    if !mesh.visible {
                        continue;
                    }
                    let (Some(geometry), Some(material)) = (&mesh.geometry, &mesh.material) else {
                        log::warn!("Mesh '{}' has no geometry or material, skipped", mesh.name);
                        stats.skipped_meshes += 1;
                        continue;
                    };

                    if culling && mesh.frustum_culled && !in_frustum(mesh, &node.world_matrix, frustum) {
                        stats.culled_meshes += 1;
                        continue;
                    }

                    let geometry = geometry.read();
                    let material = material.read();
                    let mut item = RenderItem::new(handle, key, node.world_matrix, material.shader_name());
                    item.render_order = material.render_order;
                    item.transparent = material.transparent;
                    item.lit = material.model.is_lit();
                    item.options = geometry.render_options().merged_with(&material.render_options());
                    self.render_list.add(item, view);
                }
                NodeComponent::Light(key) => {
                    if let Some(light) = scene.lights.get(key) {
                        self.lights.collect(light, &node.world_matrix);
                    }
                }
                NodeComponent::Camera(_) | NodeComponent::Empty => {}
            }
        }
    }

    /// Releases the references held by meshes removed from `scene`. Keys
    /// taken under an older generation point at dead entries and are
    /// dropped.
    fn release_removed(&mut self, scene: &mut Scene) {
        let generation = self.context.generation();
        for (held_in, key) in scene.take_released_resources() {
            if held_in == generation {
                self.context.release(&key);
            }
        }
    }

    /// Destroys every cached resource no mesh of `scene` holds, after
    /// applying the releases of meshes removed since the last frame.
    ///
    /// Runs between frames, so resources used by the last frame are
    /// destroyed too once nothing holds them. Does nothing while the
    /// context is lost.
    pub fn sweep(&mut self, scene: &mut Scene) -> SweepReport {
        if self.context_lost || self.gpu.is_context_lost() {
            return SweepReport::default();
        }
        self.release_removed(scene);
        self.context.sweep_unreferenced(&mut self.gpu)
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[must_use]
    pub fn render_list(&self) -> &RenderList {
        &self.render_list
    }

    #[must_use]
    pub fn lights(&self) -> &LightAggregator {
        &self.lights
    }

    #[must_use]
    pub fn context(&self) -> &RendererContext {
        &self.context
    }

    #[must_use]
    pub fn shader_diagnostics(&self) -> &[ShaderDiagnostic] {
        self.context.programs.diagnostics()
    }

    #[must_use]
    pub fn gpu(&self) -> &GpuState<D> {
        &self.gpu
    }

    #[must_use]
    pub fn device(&self) -> &D {
        self.gpu.device()
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut RendererSettings {
        &mut self.settings
    }
}

/// Whether the mesh's world-space bounding sphere touches the frustum.
/// Meshes without positions are never culled.
fn in_frustum(mesh: &Mesh, world: &Affine3A, frustum: &Frustum) -> bool {
    let Some(geometry) = &mesh.geometry else {
        return true;
    };
    let cached = geometry.read().bounding_sphere();
    let Some(sphere) = cached.or_else(|| geometry.write().compute_bounding_sphere()) else {
        return true;
    };
    let center = world.transform_point3(sphere.center);
    let scale = world
        .matrix3
        .x_axis
        .length()
        .max(world.matrix3.y_axis.length())
        .max(world.matrix3.z_axis.length());
    frustum.intersects_sphere(center, sphere.radius * scale)
}

fn apply_material_state<D: GpuDevice>(gpu: &mut GpuState<D>, material: &Material) {
    gpu.set_depth_test(material.depth_test);
    if material.depth_test {
        gpu.set_depth_func(material.depth_func);
    }
    gpu.set_depth_mask(material.depth_write);

    match material.side {
        Side::Front => {
            gpu.set_cull_enabled(true);
            gpu.set_cull_face(wgpu::Face::Back);
        }
        Side::Back => {
            gpu.set_cull_enabled(true);
            gpu.set_cull_face(wgpu::Face::Front);
        }
        Side::Double => gpu.set_cull_enabled(false),
    }

    match material.blending.state() {
        Some((func, equation)) => {
            gpu.set_blend_enabled(true);
            gpu.set_blend_func(func);
            gpu.set_blend_equation(equation);
        }
        None => gpu.set_blend_enabled(false),
    }
}

type UsedKeys = SmallVec<[ResourceKey; 12]>;

/// Borrowed frame state for the draw loop.
struct DrawPass<'a, D: GpuDevice> {
    gpu: &'a mut GpuState<D>,
    context: &'a mut RendererContext,
    lights: &'a LightUniforms,
    fallback: FallbackMode,
    view: Mat4,
    projection: Mat4,
    stats: &'a mut RenderStats,
}

impl<D: GpuDevice> DrawPass<'_, D> {
    fn draw(&mut self, scene: &mut Scene, item: &RenderItem) {
        let Some(key) = item.program else {
            return;
        };
        let Some(mesh) = scene.meshes.get_mut(item.mesh) else {
            return;
        };
        let (Some(geometry), Some(material)) = (mesh.geometry.clone(), mesh.material.clone()) else {
            return;
        };
        let geometry = geometry.read();
        let material = material.read();

        let mut used: UsedKeys = SmallVec::new();
        used.push(ResourceKey::Program(key));

        let program = self
            .context
            .programs
            .get_or_create(self.gpu, key, || shader_gen::generate(item.shader, &item.options));
        let slot = if program.is_blank() {
            self.stats.fallback_meshes += 1;
            match self.fallback {
                FallbackMode::Blank => {
                    self.hold(mesh, used);
                    return;
                }
                FallbackMode::Placeholder => ProgramSlot::Placeholder,
            }
        } else {
            ProgramSlot::Cached(key)
        };

        let Some(handle) = self.context.programs.program(slot).and_then(Program::handle) else {
            self.hold(mesh, used);
            return;
        };
        self.gpu.use_program(Some(handle));

        let prepared = self.context.prepare_geometry(self.gpu, &geometry, slot);
        used.extend(prepared.keys);
        self.gpu.bind_vertex_array(prepared.vertex_array);

        let mut samplers: SmallVec<[(&'static str, i32); 4]> = SmallVec::new();
        if slot != ProgramSlot::Placeholder {
            for (unit, (name, texture)) in (0u32..).zip(material.texture_slots()) {
                let bound = scene
                    .textures
                    .get(texture)
                    .and_then(|t| self.context.prepare_texture(self.gpu, texture, t));
                if bound.is_some() {
                    used.push(ResourceKey::Texture(TextureKey(texture)));
                }
                self.gpu.bind_texture(unit, bound);
                samplers.push((name, unit.cast_signed()));
            }
        }

        apply_material_state(self.gpu, &material);

        let model_view = self.view * Mat4::from(item.world_matrix);
        let normal_matrix = Mat3::from_mat4(model_view).inverse().transpose();
        if let Some(program) = self.context.programs.program_mut(slot) {
            let gpu = &mut *self.gpu;
            program.set_uniform(gpu, "modelViewMatrix", UniformValue::Mat4(model_view));
            program.set_uniform(gpu, "projectionMatrix", UniformValue::Mat4(self.projection));
            program.set_uniform(gpu, "viewMatrix", UniformValue::Mat4(self.view));
            program.set_uniform(gpu, "normalMatrix", UniformValue::Mat3(normal_matrix));

            program.set_uniform(gpu, "diffuse", UniformValue::Vec4(material.color));
            program.set_uniform(gpu, "opacity", UniformValue::Float(material.opacity));
            program.set_uniform(gpu, "alphaTest", UniformValue::Float(material.alpha_test));
            program.set_uniform(gpu, "emissive", UniformValue::Vec3(material.emissive));
            program.set_uniform(gpu, "specular", UniformValue::Vec3(material.specular));
            program.set_uniform(gpu, "shininess", UniformValue::Float(material.shininess));
            program.set_uniform(gpu, "roughness", UniformValue::Float(material.roughness));
            program.set_uniform(gpu, "metalness", UniformValue::Float(material.metalness));
            for (name, unit) in samplers {
                program.set_uniform(gpu, name, UniformValue::Int(unit));
            }
            if item.lit {
                for (name, value) in self.lights.values() {
                    program.set_uniform(gpu, name, value);
                }
            }
        }

        let count = geometry.draw_count();
        if count > 0 {
            let first = geometry.draw_start();
            match geometry.index() {
                Some(index) => self.gpu.draw_elements(geometry.topology, index.format, first, count),
                None => self.gpu.draw_arrays(geometry.topology, first, count),
            }
            self.stats.draw_calls += 1;
            self.stats.triangles += u64::from(geometry.triangle_count());
        }

        self.hold(mesh, used);
    }

    /// Marks `used` for this frame and moves the mesh's references to
    /// exactly that set: new keys are retained, dropped keys released.
    fn hold(&mut self, mesh: &mut Mesh, used: UsedKeys) {
        for key in &used {
            self.context.mark_used(key);
        }

        let generation = self.context.generation();
        if mesh.resource_generation != generation {
            // References from an earlier generation belong to dead entries or
            // to another renderer's caches.
            mesh.used_resources.clear();
            mesh.resource_generation = generation;
        }

        let current: FxHashSet<ResourceKey> = used.into_iter().collect();
        for key in current.difference(&mesh.used_resources) {
            self.context.retain(key);
        }
        for key in mesh.used_resources.difference(&current) {
            self.context.release(key);
        }
        mesh.used_resources = current;
    }
}
