//! Renderer Context
//!
//! [`RendererContext`] owns every GPU cache of one renderer: programs, vertex
//! arrays, buffers and textures. Caches are per renderer, never global, so
//! two renderers on two devices never share driver handles.
//!
//! The context also carries the frame counter and a *generation* that moves
//! whenever the caches are invalidated after a context loss. Generations are
//! unique across every context in the process, so a key held under one
//! context is never released into another. Meshes remember the generation
//! their held references belong to, and drop stale references without
//! releasing them.
//!
//! A mesh holds one reference set, so a scene is drawn by one renderer at a
//! time. A second renderer over the same scene takes the references over;
//! the first renderer's entries then stay alive until its caches are
//! invalidated.

use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::renderer::cache::{BufferKey, GpuResource, ResourceCache, ResourceKey, TextureKey, VertexArrayKey};
use crate::renderer::device::{
    BufferTarget, GpuBufferId, GpuDevice, GpuTextureId, GpuVertexArrayId, TextureDescriptor, VertexBinding,
};
use crate::renderer::program::{ProgramCache, ProgramSlot};
use crate::renderer::state::GpuState;
use crate::resources::geometry::Geometry;
use crate::resources::texture::{Texture, TextureHandle};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Uploaded vertex or index stream.
#[derive(Debug)]
pub struct GpuBuffer {
    pub handle: GpuBufferId,
    /// Source version the upload reflects.
    pub version: u64,
}

impl GpuResource for GpuBuffer {
    fn destroy<D: GpuDevice>(self, gpu: &mut GpuState<D>) {
        gpu.destroy_buffer(self.handle);
    }
}

#[derive(Debug)]
pub struct GpuTexture {
    pub handle: GpuTextureId,
    pub version: u64,
}

impl GpuResource for GpuTexture {
    fn destroy<D: GpuDevice>(self, gpu: &mut GpuState<D>) {
        gpu.destroy_texture(self.handle);
    }
}

/// Geometry layout bound to one program's attribute locations.
#[derive(Debug)]
pub struct VertexArray {
    pub handle: GpuVertexArrayId,
}

impl GpuResource for VertexArray {
    fn destroy<D: GpuDevice>(self, gpu: &mut GpuState<D>) {
        gpu.destroy_vertex_array(self.handle);
    }
}

/// Entries destroyed by one sweep, per cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub programs: usize,
    pub vertex_arrays: usize,
    pub buffers: usize,
    pub textures: usize,
}

impl SweepReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.programs + self.vertex_arrays + self.buffers + self.textures
    }
}

/// Driver objects prepared for one geometry draw.
#[derive(Debug, Default)]
pub struct PreparedGeometry {
    pub vertex_array: Option<GpuVertexArrayId>,
    /// Every cache entry the draw used.
    pub keys: Vec<ResourceKey>,
}

fn upload_buffer<D: GpuDevice>(
    buffers: &mut ResourceCache<BufferKey, GpuBuffer>,
    uploads: &mut u64,
    gpu: &mut GpuState<D>,
    key: BufferKey,
    target: BufferTarget,
    (version, bytes): (u64, &[u8]),
) -> GpuBufferId {
    let buffer = buffers.get_or_create(key, || {
        *uploads += 1;
        GpuBuffer {
            handle: gpu.create_buffer(target, bytes),
            version,
        }
    });
    if buffer.version != version {
        gpu.update_buffer(buffer.handle, bytes);
        buffer.version = version;
        *uploads += 1;
    }
    buffer.handle
}

#[derive(Debug)]
pub struct RendererContext {
    frame: u64,
    generation: u64,
    uploads: u64,
    pub programs: ProgramCache,
    pub vertex_arrays: ResourceCache<VertexArrayKey, VertexArray>,
    pub buffers: ResourceCache<BufferKey, GpuBuffer>,
    pub textures: ResourceCache<TextureKey, GpuTexture>,
}

impl Default for RendererContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            frame: 0,
            generation: next_generation(),
            uploads: 0,
            programs: ProgramCache::new(),
            vertex_arrays: ResourceCache::new("vertex_arrays"),
            buffers: ResourceCache::new("buffers"),
            textures: ResourceCache::new("textures"),
        }
    }

    /// Advances the frame counter and resets per-frame counters.
    pub fn begin_frame(&mut self) -> u64 {
        self.frame += 1;
        self.uploads = 0;
        self.programs.begin_frame(self.frame);
        self.vertex_arrays.begin_frame(self.frame);
        self.buffers.begin_frame(self.frame);
        self.textures.begin_frame(self.frame);
        self.frame
    }

    #[inline]
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Identifies the current set of driver objects; bumped on invalidation.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Buffer and texture uploads issued since `begin_frame`.
    #[inline]
    #[must_use]
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    // ========================================================================
    // Reference bookkeeping by key
    // ========================================================================

    pub fn retain(&mut self, key: &ResourceKey) -> bool {
        match key {
            ResourceKey::Program(k) => self.programs.retain(k),
            ResourceKey::VertexArray(k) => self.vertex_arrays.retain(k),
            ResourceKey::Buffer(k) => self.buffers.retain(k),
            ResourceKey::Texture(k) => self.textures.retain(k),
        }
    }

    pub fn release(&mut self, key: &ResourceKey) -> bool {
        match key {
            ResourceKey::Program(k) => self.programs.release(k),
            ResourceKey::VertexArray(k) => self.vertex_arrays.release(k),
            ResourceKey::Buffer(k) => self.buffers.release(k),
            ResourceKey::Texture(k) => self.textures.release(k),
        }
    }

    pub fn mark_used(&mut self, key: &ResourceKey) -> bool {
        match key {
            ResourceKey::Program(k) => self.programs.mark_used(k),
            ResourceKey::VertexArray(k) => self.vertex_arrays.mark_used(k),
            ResourceKey::Buffer(k) => self.buffers.mark_used(k),
            ResourceKey::Texture(k) => self.textures.mark_used(k),
        }
    }

    #[must_use]
    pub fn ref_count(&self, key: &ResourceKey) -> Option<u32> {
        match key {
            ResourceKey::Program(k) => self.programs.ref_count(k),
            ResourceKey::VertexArray(k) => self.vertex_arrays.ref_count(k),
            ResourceKey::Buffer(k) => self.buffers.ref_count(k),
            ResourceKey::Texture(k) => self.textures.ref_count(k),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.ref_count(key).is_some()
    }

    // ========================================================================
    // Uploads
    // ========================================================================

    /// Returns the buffer for `key`, creating it or re-uploading `bytes` when
    /// `version` moved since the last upload.
    pub fn prepare_buffer<D: GpuDevice>(
        &mut self,
        gpu: &mut GpuState<D>,
        key: BufferKey,
        target: BufferTarget,
        version: u64,
        bytes: &[u8],
    ) -> GpuBufferId {
        upload_buffer(&mut self.buffers, &mut self.uploads, gpu, key, target, (version, bytes))
    }

    /// Uploads the attribute streams of `geometry` read by the program in
    /// `slot` and binds them to its attribute locations. Attributes the
    /// program does not read are not uploaded.
    pub fn prepare_geometry<D: GpuDevice>(
        &mut self,
        gpu: &mut GpuState<D>,
        geometry: &Geometry,
        slot: ProgramSlot,
    ) -> PreparedGeometry {
        let Self {
            programs,
            buffers,
            vertex_arrays,
            uploads,
            ..
        } = self;
        let mut prepared = PreparedGeometry::default();
        let Some(program) = programs.program(slot) else {
            return prepared;
        };

        let mut bindings: SmallVec<[VertexBinding; 8]> = SmallVec::new();
        for (name, attribute) in geometry.attributes() {
            let Some(location) = program.attribute_location(name) else {
                continue;
            };
            let key = BufferKey(attribute.id());
            let buffer = upload_buffer(
                buffers,
                uploads,
                gpu,
                key,
                BufferTarget::Vertex,
                (attribute.version(), attribute.bytes()),
            );
            prepared.keys.push(ResourceKey::Buffer(key));
            bindings.push(VertexBinding {
                location,
                buffer,
                format: attribute.format,
                offset: attribute.offset,
                stride: attribute.stride,
            });
        }

        let index = geometry.index().map(|index| {
            let key = BufferKey(index.id());
            prepared.keys.push(ResourceKey::Buffer(key));
            upload_buffer(buffers, uploads, gpu, key, BufferTarget::Index, (index.version(), index.bytes()))
        });

        let key = VertexArrayKey {
            geometry: geometry.id(),
            layout_version: geometry.layout_version(),
            program: program.id(),
        };
        let vertex_array = vertex_arrays.get_or_create(key, || VertexArray {
            handle: gpu.create_vertex_array(&bindings, index),
        });
        prepared.vertex_array = Some(vertex_array.handle);
        prepared.keys.push(ResourceKey::VertexArray(key));
        prepared
    }

    /// Returns the GPU copy of a ready texture, rebuilding it when the
    /// texture reloaded. Pending textures yield `None`.
    pub fn prepare_texture<D: GpuDevice>(
        &mut self,
        gpu: &mut GpuState<D>,
        handle: TextureHandle,
        texture: &Texture,
    ) -> Option<GpuTextureId> {
        if !texture.is_ready() {
            return None;
        }
        let (width, height) = texture.size();
        let desc = TextureDescriptor {
            label: &texture.name,
            width,
            height,
            format: texture.format(),
        };
        let key = TextureKey(handle);
        let version = texture.version();

        let uploads = &mut self.uploads;
        let gpu_texture = self.textures.get_or_create(key, || {
            *uploads += 1;
            GpuTexture {
                handle: gpu.create_texture(&desc, texture.pixels()),
                version,
            }
        });
        if gpu_texture.version == version {
            return Some(gpu_texture.handle);
        }

        let replacement = GpuTexture {
            handle: gpu.create_texture(&desc, texture.pixels()),
            version,
        };
        let handle = replacement.handle;
        *uploads += 1;
        if let Some(old) = self.textures.replace(&key, replacement) {
            old.destroy(gpu);
        }
        Some(handle)
    }

    // ========================================================================
    // Lifetime
    // ========================================================================

    /// Destroys everything unreferenced and unused this frame.
    pub fn sweep<D: GpuDevice>(&mut self, gpu: &mut GpuState<D>) -> SweepReport {
        let report = SweepReport {
            programs: self.programs.sweep(gpu),
            vertex_arrays: self.vertex_arrays.sweep(gpu),
            buffers: self.buffers.sweep(gpu),
            textures: self.textures.sweep(gpu),
        };
        if report.total() > 0 {
            log::debug!("Frame {}: swept {:?}", self.frame, report);
        }
        report
    }

    /// Destroys everything no mesh holds, whether or not it was used in the
    /// last frame. Meant for calls between frames.
    pub fn sweep_unreferenced<D: GpuDevice>(&mut self, gpu: &mut GpuState<D>) -> SweepReport {
        let report = SweepReport {
            programs: self.programs.sweep_unreferenced(gpu),
            vertex_arrays: self.vertex_arrays.sweep_unreferenced(gpu),
            buffers: self.buffers.sweep_unreferenced(gpu),
            textures: self.textures.sweep_unreferenced(gpu),
        };
        if report.total() > 0 {
            log::debug!("Swept between frames: {:?}", report);
        }
        report
    }

    /// Forgets every driver object after a context loss and starts a new
    /// generation.
    pub fn invalidate(&mut self) {
        let dropped = self.programs.invalidate()
            + self.vertex_arrays.invalidate()
            + self.buffers.invalidate()
            + self.textures.invalidate();
        self.generation = next_generation();
        log::info!("GPU caches invalidated ({dropped} entries), generation {}", self.generation);
    }
}
