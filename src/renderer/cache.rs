//! GPU Resource Cache
//!
//! [`ResourceCache`] maps a content key to a driver object plus two pieces of
//! lifetime bookkeeping:
//!
//! - `last_used_frame`: the frame the entry was last drawn with
//! - `ref_count`: how many meshes currently hold the entry
//!
//! [`ResourceCache::sweep`] destroys entries that were not used in the
//! current frame *and* are not held by any mesh. Nothing is destroyed while
//! a consumer still references it.

use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::renderer::device::GpuDevice;
use crate::renderer::program::ProgramKey;
use crate::renderer::state::GpuState;
use crate::resources::texture::TextureHandle;

/// A cached driver object that knows how to release itself.
pub trait GpuResource {
    fn destroy<D: GpuDevice>(self, gpu: &mut GpuState<D>);
}

/// Vertex array identity: geometry layout bound for one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayKey {
    pub geometry: u64,
    pub layout_version: u64,
    pub program: u64,
}

/// Buffer identity: the attribute or index stream id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferKey(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureKey(pub TextureHandle);

/// Any cache entry a mesh can hold a reference on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Program(ProgramKey),
    VertexArray(VertexArrayKey),
    Buffer(BufferKey),
    Texture(TextureKey),
}

impl ResourceKey {
    #[must_use]
    pub fn as_program(&self) -> Option<&ProgramKey> {
        match self {
            ResourceKey::Program(key) => Some(key),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct CacheEntry<R> {
    resource: R,
    last_used_frame: u64,
    ref_count: u32,
}

/// Keyed store of GPU resources with frame-based sweeping.
#[derive(Debug)]
pub struct ResourceCache<K, R> {
    label: &'static str,
    entries: FxHashMap<K, CacheEntry<R>>,
    frame: u64,
    created: u64,
    destroyed: u64,
}

impl<K, R> ResourceCache<K, R>
where
    K: Eq + Hash + Clone + Debug,
    R: GpuResource,
{
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: FxHashMap::default(),
            frame: 0,
            created: 0,
            destroyed: 0,
        }
    }

    /// Sets the frame that `mark_used`, new entries and `sweep` refer to.
    pub fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&R> {
        self.entries.get(key).map(|e| &e.resource)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut R> {
        self.entries.get_mut(key).map(|e| &mut e.resource)
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the entry for `key`, creating it with `factory` on a miss.
    /// New entries count as used in the current frame.
    pub fn get_or_create(&mut self, key: K, factory: impl FnOnce() -> R) -> &mut R {
        let frame = self.frame;
        let created = &mut self.created;
        &mut self
            .entries
            .entry(key)
            .or_insert_with(|| {
                *created += 1;
                CacheEntry {
                    resource: factory(),
                    last_used_frame: frame,
                    ref_count: 0,
                }
            })
            .resource
    }

    /// Fallible variant of [`Self::get_or_create`]; nothing is cached on error.
    pub fn get_or_try_create(&mut self, key: K, factory: impl FnOnce() -> Result<R>) -> Result<&mut R> {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(&mut entry.into_mut().resource),
            Entry::Vacant(slot) => {
                let resource = factory()?;
                self.created += 1;
                let entry = slot.insert(CacheEntry {
                    resource,
                    last_used_frame: self.frame,
                    ref_count: 0,
                });
                Ok(&mut entry.resource)
            }
        }
    }

    /// Replaces the resource under `key`, keeping its bookkeeping.
    /// Returns the previous resource for the caller to destroy.
    pub fn replace(&mut self, key: &K, resource: R) -> Option<R> {
        self.entries
            .get_mut(key)
            .map(|entry| std::mem::replace(&mut entry.resource, resource))
    }

    /// Records a use in the current frame.
    pub fn mark_used(&mut self, key: &K) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used_frame = self.frame;
                true
            }
            None => false,
        }
    }

    pub fn retain(&mut self, key: &K) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.ref_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn release(&mut self, key: &K) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                if entry.ref_count == 0 {
                    log::warn!("{}: release of unreferenced entry {:?}", self.label, key);
                }
                entry.ref_count = entry.ref_count.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn ref_count(&self, key: &K) -> Option<u32> {
        self.entries.get(key).map(|e| e.ref_count)
    }

    #[must_use]
    pub fn last_used_frame(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|e| e.last_used_frame)
    }

    /// Destroys every entry that is unreferenced and was not used in the
    /// current frame. Returns how many were destroyed.
    pub fn sweep<D: GpuDevice>(&mut self, gpu: &mut GpuState<D>) -> usize {
        let frame = self.frame;
        self.destroy_where(gpu, |e| e.ref_count == 0 && e.last_used_frame != frame)
    }

    /// Destroys every unreferenced entry, including ones used in the current
    /// frame. Only valid between frames.
    pub fn sweep_unreferenced<D: GpuDevice>(&mut self, gpu: &mut GpuState<D>) -> usize {
        self.destroy_where(gpu, |e| e.ref_count == 0)
    }

    fn destroy_where<D: GpuDevice>(
        &mut self,
        gpu: &mut GpuState<D>,
        stale: impl Fn(&CacheEntry<R>) -> bool,
    ) -> usize {
        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| stale(e))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &stale {
            if let Some(entry) = self.entries.remove(key) {
                log::debug!("{}: sweeping {:?}", self.label, key);
                entry.resource.destroy(gpu);
            }
        }
        self.destroyed += stale.len() as u64;
        stale.len()
    }

    /// Forgets every entry without touching the device. Used after context
    /// loss, when the driver objects are already gone.
    pub fn invalidate(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lifetime totals: `(created, destroyed)`.
    #[must_use]
    pub fn totals(&self) -> (u64, u64) {
        (self.created, self.destroyed)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::{BufferTarget, GpuBufferId};
    use crate::renderer::headless::HeadlessDevice;

    struct TestBuffer(GpuBufferId);

    impl GpuResource for TestBuffer {
        fn destroy<D: GpuDevice>(self, gpu: &mut GpuState<D>) {
            gpu.destroy_buffer(self.0);
        }
    }

    fn cache_with_entry(gpu: &mut GpuState<HeadlessDevice>) -> ResourceCache<u32, TestBuffer> {
        let mut cache = ResourceCache::new("test");
        cache.begin_frame(1);
        cache.get_or_create(7, || TestBuffer(gpu.create_buffer(BufferTarget::Vertex, &[0; 4])));
        cache
    }

    #[test]
    fn factory_runs_once() {
        let mut gpu = GpuState::new(HeadlessDevice::new());
        let mut cache = cache_with_entry(&mut gpu);
        let mut calls = 0;
        cache.get_or_create(7, || {
            calls += 1;
            TestBuffer(GpuBufferId(0))
        });
        assert_eq!(calls, 0);
        assert_eq!(cache.totals(), (1, 0));
    }

    #[test]
    fn sweep_keeps_used_and_referenced() {
        let mut gpu = GpuState::new(HeadlessDevice::new());
        let mut cache = cache_with_entry(&mut gpu);

        // Used this frame: kept.
        assert_eq!(cache.sweep(&mut gpu), 0);

        // Not used, but referenced: kept.
        cache.retain(&7);
        cache.begin_frame(2);
        assert_eq!(cache.sweep(&mut gpu), 0);

        // Not used, unreferenced: destroyed.
        cache.release(&7);
        assert_eq!(cache.sweep(&mut gpu), 1);
        assert!(cache.is_empty());
        assert_eq!(gpu.device().live_buffer_count(), 0);
    }

    #[test]
    fn unreferenced_sweep_ignores_last_use() {
        let mut gpu = GpuState::new(HeadlessDevice::new());
        let mut cache = cache_with_entry(&mut gpu);
        cache.get_or_create(8, || TestBuffer(gpu.create_buffer(BufferTarget::Vertex, &[0; 4])));
        cache.retain(&8);

        assert_eq!(cache.sweep_unreferenced(&mut gpu), 1);
        assert!(!cache.contains(&7));
        assert!(cache.contains(&8));
        assert_eq!(gpu.device().live_buffer_count(), 1);
    }

    #[test]
    fn try_create_error_caches_nothing() {
        let mut cache: ResourceCache<u32, TestBuffer> = ResourceCache::new("test");
        let result = cache.get_or_try_create(1, || Err(crate::errors::StrataError::ContextLost));
        assert!(result.is_err());
        assert!(!cache.contains(&1));
    }
}
