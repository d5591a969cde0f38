//! Textures
//!
//! Texture decoding happens outside the engine. A texture starts out
//! not-ready; whoever loads it reports completion through a cloneable
//! [`TextureLoader`], possibly from another thread. The registry drains
//! completions at the start of each frame, so readiness only ever flips
//! between frames.

use std::borrow::Cow;
use std::sync::Arc;

use slotmap::{SlotMap, new_key_type};
use wgpu::TextureFormat;

use crate::resources::version_tracker::ChangeTracker;

new_key_type! {
    pub struct TextureHandle;
}

/// Texture metadata plus the optional decoded payload.
#[derive(Debug, Clone)]
pub struct Texture {
    pub name: Cow<'static, str>,
    width: u32,
    height: u32,
    format: TextureFormat,
    ready: bool,
    pixels: Option<Arc<[u8]>>,
    tracker: ChangeTracker,
}

impl Texture {
    fn pending(name: Cow<'static, str>) -> Self {
        Self {
            name,
            width: 0,
            height: 0,
            format: TextureFormat::Rgba8UnormSrgb,
            ready: false,
            pixels: None,
            tracker: ChangeTracker::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn pixels(&self) -> Option<&[u8]> {
        self.pixels.as_deref()
    }

    /// Bumps each time a load completes; the GPU copy is rebuilt when it moves.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }
}

/// Completion message sent by a loader.
#[derive(Debug, Clone)]
pub struct TextureReady {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixels: Option<Arc<[u8]>>,
}

/// Cloneable, `Send` completion sender handed to external loaders.
#[derive(Debug, Clone)]
pub struct TextureLoader {
    sender: flume::Sender<TextureReady>,
}

impl TextureLoader {
    /// Reports a finished load. Returns `false` if the registry is gone.
    pub fn complete(&self, ready: TextureReady) -> bool {
        self.sender.send(ready).is_ok()
    }
}

/// Owns all textures of a scene.
pub struct TextureRegistry {
    textures: SlotMap<TextureHandle, Texture>,
    sender: flume::Sender<TextureReady>,
    receiver: flume::Receiver<TextureReady>,
}

impl TextureRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            textures: SlotMap::with_key(),
            sender,
            receiver,
        }
    }

    /// Registers a texture that is not ready yet.
    pub fn create(&mut self, name: impl Into<Cow<'static, str>>) -> TextureHandle {
        self.textures.insert(Texture::pending(name.into()))
    }

    #[must_use]
    pub fn loader(&self) -> TextureLoader {
        TextureLoader {
            sender: self.sender.clone(),
        }
    }

    #[must_use]
    pub fn get(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle)
    }

    pub fn remove(&mut self, handle: TextureHandle) -> Option<Texture> {
        self.textures.remove(handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Applies every queued completion. Returns how many textures became ready.
    pub fn drain_completions(&mut self) -> usize {
        let mut applied = 0;
        for ready in self.receiver.try_iter() {
            let Some(texture) = self.textures.get_mut(ready.handle) else {
                log::debug!("Dropping completion for removed texture {:?}", ready.handle);
                continue;
            };
            texture.width = ready.width;
            texture.height = ready.height;
            texture.format = ready.format;
            texture.pixels = ready.pixels;
            texture.ready = true;
            texture.tracker.changed();
            applied += 1;
        }
        applied
    }
}

impl Default for TextureRegistry {
    fn default() -> Self {
        Self::new()
    }
}
