//! Geometry
//!
//! CPU-side vertex attributes and optional index data. The renderer uploads
//! each attribute to its own GPU buffer, keyed by the attribute's id, and
//! re-uploads only when the attribute's version moves.
//!
//! Geometry is shared between meshes through [`GeometryRef`].

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use glam::Vec3;
use parking_lot::RwLock;
use wgpu::{IndexFormat, PrimitiveTopology, VertexFormat};

use crate::resources::render_options::RenderOptions;
use crate::resources::version_tracker::{ChangeTracker, MutGuard};

/// Shared, lockable geometry.
pub type GeometryRef = Arc<RwLock<Geometry>>;

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Well-known attribute names.
pub mod attribute_names {
    pub const POSITION: &str = "position";
    pub const NORMAL: &str = "normal";
    pub const UV: &str = "uv";
    pub const COLOR: &str = "color";
    pub const TANGENT: &str = "tangent";
    pub const SKIN_INDEX: &str = "skinIndex";
    pub const SKIN_WEIGHT: &str = "skinWeight";
}

bitflags! {
    /// Attributes present on a geometry, as they affect shader variants.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct GeometryFeatures: u32 {
        const HAS_NORMAL   = 1 << 0;
        const HAS_UV       = 1 << 1;
        const HAS_COLOR    = 1 << 2;
        const HAS_TANGENT  = 1 << 3;
        const HAS_SKINNING = 1 << 4;
    }
}

/// One vertex attribute stream.
#[derive(Debug, Clone)]
pub struct Attribute {
    id: u64,
    data: Vec<u8>,
    tracker: ChangeTracker,
    pub format: VertexFormat,
    pub offset: u64,
    pub stride: u64,
    pub count: u32,
}

impl Attribute {
    /// Tightly packed attribute; stride is the element size.
    pub fn new_planar<T: bytemuck::Pod>(data: &[T], format: VertexFormat) -> Self {
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            data: bytemuck::cast_slice(data).to_vec(),
            tracker: ChangeTracker::new(),
            format,
            offset: 0,
            stride: std::mem::size_of::<T>() as u64,
            count: data.len() as u32,
        }
    }

    /// Buffer identity; stable for the attribute's lifetime.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Replaces the contents. The element count follows the new data.
    pub fn update_data<T: bytemuck::Pod>(&mut self, data: &[T]) {
        self.data.clear();
        self.data.extend_from_slice(bytemuck::cast_slice(data));
        self.count = data.len() as u32;
        self.tracker.changed();
    }

    /// Raw mutable access; the version bumps when the guard drops.
    pub fn bytes_mut(&mut self) -> MutGuard<'_, Vec<u8>> {
        MutGuard::new(&mut self.data, &mut self.tracker)
    }

    /// Reads element `index` as three floats. `None` when out of bounds.
    fn read_vec3(&self, index: u32) -> Option<Vec3> {
        let start = (self.offset + u64::from(index) * self.stride) as usize;
        let bytes = self.data.get(start..start + 12)?;
        let [x, y, z]: [f32; 3] = bytemuck::pod_read_unaligned(bytes);
        Some(Vec3::new(x, y, z))
    }
}

/// Index stream.
#[derive(Debug, Clone)]
pub struct IndexAttribute {
    id: u64,
    data: Vec<u8>,
    tracker: ChangeTracker,
    pub format: IndexFormat,
    pub count: u32,
}

impl IndexAttribute {
    #[must_use]
    pub fn from_u16(indices: &[u16]) -> Self {
        Self::from_raw(bytemuck::cast_slice(indices).to_vec(), IndexFormat::Uint16, indices.len())
    }

    #[must_use]
    pub fn from_u32(indices: &[u32]) -> Self {
        Self::from_raw(bytemuck::cast_slice(indices).to_vec(), IndexFormat::Uint32, indices.len())
    }

    fn from_raw(data: Vec<u8>, format: IndexFormat, count: usize) -> Self {
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            data,
            tracker: ChangeTracker::new(),
            format,
            count: count as u32,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn update_u32(&mut self, indices: &[u32]) {
        self.data = bytemuck::cast_slice(indices).to_vec();
        self.format = IndexFormat::Uint32;
        self.count = indices.len() as u32;
        self.tracker.changed();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Vertex data plus draw parameters.
#[derive(Debug, Clone)]
pub struct Geometry {
    id: u64,
    attributes: BTreeMap<String, Attribute>,
    index: Option<IndexAttribute>,
    pub topology: PrimitiveTopology,
    /// Sub-range of vertices (or indices) to draw; `None` draws everything.
    pub draw_range: Option<Range<u32>>,
    layout: ChangeTracker,
    bounds: Option<(u64, BoundingSphere)>,
}

impl Geometry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed),
            attributes: BTreeMap::new(),
            index: None,
            topology: PrimitiveTopology::TriangleList,
            draw_range: None,
            layout: ChangeTracker::new(),
            bounds: None,
        }
    }

    /// Wraps the geometry for sharing between meshes.
    #[must_use]
    pub fn shared(self) -> GeometryRef {
        Arc::new(RwLock::new(self))
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bumps whenever attributes or the index stream are added or removed.
    #[inline]
    #[must_use]
    pub fn layout_version(&self) -> u64 {
        self.layout.version()
    }

    pub fn set_attribute(&mut self, name: &str, attribute: Attribute) {
        if name == attribute_names::POSITION {
            self.bounds = None;
        }
        self.attributes.insert(name.to_owned(), attribute);
        self.layout.changed();
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let removed = self.attributes.remove(name);
        if removed.is_some() {
            self.layout.changed();
        }
        removed
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.get_mut(name)
    }

    /// Attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(name, attr)| (name.as_str(), attr))
    }

    pub fn set_index(&mut self, index: IndexAttribute) {
        self.index = Some(index);
        self.layout.changed();
    }

    #[must_use]
    pub fn index(&self) -> Option<&IndexAttribute> {
        self.index.as_ref()
    }

    pub fn index_mut(&mut self) -> Option<&mut IndexAttribute> {
        self.index.as_mut()
    }

    #[must_use]
    pub fn features(&self) -> GeometryFeatures {
        let mut features = GeometryFeatures::empty();
        features.set(GeometryFeatures::HAS_NORMAL, self.attributes.contains_key(attribute_names::NORMAL));
        features.set(GeometryFeatures::HAS_UV, self.attributes.contains_key(attribute_names::UV));
        features.set(GeometryFeatures::HAS_COLOR, self.attributes.contains_key(attribute_names::COLOR));
        features.set(GeometryFeatures::HAS_TANGENT, self.attributes.contains_key(attribute_names::TANGENT));
        features.set(
            GeometryFeatures::HAS_SKINNING,
            self.attributes.contains_key(attribute_names::SKIN_INDEX)
                && self.attributes.contains_key(attribute_names::SKIN_WEIGHT),
        );
        features
    }

    /// Shader options implied by the attributes present.
    #[must_use]
    pub fn render_options(&self) -> RenderOptions {
        let mut options = RenderOptions::new();
        for (name, _) in self.features().iter_names() {
            options.set_flag(name);
        }
        options
    }

    /// Number of elements the draw call covers: indices when indexed,
    /// positions otherwise, clipped to `draw_range`.
    #[must_use]
    pub fn draw_count(&self) -> u32 {
        let total = match &self.index {
            Some(index) => index.count,
            None => self.attribute(attribute_names::POSITION).map_or(0, |a| a.count),
        };
        match &self.draw_range {
            Some(range) => range.end.min(total).saturating_sub(range.start),
            None => total,
        }
    }

    #[must_use]
    pub fn draw_start(&self) -> u32 {
        self.draw_range.as_ref().map_or(0, |r| r.start)
    }

    /// Primitive count for statistics; zero for point and line topologies.
    #[must_use]
    pub fn triangle_count(&self) -> u32 {
        let count = self.draw_count();
        match self.topology {
            PrimitiveTopology::TriangleList => count / 3,
            PrimitiveTopology::TriangleStrip => count.saturating_sub(2),
            _ => 0,
        }
    }

    /// Cached bounding sphere, valid for the current position data.
    #[must_use]
    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        let positions = self.attribute(attribute_names::POSITION)?;
        self.bounds
            .filter(|(version, _)| *version == positions.version())
            .map(|(_, sphere)| sphere)
    }

    /// Recomputes the bounding sphere from the position attribute.
    ///
    /// Center is the AABB midpoint; radius is the farthest vertex from it.
    pub fn compute_bounding_sphere(&mut self) -> Option<BoundingSphere> {
        let positions = self.attribute(attribute_names::POSITION)?;
        let version = positions.version();
        let points: Vec<Vec3> = (0..positions.count).filter_map(|i| positions.read_vec3(i)).collect();
        if points.is_empty() {
            return None;
        }

        let (min, max) = points
            .iter()
            .fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(min, max), p| {
                (min.min(*p), max.max(*p))
            });
        let center = (min + max) * 0.5;
        let radius = points
            .iter()
            .map(|p| p.distance_squared(center))
            .fold(0.0_f32, f32::max)
            .sqrt();

        let sphere = BoundingSphere { center, radius };
        self.bounds = Some((version, sphere));
        Some(sphere)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}
