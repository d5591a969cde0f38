use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashSet;

use crate::renderer::cache::ResourceKey;
use crate::resources::geometry::GeometryRef;
use crate::resources::material::MaterialRef;

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Renderable component: a geometry drawn with a material.
///
/// Either reference may be absent; such meshes are skipped at draw time
/// with a warning instead of failing the frame.
///
/// The mesh also records which cached GPU resources it currently holds a
/// reference on, so they can be released when it stops using them or is
/// removed from the scene.
#[derive(Debug)]
pub struct Mesh {
    id: u64,
    pub name: Cow<'static, str>,

    pub geometry: Option<GeometryRef>,
    pub material: Option<MaterialRef>,

    pub visible: bool,
    /// Participates in frustum culling when the renderer has it enabled.
    pub frustum_culled: bool,

    pub(crate) sort_depth: f32,
    pub(crate) used_resources: FxHashSet<ResourceKey>,
    pub(crate) resource_generation: u64,
}

/// A clone is a new mesh: it gets its own id and holds no GPU references.
impl Clone for Mesh {
    fn clone(&self) -> Self {
        Self {
            geometry: self.geometry.clone(),
            material: self.material.clone(),
            visible: self.visible,
            frustum_culled: self.frustum_culled,
            ..Self::empty(self.name.clone())
        }
    }
}

impl Mesh {
    #[must_use]
    pub fn new(geometry: GeometryRef, material: MaterialRef) -> Self {
        let mut mesh = Self::empty("Mesh");
        mesh.geometry = Some(geometry);
        mesh.material = Some(material);
        mesh
    }

    /// Mesh without geometry or material; both can be assigned later.
    #[must_use]
    pub fn empty(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            geometry: None,
            material: None,
            visible: true,
            frustum_culled: true,
            sort_depth: 0.0,
            used_resources: FxHashSet::default(),
            resource_generation: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// View-space distance computed during the last render traversal.
    #[inline]
    #[must_use]
    pub fn sort_depth(&self) -> f32 {
        self.sort_depth
    }

    /// GPU cache entries this mesh currently holds a reference on.
    #[inline]
    #[must_use]
    pub fn used_resources(&self) -> &FxHashSet<ResourceKey> {
        &self.used_resources
    }

    /// Takes the held references, leaving the set empty.
    pub(crate) fn take_used_resources(&mut self) -> FxHashSet<ResourceKey> {
        std::mem::take(&mut self.used_resources)
    }
}
