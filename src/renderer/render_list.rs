//! Render List
//!
//! Per-frame draw candidates, split into an opaque and a transparent queue.
//!
//! - Opaque: render order, then program (fewer program switches), then
//!   front to back (early depth rejection)
//! - Transparent: render order, then back to front (correct blending)
//!
//! Both sorts are stable, so ties keep traversal order.

use std::cmp::Ordering;

use glam::{Affine3A, Mat4, Vec3};

use crate::renderer::lights::LightCounts;
use crate::renderer::program::ProgramKey;
use crate::resources::render_options::RenderOptions;
use crate::scene::{MeshKey, NodeHandle};

/// One mesh queued for drawing this frame.
#[derive(Debug, Clone)]
pub struct RenderItem {
    pub node: NodeHandle,
    pub mesh: MeshKey,
    pub world_matrix: Affine3A,
    /// Positive distance in front of the camera along the view axis.
    pub sort_depth: f32,
    pub render_order: i32,
    pub transparent: bool,
    /// Whether the material reacts to scene lights.
    pub lit: bool,
    pub shader: &'static str,
    /// Geometry and material options; light counts are added on resolve.
    pub options: RenderOptions,
    pub program: Option<ProgramKey>,
}

impl RenderItem {
    #[must_use]
    pub fn new(node: NodeHandle, mesh: MeshKey, world_matrix: Affine3A, shader: &'static str) -> Self {
        Self {
            node,
            mesh,
            world_matrix,
            sort_depth: 0.0,
            render_order: 0,
            transparent: false,
            lit: false,
            shader,
            options: RenderOptions::new(),
            program: None,
        }
    }

    /// Merged option set and resulting program key for this frame's lights.
    fn resolve(&mut self, lights: LightCounts) {
        if self.lit {
            lights.apply_to(&mut self.options);
        }
        self.program = Some(ProgramKey::new(self.shader, &self.options));
    }
}

fn opaque_order(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.render_order
        .cmp(&b.render_order)
        .then_with(|| a.program.cmp(&b.program))
        .then_with(|| a.sort_depth.total_cmp(&b.sort_depth))
}

fn transparent_order(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.render_order
        .cmp(&b.render_order)
        .then_with(|| b.sort_depth.total_cmp(&a.sort_depth))
}

#[derive(Debug, Default)]
pub struct RenderList {
    opaque: Vec<RenderItem>,
    transparent: Vec<RenderItem>,
}

impl RenderList {
    #[must_use]
    pub fn new() -> Self {
        Self {
            opaque: Vec::with_capacity(512),
            transparent: Vec::with_capacity(128),
        }
    }

    pub fn reset(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
    }

    /// Queues `item`, computing its depth from the camera `view` matrix.
    pub fn add(&mut self, mut item: RenderItem, view: &Mat4) {
        let position = item.world_matrix.transform_point3(Vec3::ZERO);
        item.sort_depth = -view.transform_point3(position).z;
        if item.transparent {
            self.transparent.push(item);
        } else {
            self.opaque.push(item);
        }
    }

    /// Assigns every queued item its program key.
    pub fn resolve_programs(&mut self, lights: LightCounts) {
        for item in self.opaque.iter_mut().chain(self.transparent.iter_mut()) {
            item.resolve(lights);
        }
    }

    pub fn sort(&mut self) {
        self.opaque.sort_by(opaque_order);
        self.transparent.sort_by(transparent_order);
    }

    #[must_use]
    pub fn opaque(&self) -> &[RenderItem] {
        &self.opaque
    }

    #[must_use]
    pub fn transparent(&self) -> &[RenderItem] {
        &self.transparent
    }

    /// Draw order: opaque queue first, then transparent.
    pub fn iter(&self) -> impl Iterator<Item = &RenderItem> {
        self.opaque.iter().chain(self.transparent.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }
}
