use std::borrow::Cow;

use glam::{Affine3A, Mat4, Vec3};
use uuid::Uuid;

use crate::scene::transform::Transform;
use crate::scene::{CameraKey, LightKey, MeshKey, NodeHandle};

/// The kind-specific payload a node carries.
///
/// Meshes, lights and cameras live in the [`Scene`](crate::scene::Scene)'s
/// component pools; the node only stores the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeComponent {
    /// Pure grouping node.
    #[default]
    Empty,
    Mesh(MeshKey),
    Light(LightKey),
    Camera(CameraKey),
}

impl NodeComponent {
    #[inline]
    #[must_use]
    pub fn as_mesh(self) -> Option<MeshKey> {
        match self {
            NodeComponent::Mesh(key) => Some(key),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_light(self) -> Option<LightKey> {
        match self {
            NodeComponent::Light(key) => Some(key),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_camera(self) -> Option<CameraKey> {
        match self {
            NodeComponent::Camera(key) => Some(key),
            _ => None,
        }
    }
}

/// A scene graph node.
///
/// # Hierarchy
///
/// - `parent`: `None` for the scene root and for detached nodes
/// - `children`: ordered child handles; traversal visits them in this order
///
/// Hierarchy links are only mutated through [`Scene`](crate::scene::Scene)
/// so parent and child always agree.
///
/// # World matrix
///
/// `world_matrix` is the product of the ancestors' local matrices and this
/// node's local matrix, as of the last world update. `world_revision` bumps
/// each time it is recomputed; a child recomposes when the revision it last
/// saw from its parent differs.
#[derive(Debug, Clone)]
pub struct Node {
    pub uuid: Uuid,
    pub name: Cow<'static, str>,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub transform: Transform,
    /// Up hint used by `look_at`.
    pub up: Vec3,

    pub(crate) world_matrix: Affine3A,
    pub(crate) world_revision: u64,
    pub(crate) parent_revision: u64,
    pub(crate) world_dirty: bool,

    /// Invisible nodes are skipped together with their subtree during
    /// render traversal.
    pub visible: bool,
    /// When false, non-forced world updates leave this node's world matrix
    /// untouched.
    pub auto_update_world_matrix: bool,
    /// When false, non-forced world updates do not descend into children.
    pub auto_update_children: bool,

    pub(crate) component: NodeComponent,
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            up: Vec3::Y,
            world_matrix: Affine3A::IDENTITY,
            world_revision: 0,
            parent_revision: 0,
            world_dirty: true,
            visible: true,
            auto_update_world_matrix: true,
            auto_update_children: true,
            component: NodeComponent::Empty,
        }
    }

    #[must_use]
    pub(crate) fn with_component(name: impl Into<Cow<'static, str>>, component: NodeComponent) -> Self {
        let mut node = Self::new(name);
        node.component = component;
        node
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn component(&self) -> NodeComponent {
        self.component
    }

    /// World matrix as of the last world update.
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        Mat4::from(self.world_matrix)
    }

    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.translation.into()
    }

    #[inline]
    #[must_use]
    pub fn world_revision(&self) -> u64 {
        self.world_revision
    }

    /// Forces this node's world matrix to be recomputed on the next update.
    #[inline]
    pub fn mark_world_dirty(&mut self) {
        self.world_dirty = true;
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new("Node")
    }
}
