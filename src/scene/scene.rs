use std::borrow::Cow;

use glam::{Affine3A, Quat, Vec3};
use slotmap::SlotMap;

use crate::errors::{Result, StrataError};
use crate::renderer::cache::ResourceKey;
use crate::resources::mesh::Mesh;
use crate::resources::texture::TextureRegistry;
use crate::scene::camera::Camera;
use crate::scene::light::Light;
use crate::scene::node::{Node, NodeComponent};
use crate::scene::transform::look_at_rotation;
use crate::scene::transform_system;
use crate::scene::traversal::{self, TraversalControl};
use crate::scene::{CameraKey, LightKey, MeshKey, NodeHandle};

/// Scene graph container.
///
/// Owns every node and component. Nodes form a single tree under
/// [`Scene::root`]; a node removed from its parent with [`Scene::detach`]
/// stays alive but is not traversed until it is attached again.
///
/// All hierarchy edits go through the scene so that a node's `parent` and
/// its parent's `children` always agree.
pub struct Scene {
    pub(crate) nodes: SlotMap<NodeHandle, Node>,
    root: NodeHandle,

    pub(crate) meshes: SlotMap<MeshKey, Mesh>,
    pub(crate) lights: SlotMap<LightKey, Light>,
    pub(crate) cameras: SlotMap<CameraKey, Camera>,

    pub textures: TextureRegistry,

    /// References dropped by removed meshes, tagged with the renderer
    /// generation they were taken in.
    released_resources: Vec<(u64, ResourceKey)>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new("Scene"));
        Self {
            nodes,
            root,
            meshes: SlotMap::with_key(),
            lights: SlotMap::with_key(),
            cameras: SlotMap::with_key(),
            textures: TextureRegistry::new(),
            released_resources: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    // ========================================================================
    // Node creation
    // ========================================================================

    /// Inserts `node` under a parent known to be alive.
    fn spawn(&mut self, node: Node, parent: NodeHandle) -> NodeHandle {
        let handle = self.nodes.insert(node);
        self.link(handle, parent);
        handle
    }

    fn ensure_node(&self, handle: NodeHandle) -> Result<()> {
        if self.nodes.contains_key(handle) {
            Ok(())
        } else {
            Err(StrataError::NodeNotFound(handle))
        }
    }

    /// Creates an empty group node under the root.
    pub fn create_node(&mut self, name: impl Into<Cow<'static, str>>) -> NodeHandle {
        self.spawn(Node::new(name), self.root)
    }

    /// Creates an empty group node under `parent`.
    pub fn create_node_under(&mut self, name: impl Into<Cow<'static, str>>, parent: NodeHandle) -> Result<NodeHandle> {
        self.ensure_node(parent)?;
        Ok(self.spawn(Node::new(name), parent))
    }

    /// Adds a mesh on a new node under the root.
    pub fn add_mesh(&mut self, mesh: Mesh) -> NodeHandle {
        let name = mesh.name.clone();
        let key = self.meshes.insert(mesh);
        self.spawn(Node::with_component(name, NodeComponent::Mesh(key)), self.root)
    }

    pub fn add_mesh_to_parent(&mut self, mesh: Mesh, parent: NodeHandle) -> Result<NodeHandle> {
        self.ensure_node(parent)?;
        let name = mesh.name.clone();
        let key = self.meshes.insert(mesh);
        Ok(self.spawn(Node::with_component(name, NodeComponent::Mesh(key)), parent))
    }

    pub fn add_light(&mut self, light: Light) -> NodeHandle {
        let key = self.lights.insert(light);
        self.spawn(Node::with_component("Light", NodeComponent::Light(key)), self.root)
    }

    pub fn add_light_to_parent(&mut self, light: Light, parent: NodeHandle) -> Result<NodeHandle> {
        self.ensure_node(parent)?;
        let key = self.lights.insert(light);
        Ok(self.spawn(Node::with_component("Light", NodeComponent::Light(key)), parent))
    }

    pub fn add_camera(&mut self, camera: Camera) -> NodeHandle {
        let name = camera.name.clone();
        let key = self.cameras.insert(camera);
        self.spawn(Node::with_component(name, NodeComponent::Camera(key)), self.root)
    }

    pub fn add_camera_to_parent(&mut self, camera: Camera, parent: NodeHandle) -> Result<NodeHandle> {
        self.ensure_node(parent)?;
        let name = camera.name.clone();
        let key = self.cameras.insert(camera);
        Ok(self.spawn(Node::with_component(name, NodeComponent::Camera(key)), parent))
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Appends `child` to `parent`'s children. Both must be alive and the
    /// child must currently be parentless.
    fn link(&mut self, child: NodeHandle, parent: NodeHandle) {
        self.nodes[parent].children.push(child);
        let node = &mut self.nodes[child];
        node.parent = Some(parent);
        node.world_dirty = true;
    }

    fn unlink(&mut self, child: NodeHandle) {
        let Some(parent) = self.nodes.get_mut(child).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(parent)
            && let Some(pos) = parent_node.children.iter().position(|&c| c == child)
        {
            parent_node.children.remove(pos);
        }
    }

    /// Returns true if `ancestor` is `node` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut current = Some(node);
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            current = self.nodes.get(handle).and_then(|n| n.parent);
        }
        false
    }

    /// Moves `child` under `parent`, detaching it from its previous parent.
    ///
    /// Fails without modifying anything if either handle is unknown, if
    /// `child` is the root, or if `parent` is `child` or one of its
    /// descendants.
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle) -> Result<()> {
        self.ensure_node(child)?;
        self.ensure_node(parent)?;
        if child == self.root {
            return Err(StrataError::RootNode("reparented"));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(StrataError::CycleDetected { child, parent });
        }

        self.unlink(child);
        self.link(child, parent);
        Ok(())
    }

    /// Removes `child` from its parent. The node and its subtree stay
    /// alive but are no longer part of the rendered tree.
    pub fn detach(&mut self, child: NodeHandle) -> Result<()> {
        self.ensure_node(child)?;
        if child == self.root {
            return Err(StrataError::RootNode("detached"));
        }
        self.unlink(child);
        self.nodes[child].world_dirty = true;
        Ok(())
    }

    /// Removes `handle` and its whole subtree, including their components.
    ///
    /// GPU resources held by removed meshes are queued for release by the
    /// renderer on its next frame.
    pub fn remove_node(&mut self, handle: NodeHandle) -> Result<()> {
        self.ensure_node(handle)?;
        if handle == self.root {
            return Err(StrataError::RootNode("removed"));
        }

        self.unlink(handle);

        let mut subtree = Vec::new();
        traversal::traverse_depth_first(&self.nodes, handle, |h, _| {
            subtree.push(h);
            TraversalControl::Continue
        });

        for h in subtree {
            let Some(node) = self.nodes.remove(h) else {
                continue;
            };
            match node.component {
                NodeComponent::Empty => {}
                NodeComponent::Mesh(key) => {
                    if let Some(mut mesh) = self.meshes.remove(key) {
                        let generation = mesh.resource_generation;
                        self.released_resources
                            .extend(mesh.take_used_resources().into_iter().map(|k| (generation, k)));
                    }
                }
                NodeComponent::Light(key) => {
                    self.lights.remove(key);
                }
                NodeComponent::Camera(key) => {
                    self.cameras.remove(key);
                }
            }
        }
        Ok(())
    }

    /// Drains the resource references released by removed meshes.
    pub(crate) fn take_released_resources(&mut self) -> Vec<(u64, ResourceKey)> {
        std::mem::take(&mut self.released_resources)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn get_node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    pub fn get_node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn get_mesh(&self, handle: NodeHandle) -> Option<&Mesh> {
        let key = self.nodes.get(handle)?.component.as_mesh()?;
        self.meshes.get(key)
    }

    pub fn get_mesh_mut(&mut self, handle: NodeHandle) -> Option<&mut Mesh> {
        let key = self.nodes.get(handle)?.component.as_mesh()?;
        self.meshes.get_mut(key)
    }

    #[must_use]
    pub fn get_light(&self, handle: NodeHandle) -> Option<&Light> {
        let key = self.nodes.get(handle)?.component.as_light()?;
        self.lights.get(key)
    }

    pub fn get_light_mut(&mut self, handle: NodeHandle) -> Option<&mut Light> {
        let key = self.nodes.get(handle)?.component.as_light()?;
        self.lights.get_mut(key)
    }

    #[must_use]
    pub fn get_camera(&self, handle: NodeHandle) -> Option<&Camera> {
        let key = self.nodes.get(handle)?.component.as_camera()?;
        self.cameras.get(key)
    }

    pub fn get_camera_mut(&mut self, handle: NodeHandle) -> Option<&mut Camera> {
        let key = self.nodes.get(handle)?.component.as_camera()?;
        self.cameras.get_mut(key)
    }

    #[must_use]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    /// Updates world matrices for the whole tree.
    ///
    /// Returns the number of world matrices recomputed.
    pub fn update_world_matrix(&mut self, force: bool) -> usize {
        transform_system::update_world_matrices(&mut self.nodes, self.root, force)
    }

    /// Updates world matrices for `handle` and its descendants, composing
    /// with the parent's current world matrix.
    pub fn update_subtree(&mut self, handle: NodeHandle, force: bool) -> Result<usize> {
        self.ensure_node(handle)?;
        Ok(transform_system::update_world_matrices(&mut self.nodes, handle, force))
    }

    /// Parent world matrix as currently cached, identity for parentless nodes.
    fn parent_world(&self, handle: NodeHandle) -> Affine3A {
        self.nodes
            .get(handle)
            .and_then(|n| n.parent)
            .and_then(|p| self.nodes.get(p))
            .map_or(Affine3A::IDENTITY, |p| p.world_matrix)
    }

    /// Rotates `handle` so its -Z axis points at the world-space `target`.
    ///
    /// Only the rotation changes. Uses the node's `up` hint, falling back
    /// to world +Z then +X when the direction is parallel to it. A zero
    /// length direction leaves the node untouched.
    pub fn look_at(&mut self, handle: NodeHandle, target: Vec3) -> Result<()> {
        let node = self.nodes.get(handle).ok_or(StrataError::NodeNotFound(handle))?;
        let parent_world = self.parent_world(handle);
        let eye = parent_world.transform_point3(node.transform.position());

        let Some(world_rotation) = look_at_rotation(eye, target, node.up) else {
            return Ok(());
        };

        let (_, parent_rotation, _) = parent_world.to_scale_rotation_translation();
        let local: Quat = parent_rotation.inverse() * world_rotation;
        self.nodes[handle].transform.set_rotation(local);
        Ok(())
    }

    /// Rotates `handle` to face another node's world position.
    pub fn look_at_node(&mut self, handle: NodeHandle, target: NodeHandle) -> Result<()> {
        let target_position = self
            .nodes
            .get(target)
            .ok_or(StrataError::NodeNotFound(target))?
            .world_position();
        self.look_at(handle, target_position)
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Depth-first pre-order walk from the root.
    pub fn traverse<F>(&self, visitor: F)
    where
        F: FnMut(NodeHandle, &Node) -> TraversalControl,
    {
        traversal::traverse_depth_first(&self.nodes, self.root, visitor);
    }

    /// Level-order walk from the root.
    pub fn traverse_breadth_first<F>(&self, visitor: F)
    where
        F: FnMut(NodeHandle, &Node) -> TraversalControl,
    {
        traversal::traverse_breadth_first(&self.nodes, self.root, visitor);
    }

    /// Depth-first walk that skips invisible nodes and their subtrees.
    pub fn traverse_visible<F>(&self, mut visitor: F)
    where
        F: FnMut(NodeHandle, &Node),
    {
        traversal::traverse_depth_first(&self.nodes, self.root, |h, node| {
            if !node.visible {
                return TraversalControl::SkipSubtree;
            }
            visitor(h, node);
            TraversalControl::Continue
        });
    }
}
