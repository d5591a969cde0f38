//! Scene Integration Tests
//!
//! Tests for:
//! - Scene: create/remove nodes, attach/detach hierarchy
//! - Cycle and root protection
//! - Component management: mesh, camera, light
//! - Traversal order and visibility pruning
//! - Texture readiness hand-off from loader threads

use glam::{Vec3, Vec4};
use strata::StrataError;
use strata::resources::{Geometry, Material, Mesh, TextureReady};
use strata::scene::{Camera, Light, LightKind, NodeComponent, NodeHandle, Scene, TraversalControl};

fn new_scene() -> Scene {
    Scene::new()
}

fn mesh() -> Mesh {
    Mesh::new(Geometry::new().shared(), Material::basic(Vec4::ONE).shared())
}

fn visit_order(scene: &Scene) -> Vec<NodeHandle> {
    let mut order = Vec::new();
    scene.traverse(|handle, _| {
        order.push(handle);
        TraversalControl::Continue
    });
    order
}

// ============================================================================
// Node Creation & Removal
// ============================================================================

#[test]
fn scene_starts_with_root_only() {
    let scene = new_scene();
    assert_eq!(scene.node_count(), 1);
    assert!(scene.get_node(scene.root()).unwrap().parent().is_none());
}

#[test]
fn scene_create_node_under_root() {
    let mut scene = new_scene();
    let handle = scene.create_node("TestNode");

    let node = scene.get_node(handle).unwrap();
    assert_eq!(node.name, "TestNode");
    assert_eq!(node.parent(), Some(scene.root()));
    assert!(scene.get_node(scene.root()).unwrap().children().contains(&handle));
}

#[test]
fn scene_create_under_unknown_parent_fails() {
    let mut scene = new_scene();
    let gone = scene.create_node("gone");
    scene.remove_node(gone).unwrap();

    assert!(matches!(
        scene.create_node_under("orphan", gone),
        Err(StrataError::NodeNotFound(h)) if h == gone
    ));
}

#[test]
fn scene_remove_node_removes_subtree_and_components() {
    let mut scene = new_scene();
    let group = scene.create_node("group");
    let child = scene.add_mesh_to_parent(mesh(), group).unwrap();
    let light = scene.add_light_to_parent(Light::new_directional(Vec3::ONE, 1.0), child).unwrap();
    assert_eq!(scene.mesh_count(), 1);

    scene.remove_node(group).unwrap();

    assert!(scene.get_node(group).is_none());
    assert!(scene.get_node(child).is_none());
    assert!(scene.get_node(light).is_none());
    assert_eq!(scene.mesh_count(), 0);
    assert_eq!(scene.node_count(), 1);
    assert!(scene.get_node(scene.root()).unwrap().children().is_empty());
}

#[test]
fn scene_root_cannot_be_removed_or_detached() {
    let mut scene = new_scene();
    let root = scene.root();
    let other = scene.create_node("other");

    assert!(matches!(scene.remove_node(root), Err(StrataError::RootNode(_))));
    assert!(matches!(scene.detach(root), Err(StrataError::RootNode(_))));
    assert!(matches!(scene.attach(root, other), Err(StrataError::RootNode(_))));
}

// ============================================================================
// Hierarchy
// ============================================================================

#[test]
fn scene_attach_sets_parent_child() {
    let mut scene = new_scene();
    let parent = scene.create_node("parent");
    let child = scene.create_node("child");

    scene.attach(child, parent).unwrap();

    assert_eq!(scene.get_node(child).unwrap().parent(), Some(parent));
    assert_eq!(scene.get_node(parent).unwrap().children(), &[child]);
}

#[test]
fn scene_attach_removes_from_old_parent() {
    let mut scene = new_scene();
    let a = scene.create_node("a");
    let b = scene.create_node("b");
    let child = scene.create_node_under("child", a).unwrap();

    scene.attach(child, b).unwrap();

    assert!(scene.get_node(a).unwrap().children().is_empty());
    assert_eq!(scene.get_node(b).unwrap().children(), &[child]);
    // Never in two child lists.
    let root_children = scene.get_node(scene.root()).unwrap().children();
    assert!(!root_children.contains(&child));
}

#[test]
fn scene_attach_to_self_is_rejected() {
    let mut scene = new_scene();
    let node = scene.create_node("node");

    assert!(matches!(
        scene.attach(node, node),
        Err(StrataError::CycleDetected { child, parent }) if child == node && parent == node
    ));
}

#[test]
fn scene_attach_to_descendant_leaves_tree_unchanged() {
    let mut scene = new_scene();
    let a = scene.create_node("a");
    let b = scene.create_node_under("b", a).unwrap();
    let c = scene.create_node_under("c", b).unwrap();
    let before = visit_order(&scene);

    assert!(matches!(scene.attach(a, c), Err(StrataError::CycleDetected { .. })));

    assert_eq!(visit_order(&scene), before);
    assert_eq!(scene.get_node(a).unwrap().parent(), Some(scene.root()));
    assert!(scene.get_node(c).unwrap().children().is_empty());
}

#[test]
fn scene_detached_node_stays_alive_but_is_not_traversed() {
    let mut scene = new_scene();
    let group = scene.create_node("group");
    let child = scene.create_node_under("child", group).unwrap();

    scene.detach(group).unwrap();

    assert!(scene.get_node(group).unwrap().parent().is_none());
    assert!(scene.get_node(child).is_some());
    let order = visit_order(&scene);
    assert!(!order.contains(&group));
    assert!(!order.contains(&child));

    scene.attach(group, scene.root()).unwrap();
    assert!(visit_order(&scene).contains(&child));
}

#[test]
fn scene_is_ancestor_or_self() {
    let mut scene = new_scene();
    let a = scene.create_node("a");
    let b = scene.create_node_under("b", a).unwrap();

    assert!(scene.is_ancestor_or_self(a, b));
    assert!(scene.is_ancestor_or_self(b, b));
    assert!(!scene.is_ancestor_or_self(b, a));
}

// ============================================================================
// Components
// ============================================================================

#[test]
fn scene_components_are_reachable_from_nodes() {
    let mut scene = new_scene();
    let mesh_node = scene.add_mesh(mesh());
    let light_node = scene.add_light(Light::new_point(Vec3::ONE, 2.0, 10.0));
    let camera_node = scene.add_camera(Camera::new_perspective(60.0, 1.5, 0.1, 100.0));

    assert!(matches!(
        scene.get_node(mesh_node).unwrap().component(),
        NodeComponent::Mesh(_)
    ));
    assert!(scene.get_mesh(mesh_node).unwrap().visible);

    let light = scene.get_light(light_node).unwrap();
    assert!(matches!(light.kind, LightKind::Point(p) if p.range == 10.0));
    assert_eq!(light.radiance(), Vec3::splat(2.0));

    assert!(scene.get_camera(camera_node).is_some());
    assert!(scene.get_camera(mesh_node).is_none());
    assert!(scene.get_mesh(light_node).is_none());
}

#[test]
fn scene_component_mutation() {
    let mut scene = new_scene();
    let node = scene.add_light(Light::new_ambient(Vec3::ONE, 0.5));

    scene.get_light_mut(node).unwrap().intensity = 2.0;
    assert_eq!(scene.get_light(node).unwrap().radiance(), Vec3::splat(2.0));

    let mesh_node = scene.add_mesh(mesh());
    scene.get_mesh_mut(mesh_node).unwrap().visible = false;
    assert!(!scene.get_mesh(mesh_node).unwrap().visible);
}

#[test]
fn scene_unique_ids() {
    let mut scene = new_scene();
    let a = scene.create_node("a");
    let b = scene.create_node("b");
    assert_ne!(scene.get_node(a).unwrap().uuid, scene.get_node(b).unwrap().uuid);

    let m1 = mesh();
    let m2 = mesh();
    assert_ne!(m1.id(), m2.id());
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn depth_first_visits_in_child_order() {
    let mut scene = new_scene();
    let a = scene.create_node("a");
    let a1 = scene.create_node_under("a1", a).unwrap();
    let b = scene.create_node("b");

    assert_eq!(visit_order(&scene), vec![scene.root(), a, a1, b]);
}

#[test]
fn breadth_first_visits_level_by_level() {
    let mut scene = new_scene();
    let a = scene.create_node("a");
    let a1 = scene.create_node_under("a1", a).unwrap();
    let b = scene.create_node("b");

    let mut order = Vec::new();
    scene.traverse_breadth_first(|handle, _| {
        order.push(handle);
        TraversalControl::Continue
    });
    assert_eq!(order, vec![scene.root(), a, b, a1]);
}

#[test]
fn traversal_stop_ends_the_walk() {
    let mut scene = new_scene();
    let a = scene.create_node("a");
    scene.create_node("b");

    let mut order = Vec::new();
    scene.traverse(|handle, _| {
        order.push(handle);
        if handle == a { TraversalControl::Stop } else { TraversalControl::Continue }
    });
    assert_eq!(order, vec![scene.root(), a]);
}

#[test]
fn invisible_node_prunes_its_subtree() {
    let mut scene = new_scene();
    let hidden = scene.create_node("hidden");
    let hidden_child = scene.create_node_under("hidden_child", hidden).unwrap();
    let shown = scene.create_node("shown");
    scene.get_node_mut(hidden).unwrap().visible = false;

    let mut visited = Vec::new();
    scene.traverse_visible(|handle, _| visited.push(handle));

    assert!(!visited.contains(&hidden));
    assert!(!visited.contains(&hidden_child));
    assert!(visited.contains(&shown));
}

// ============================================================================
// Textures
// ============================================================================

#[test]
fn texture_becomes_ready_after_drain() {
    let mut scene = new_scene();
    let handle = scene.textures.create("albedo");
    let loader = scene.textures.loader();

    std::thread::spawn(move || {
        loader.complete(TextureReady {
            handle,
            width: 16,
            height: 8,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            pixels: Some(vec![255_u8; 16 * 8 * 4].into()),
        })
    })
    .join()
    .unwrap();

    assert!(!scene.textures.get(handle).unwrap().is_ready());
    assert_eq!(scene.textures.drain_completions(), 1);

    let texture = scene.textures.get(handle).unwrap();
    assert!(texture.is_ready());
    assert_eq!(texture.size(), (16, 8));
    assert_eq!(texture.pixels().map(<[u8]>::len), Some(16 * 8 * 4));
}

#[test]
fn completion_for_removed_texture_is_dropped() {
    let mut scene = new_scene();
    let handle = scene.textures.create("gone");
    let loader = scene.textures.loader();
    scene.textures.remove(handle);

    assert!(loader.complete(TextureReady {
        handle,
        width: 1,
        height: 1,
        format: wgpu::TextureFormat::Rgba8Unorm,
        pixels: None,
    }));
    assert_eq!(scene.textures.drain_completions(), 0);
    assert!(scene.textures.is_empty());
}
