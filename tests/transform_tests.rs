//! Transform and world matrix tests
//!
//! Tests for:
//! - Local matrix dirty checking and revisions
//! - Euler angle round-trip conversions
//! - Pivot composition
//! - Lazy world matrix propagation through the hierarchy
//! - look_at orientation and its degenerate cases

use glam::{Affine3A, EulerRot, Quat, Vec3};
use strata::scene::{Scene, Transform, look_at_rotation};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-4;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
}

/// Same rotation, regardless of quaternion sign.
fn quat_approx(a: Quat, b: Quat) -> bool {
    a.dot(b).abs() > 1.0 - EPSILON
}

// ============================================================================
// Transform Unit Tests
// ============================================================================

#[test]
fn transform_default_is_identity() {
    let mut t = Transform::new();
    assert_eq!(t.position(), Vec3::ZERO);
    assert_eq!(t.rotation(), Quat::IDENTITY);
    assert_eq!(t.scale(), Vec3::ONE);

    t.refresh_local_matrix();
    assert_eq!(*t.local_matrix(), Affine3A::IDENTITY);
}

#[test]
fn refresh_recomposes_only_after_a_change() {
    let mut t = Transform::new();

    assert!(t.refresh_local_matrix());
    assert!(!t.refresh_local_matrix());
    assert_eq!(t.revision(), 1);

    t.set_position(Vec3::new(1.0, 2.0, 3.0));
    assert!(t.is_dirty());
    assert!(t.refresh_local_matrix());
    assert_eq!(t.revision(), 2);
    assert!(vec3_approx(t.local_matrix().translation.into(), Vec3::new(1.0, 2.0, 3.0)));
}

#[test]
fn setters_do_not_recompute_eagerly() {
    let mut t = Transform::new();
    t.refresh_local_matrix();

    t.set_scale(Vec3::splat(2.0));
    // The cached matrix is stale until the next refresh.
    assert_eq!(*t.local_matrix(), Affine3A::IDENTITY);

    t.refresh_local_matrix();
    assert!(vec3_approx(
        t.local_matrix().transform_point3(Vec3::ONE),
        Vec3::splat(2.0)
    ));
}

#[test]
fn scale_rotate_translate_order() {
    let mut t = Transform::new();
    t.set_scale(Vec3::new(2.0, 1.0, 1.0));
    t.set_rotation(Quat::from_rotation_z(FRAC_PI_2));
    t.set_position(Vec3::new(0.0, 0.0, 5.0));
    t.refresh_local_matrix();

    // (1,0,0) -> scaled (2,0,0) -> rotated (0,2,0) -> translated.
    let p = t.local_matrix().transform_point3(Vec3::X);
    assert!(vec3_approx(p, Vec3::new(0.0, 2.0, 5.0)));
}

#[test]
fn pivot_point_is_fixed_under_rotation_and_scale() {
    let pivot = Vec3::new(1.0, 1.0, 0.0);
    let mut t = Transform::new();
    t.set_pivot(pivot);
    t.set_rotation(Quat::from_rotation_z(FRAC_PI_4));
    t.set_scale(Vec3::splat(3.0));
    t.refresh_local_matrix();

    assert!(vec3_approx(t.local_matrix().transform_point3(pivot), pivot));
}

// ============================================================================
// Euler <-> Quaternion
// ============================================================================

#[test]
fn euler_round_trip_away_from_gimbal_lock() {
    let euler = Vec3::new(0.3, -0.5, 1.1);

    let mut a = Transform::new();
    a.set_rotation_euler(euler);
    let q = a.rotation();

    let mut b = Transform::new();
    b.set_rotation(q);
    assert!(vec3_approx(b.rotation_euler(), euler));
    assert!(quat_approx(q, Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z)));
}

#[test]
fn euler_round_trip_at_gimbal_lock_keeps_orientation() {
    // With the middle angle at ±90° the first and last axes coincide, so
    // the angles are not unique; only the represented rotation must survive.
    let euler = Vec3::new(0.4, FRAC_PI_2, 0.2);

    let mut a = Transform::new();
    a.set_rotation_euler(euler);
    let q = a.rotation();

    let mut b = Transform::new();
    b.set_rotation(q);
    let back = b.rotation_euler();
    let q_back = Quat::from_euler(EulerRot::XYZ, back.x, back.y, back.z);

    assert!(quat_approx(q, q_back));
}

#[test]
fn euler_order_change_keeps_rotation() {
    let mut t = Transform::new();
    t.set_rotation_euler(Vec3::new(0.2, 0.4, 0.6));
    let before = t.rotation();

    t.set_euler_order(EulerRot::ZYX);
    assert_eq!(t.euler_order(), EulerRot::ZYX);
    assert!(quat_approx(t.rotation(), before));
}

#[test]
fn rotation_representations_sync_on_refresh() {
    let mut t = Transform::new();
    t.set_rotation(Quat::from_rotation_y(0.7));
    t.refresh_local_matrix();

    assert!(approx_eq(t.rotation_euler().y, 0.7));
    let expected = Affine3A::from_quat(Quat::from_rotation_y(0.7));
    assert!(t.local_matrix().abs_diff_eq(expected, EPSILON));
}

#[test]
fn apply_local_matrix_decomposes() {
    let m = Affine3A::from_scale_rotation_translation(
        Vec3::splat(2.0),
        Quat::from_rotation_x(0.5),
        Vec3::new(4.0, 5.0, 6.0),
    );
    let mut t = Transform::new();
    t.apply_local_matrix(m);

    assert!(vec3_approx(t.position(), Vec3::new(4.0, 5.0, 6.0)));
    assert!(vec3_approx(t.scale(), Vec3::splat(2.0)));
    assert!(quat_approx(t.rotation(), Quat::from_rotation_x(0.5)));
}

// ============================================================================
// World Matrix Propagation
// ============================================================================

#[test]
fn five_level_chain_composes_in_order() {
    let mut scene = Scene::new();
    let mut parent = scene.root();
    let mut expected = Affine3A::IDENTITY;
    let mut chain = Vec::new();

    for level in 0..5 {
        let node = scene.create_node_under(format!("level{level}"), parent).unwrap();
        let translation = Vec3::new(1.0, level as f32, 0.0);
        let rotation = Quat::from_rotation_z(0.3 * (level + 1) as f32);
        let scale = Vec3::splat(1.0 + 0.1 * level as f32);

        let t = &mut scene.get_node_mut(node).unwrap().transform;
        t.set_position(translation);
        t.set_rotation(rotation);
        t.set_scale(scale);

        expected = expected * Affine3A::from_scale_rotation_translation(scale, rotation, translation);
        chain.push(node);
        parent = node;
    }

    scene.update_world_matrix(false);

    let leaf = scene.get_node(chain[4]).unwrap();
    let probe = Vec3::new(0.5, -0.25, 2.0);
    assert!(vec3_approx(
        leaf.world_matrix().transform_point3(probe),
        expected.transform_point3(probe)
    ));
}

#[test]
fn unchanged_scene_recomputes_nothing() {
    let mut scene = Scene::new();
    let a = scene.create_node("a");
    let b = scene.create_node_under("b", a).unwrap();

    // Root, a and b on the first pass.
    assert_eq!(scene.update_world_matrix(false), 3);
    let revision = scene.get_node(b).unwrap().world_revision();

    assert_eq!(scene.update_world_matrix(false), 0);
    assert_eq!(scene.get_node(b).unwrap().world_revision(), revision);
}

#[test]
fn changing_a_node_updates_its_subtree_only() {
    let mut scene = Scene::new();
    let a = scene.create_node("a");
    let a_child = scene.create_node_under("a_child", a).unwrap();
    let b = scene.create_node("b");
    scene.update_world_matrix(false);

    let b_revision = scene.get_node(b).unwrap().world_revision();
    let child_revision = scene.get_node(a_child).unwrap().world_revision();

    scene.get_node_mut(a).unwrap().transform.set_position(Vec3::new(0.0, 3.0, 0.0));
    assert_eq!(scene.update_world_matrix(false), 2);

    assert_eq!(scene.get_node(b).unwrap().world_revision(), b_revision);
    assert_eq!(scene.get_node(a_child).unwrap().world_revision(), child_revision + 1);
    assert!(vec3_approx(
        scene.get_node(a_child).unwrap().world_position(),
        Vec3::new(0.0, 3.0, 0.0)
    ));
}

#[test]
fn auto_update_off_waits_for_forced_pass() {
    let mut scene = Scene::new();
    let a = scene.create_node("a");
    scene.update_world_matrix(false);

    let node = scene.get_node_mut(a).unwrap();
    node.auto_update_world_matrix = false;
    node.transform.set_position(Vec3::X);

    scene.update_world_matrix(false);
    assert!(vec3_approx(scene.get_node(a).unwrap().world_position(), Vec3::ZERO));

    scene.update_world_matrix(true);
    assert!(vec3_approx(scene.get_node(a).unwrap().world_position(), Vec3::X));
}

#[test]
fn auto_update_children_off_prunes_non_forced_passes() {
    let mut scene = Scene::new();
    let group = scene.create_node("group");
    let child = scene.create_node_under("child", group).unwrap();
    scene.update_world_matrix(false);

    scene.get_node_mut(group).unwrap().auto_update_children = false;
    scene.get_node_mut(child).unwrap().transform.set_position(Vec3::Y);

    scene.update_world_matrix(false);
    assert!(vec3_approx(scene.get_node(child).unwrap().world_position(), Vec3::ZERO));

    scene.update_world_matrix(true);
    assert!(vec3_approx(scene.get_node(child).unwrap().world_position(), Vec3::Y));
}

#[test]
fn subtree_update_composes_with_cached_parent() {
    let mut scene = Scene::new();
    let a = scene.create_node("a");
    let b = scene.create_node_under("b", a).unwrap();
    scene.get_node_mut(a).unwrap().transform.set_position(Vec3::X);
    scene.update_world_matrix(false);

    scene.get_node_mut(b).unwrap().transform.set_position(Vec3::Z);
    assert_eq!(scene.update_subtree(b, false).unwrap(), 1);
    assert!(vec3_approx(
        scene.get_node(b).unwrap().world_position(),
        Vec3::new(1.0, 0.0, 1.0)
    ));
}

#[test]
fn reparent_marks_world_dirty() {
    let mut scene = Scene::new();
    let a = scene.create_node("a");
    let b = scene.create_node("b");
    let child = scene.create_node_under("child", a).unwrap();
    scene.get_node_mut(b).unwrap().transform.set_position(Vec3::new(0.0, 0.0, -4.0));
    scene.update_world_matrix(false);

    scene.attach(child, b).unwrap();
    scene.update_world_matrix(false);
    assert!(vec3_approx(
        scene.get_node(child).unwrap().world_position(),
        Vec3::new(0.0, 0.0, -4.0)
    ));
}

// ============================================================================
// look_at
// ============================================================================

#[test]
fn look_at_points_negative_z_at_target() {
    let mut scene = Scene::new();
    let eye = scene.create_node("eye");
    scene.get_node_mut(eye).unwrap().transform.set_position(Vec3::new(0.0, 0.0, 5.0));
    scene.look_at(eye, Vec3::new(5.0, 0.0, 5.0)).unwrap();
    scene.update_world_matrix(false);

    let node = scene.get_node(eye).unwrap();
    let forward = node.world_matrix().transform_vector3(Vec3::NEG_Z);
    assert!(vec3_approx(forward, Vec3::X));
    // Position untouched.
    assert!(vec3_approx(node.world_position(), Vec3::new(0.0, 0.0, 5.0)));
}

#[test]
fn look_at_parallel_to_up_uses_fallback_axis() {
    let rotation = look_at_rotation(Vec3::ZERO, Vec3::new(0.0, -3.0, 0.0), Vec3::Y).unwrap();
    let forward = rotation * Vec3::NEG_Z;
    assert!(vec3_approx(forward, Vec3::NEG_Y));
    assert!(!forward.is_nan());
}

#[test]
fn look_at_same_point_leaves_rotation() {
    let mut scene = Scene::new();
    let eye = scene.create_node("eye");
    let original = Quat::from_rotation_y(0.5);
    scene.get_node_mut(eye).unwrap().transform.set_rotation(original);

    scene.look_at(eye, Vec3::ZERO).unwrap();
    assert!(quat_approx(scene.get_node(eye).unwrap().transform.rotation(), original));
}

#[test]
fn look_at_under_rotated_parent() {
    let mut scene = Scene::new();
    let parent = scene.create_node("parent");
    let eye = scene.create_node_under("eye", parent).unwrap();
    scene
        .get_node_mut(parent)
        .unwrap()
        .transform
        .set_rotation(Quat::from_rotation_y(FRAC_PI_2));
    scene.update_world_matrix(false);

    scene.look_at(eye, Vec3::new(0.0, 0.0, -10.0)).unwrap();
    scene.update_world_matrix(false);

    let forward = scene
        .get_node(eye)
        .unwrap()
        .world_matrix()
        .transform_vector3(Vec3::NEG_Z);
    assert!(vec3_approx(forward, Vec3::NEG_Z));
}
