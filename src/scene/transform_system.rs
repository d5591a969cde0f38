//! Transform System
//!
//! Propagates local matrices down the hierarchy into world matrices. It only
//! borrows the node pool, never the whole [`Scene`](crate::scene::Scene), so
//! callers can hold other component pools at the same time.
//!
//! A node's world matrix is recomputed when the pass is forced, or when
//! automatic updates are enabled for it and one of the following holds:
//! - its local matrix was recomposed in this pass
//! - it was explicitly marked world-dirty (e.g. after a reparent)
//! - its parent's world matrix changed since this node last composed with it
//!
//! Nodes with `auto_update_children == false` prune their subtree on
//! non-forced passes only.

use glam::Affine3A;
use slotmap::SlotMap;

use crate::scene::NodeHandle;
use crate::scene::node::Node;
use crate::scene::traversal::{DepthFirstWalk, TraversalControl};

/// Updates world matrices for `start` and its descendants.
///
/// Returns the number of world matrices that were recomputed.
pub fn update_world_matrices(
    nodes: &mut SlotMap<NodeHandle, Node>,
    start: NodeHandle,
    force: bool,
) -> usize {
    let mut updated = 0;
    let mut walk = DepthFirstWalk::new(start);

    while let Some(handle) = walk.next(nodes) {
        let parent = nodes[handle]
            .parent
            .and_then(|p| nodes.get(p))
            .map_or((Affine3A::IDENTITY, 0), |p| (p.world_matrix, p.world_revision));

        let node = &mut nodes[handle];
        if update_node(node, parent, force) {
            updated += 1;
        }

        if !force && !node.auto_update_children {
            walk.apply(TraversalControl::SkipSubtree);
        }
    }

    updated
}

/// Refreshes a single node against its parent's `(world, revision)` pair.
///
/// Returns whether the world matrix was recomputed.
pub fn update_node(node: &mut Node, (parent_world, parent_revision): (Affine3A, u64), force: bool) -> bool {
    let local_changed = node.transform.refresh_local_matrix();
    node.world_dirty |= local_changed;

    let parent_changed = node.parent_revision != parent_revision;
    let needs_update = force || (node.auto_update_world_matrix && (node.world_dirty || parent_changed));
    if !needs_update {
        return false;
    }

    // Forced passes recompute everything but only move the revision when
    // the result differs, so children still see an unchanged parent.
    let world = parent_world * *node.transform.local_matrix();
    if node.world_dirty || parent_changed || world != node.world_matrix {
        node.world_revision += 1;
    }
    node.world_matrix = world;
    node.parent_revision = parent_revision;
    node.world_dirty = false;
    true
}
