//! Scene Graph Traversal
//!
//! Cursor-style walkers over the node pool. A walker owns only its stack or
//! queue, so the caller may mutate nodes between calls to `next`. After each
//! yielded node the caller can [`apply`](DepthFirstWalk::apply) a
//! [`TraversalControl`] to prune that node's subtree or stop the walk.
//!
//! ```rust,ignore
//! let mut walk = DepthFirstWalk::new(scene.root());
//! while let Some(handle) = walk.next(&nodes) {
//!     if !nodes[handle].visible {
//!         walk.apply(TraversalControl::SkipSubtree);
//!     }
//! }
//! ```

use std::collections::VecDeque;

use slotmap::SlotMap;

use crate::scene::NodeHandle;
use crate::scene::node::Node;

/// Visitor verdict for the node just yielded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalControl {
    #[default]
    Continue,
    /// Do not visit this node's descendants.
    SkipSubtree,
    /// End the walk.
    Stop,
}

/// Pre-order depth-first walker. Children are visited in insertion order.
#[derive(Debug, Clone)]
pub struct DepthFirstWalk {
    stack: Vec<NodeHandle>,
    last: Option<NodeHandle>,
    skip_last: bool,
}

impl DepthFirstWalk {
    #[must_use]
    pub fn new(start: NodeHandle) -> Self {
        let mut stack = Vec::with_capacity(64);
        stack.push(start);
        Self {
            stack,
            last: None,
            skip_last: false,
        }
    }

    /// Yields the next live node, expanding the previous one's children
    /// unless it was pruned.
    pub fn next(&mut self, nodes: &SlotMap<NodeHandle, Node>) -> Option<NodeHandle> {
        let skip = std::mem::take(&mut self.skip_last);
        if let Some(last) = self.last.take()
            && !skip
            && let Some(node) = nodes.get(last)
        {
            self.stack.extend(node.children.iter().rev().copied());
        }

        while let Some(handle) = self.stack.pop() {
            if nodes.contains_key(handle) {
                self.last = Some(handle);
                return Some(handle);
            }
        }
        None
    }

    pub fn apply(&mut self, control: TraversalControl) {
        match control {
            TraversalControl::Continue => {}
            TraversalControl::SkipSubtree => self.skip_last = true,
            TraversalControl::Stop => {
                self.stack.clear();
                self.last = None;
            }
        }
    }
}

/// Level-order walker. Siblings are visited in insertion order.
#[derive(Debug, Clone)]
pub struct BreadthFirstWalk {
    queue: VecDeque<NodeHandle>,
    last: Option<NodeHandle>,
    skip_last: bool,
}

impl BreadthFirstWalk {
    #[must_use]
    pub fn new(start: NodeHandle) -> Self {
        let mut queue = VecDeque::with_capacity(64);
        queue.push_back(start);
        Self {
            queue,
            last: None,
            skip_last: false,
        }
    }

    pub fn next(&mut self, nodes: &SlotMap<NodeHandle, Node>) -> Option<NodeHandle> {
        let skip = std::mem::take(&mut self.skip_last);
        if let Some(last) = self.last.take()
            && !skip
            && let Some(node) = nodes.get(last)
        {
            self.queue.extend(node.children.iter().copied());
        }

        while let Some(handle) = self.queue.pop_front() {
            if nodes.contains_key(handle) {
                self.last = Some(handle);
                return Some(handle);
            }
        }
        None
    }

    pub fn apply(&mut self, control: TraversalControl) {
        match control {
            TraversalControl::Continue => {}
            TraversalControl::SkipSubtree => self.skip_last = true,
            TraversalControl::Stop => {
                self.queue.clear();
                self.last = None;
            }
        }
    }
}

/// Depth-first pre-order visit of `start` and its descendants.
pub fn traverse_depth_first<F>(nodes: &SlotMap<NodeHandle, Node>, start: NodeHandle, mut visitor: F)
where
    F: FnMut(NodeHandle, &Node) -> TraversalControl,
{
    let mut walk = DepthFirstWalk::new(start);
    while let Some(handle) = walk.next(nodes) {
        walk.apply(visitor(handle, &nodes[handle]));
    }
}

/// Breadth-first visit of `start` and its descendants.
pub fn traverse_breadth_first<F>(nodes: &SlotMap<NodeHandle, Node>, start: NodeHandle, mut visitor: F)
where
    F: FnMut(NodeHandle, &Node) -> TraversalControl,
{
    let mut walk = BreadthFirstWalk::new(start);
    while let Some(handle) = walk.next(nodes) {
        walk.apply(visitor(handle, &nodes[handle]));
    }
}
