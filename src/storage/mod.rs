//! Per-thread call-tree storage (`spec.md` §4.5): a rooted tree with a
//! mutable cursor pointing at the innermost open scope, de-duplicating
//! identical call paths and aggregating repeat visits ("laps").

mod node;

pub use node::{Node, NodeId};

use crate::bundle::Bundle;
use crate::identity::Identity;
use std::collections::HashMap;
use std::fmt;

const ROOT: NodeId = NodeId(0);

/// A per-thread call tree plus the cursor tracking the currently open
/// scope. `cursor == root` iff no scope is open.
pub struct Storage {
    nodes: Vec<Node>,
    cursor: NodeId,
    /// `(depth, identity) -> NodeId` for the cursor's current children,
    /// rebuilt every time the cursor moves (`spec.md` §4.5).
    sibling_hint: HashMap<(u32, Identity), NodeId>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("nodes", &self.nodes.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl Default for Storage {
    fn default() -> Self {
        Storage::new()
    }
}

impl Storage {
    pub fn new() -> Self {
        let root = Node {
            identity: Identity::ROOT,
            depth: 0,
            accumulator: Bundle::new("root", "cxx", 0, Identity::ROOT, vec![]),
            parent: None,
            children: Vec::new(),
        };
        let mut storage = Storage {
            nodes: vec![root],
            cursor: ROOT,
            sibling_hint: HashMap::new(),
        };
        storage.refresh_hint();
        storage
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn cursor(&self) -> NodeId {
        self.cursor
    }

    pub fn at_root(&self) -> bool {
        self.cursor == ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn refresh_hint(&mut self) {
        self.sibling_hint.clear();
        let depth = self.nodes[self.cursor.0].depth + 1;
        for &child in &self.nodes[self.cursor.0].children {
            let identity = self.nodes[child.0].identity;
            self.sibling_hint.insert((depth, identity), child);
        }
    }

    /// Reuse the cursor's child matching `identity`, or create one from
    /// `template`'s shape. Moves the cursor to that child and returns it.
    pub fn push(&mut self, identity: Identity, template: &Bundle) -> NodeId {
        let depth = self.nodes[self.cursor.0].depth + 1;

        if let Some(&existing) = self.sibling_hint.get(&(depth, identity)) {
            self.cursor = existing;
            self.refresh_hint();
            return existing;
        }

        let accumulator = Bundle::zeroed_like(template, identity, depth);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            identity,
            depth,
            accumulator,
            parent: Some(self.cursor),
            children: Vec::new(),
        });
        self.nodes[self.cursor.0].children.push(id);

        self.cursor = id;
        self.refresh_hint();
        id
    }

    /// Move the cursor to its parent. Asserts the cursor isn't already the
    /// root — callers (the scope handle) guarantee balanced push/pop.
    pub fn pop(&mut self) {
        let parent = self.nodes[self.cursor.0]
            .parent
            .expect("Storage::pop called with the cursor already at the root");
        self.cursor = parent;
        self.refresh_hint();
    }

    /// Depth-first, pre-order walk in insertion order. `visitor` receives
    /// each node together with its id.
    pub fn walk(&self, mut visitor: impl FnMut(NodeId, &Node)) {
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            visitor(id, node);
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }

    /// Merge `other`'s whole tree into `self`, matching paths by identity
    /// at each depth and summing accumulators/laps. Associative: the
    /// result doesn't depend on merge order, and merging in an empty
    /// storage is a no-op (`spec.md` §4.5, §8).
    pub fn merge(&mut self, other: &Storage) {
        self.merge_subtree(ROOT, other, ROOT);
    }

    fn merge_subtree(&mut self, self_id: NodeId, other: &Storage, other_id: NodeId) {
        let other_node = &other.nodes[other_id.0];
        if self_id != ROOT || other_id != ROOT {
            let other_accumulator = &other_node.accumulator;
            self.nodes[self_id.0].accumulator.add_assign(other_accumulator);
        }

        for &other_child in &other_node.children {
            let child_node = &other.nodes[other_child.0];
            let identity = child_node.identity;
            let depth = child_node.depth;

            let existing = self.nodes[self_id.0]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c.0].identity == identity);

            let self_child = match existing {
                Some(id) => id,
                None => {
                    let accumulator =
                        Bundle::zeroed_like(&child_node.accumulator, identity, depth);
                    let id = NodeId(self.nodes.len());
                    self.nodes.push(Node {
                        identity,
                        depth,
                        accumulator,
                        parent: Some(self_id),
                        children: Vec::new(),
                    });
                    self.nodes[self_id.0].children.push(id);
                    id
                }
            };

            self.merge_subtree(self_child, other, other_child);
        }
    }

    /// Zero every accumulator; tree structure is preserved.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.accumulator.reset();
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Bundle;
    use crate::component::test_support::Counter;

    fn template() -> Bundle {
        Bundle::new("x", "cxx", 0, Identity(0), vec![Box::new(Counter::default())])
    }

    #[test]
    fn push_reuses_existing_child() {
        let mut s = Storage::new();
        let tpl = template();
        let a = s.push(Identity(10), &tpl);
        s.pop();
        let b = s.push(Identity(10), &tpl);
        assert_eq!(a, b);
    }

    #[test]
    fn cursor_equals_root_iff_no_scope_open() {
        let mut s = Storage::new();
        assert!(s.at_root());
        let tpl = template();
        s.push(Identity(1), &tpl);
        assert!(!s.at_root());
        s.pop();
        assert!(s.at_root());
    }

    #[test]
    #[should_panic]
    fn pop_at_root_panics() {
        let mut s = Storage::new();
        s.pop();
    }

    #[test]
    fn merge_is_associative_regardless_of_order() {
        let tpl = template();

        let mut a = Storage::new();
        let id = a.push(Identity(1), &tpl);
        a.node_mut(id).accumulator_mut().record();
        a.pop();

        let mut b = Storage::new();
        let id = b.push(Identity(1), &tpl);
        b.node_mut(id).accumulator_mut().record();
        b.node_mut(id).accumulator_mut().record();
        b.pop();

        let mut ab = Storage::new();
        ab.merge(&a);
        ab.merge(&b);

        let mut ba = Storage::new();
        ba.merge(&b);
        ba.merge(&a);

        let mut laps_ab = 0;
        ab.walk(|_, n| laps_ab += n.laps());
        let mut laps_ba = 0;
        ba.walk(|_, n| laps_ba += n.laps());
        assert_eq!(laps_ab, laps_ba);
        assert_eq!(laps_ab, 3);
    }

    #[test]
    fn merge_with_empty_is_no_op() {
        let tpl = template();
        let mut a = Storage::new();
        let id = a.push(Identity(1), &tpl);
        a.node_mut(id).accumulator_mut().record();
        a.pop();

        let before = a.node_count();
        let empty = Storage::new();
        a.merge(&empty);
        assert_eq!(a.node_count(), before);
    }
}
