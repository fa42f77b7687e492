//! Composed tree projection
//!
//! The composed tree is never stored. It is walked on demand from the shadow
//! tree:
//! - a component yields the children of its shadow root
//! - a slot yields the host content currently assigned to it
//! - `inherit_slots` nodes are replaced by their children in place
//! - in the non-virtual view, virtual nodes are replaced by their own
//!   composed children

use crate::error::TreeResult;
use crate::node::NodeData;
use crate::tree::Tree;
use crate::NodeId;

/// Which nodes a composed walk yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComposedView {
    NonVirtual,
    WithVirtual,
}

impl Tree {
    /// Host whose content a slot projects, if `id` is an active slot
    pub(crate) fn slot_host(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id)?;
        node.slot_name()?;
        self.host_of(node.owner?)
    }

    /// Walk the composed children of `id`. Returns `false` when `f` stopped
    /// the walk.
    pub(crate) fn walk_composed(
        &self,
        id: NodeId,
        view: ComposedView,
        f: &mut dyn FnMut(NodeId) -> bool,
    ) -> bool {
        let Some(node) = self.get(id) else {
            return true;
        };
        if let NodeData::Component(data) = &node.data {
            return self.walk_list(data.shadow_root, view, f);
        }
        if let Some(host) = self.slot_host(id) {
            let Some(host_node) = self.get(host) else {
                return true;
            };
            for &child in &host_node.children {
                if !self.walk_slot_content(child, id, view, f) {
                    return false;
                }
            }
            return true;
        }
        self.walk_list(id, view, f)
    }

    fn walk_list(&self, parent: NodeId, view: ComposedView, f: &mut dyn FnMut(NodeId) -> bool) -> bool {
        let Some(node) = self.get(parent) else {
            return true;
        };
        for &child in &node.children {
            if !self.emit_composed(child, view, f) {
                return false;
            }
        }
        true
    }

    fn walk_slot_content(
        &self,
        content: NodeId,
        slot: NodeId,
        view: ComposedView,
        f: &mut dyn FnMut(NodeId) -> bool,
    ) -> bool {
        let Some(node) = self.get(content) else {
            return true;
        };
        if node.inherits_slots() {
            for &child in &node.children {
                if !self.walk_slot_content(child, slot, view, f) {
                    return false;
                }
            }
            return true;
        }
        if node.containing_slot != Some(slot) {
            return true;
        }
        self.emit_composed(content, view, f)
    }

    fn emit_composed(&self, id: NodeId, view: ComposedView, f: &mut dyn FnMut(NodeId) -> bool) -> bool {
        let Some(node) = self.get(id) else {
            return true;
        };
        if node.inherits_slots() {
            return self.walk_list(id, view, f);
        }
        if view == ComposedView::NonVirtual && node.is_virtual() {
            return self.walk_composed(id, view, f);
        }
        f(id)
    }

    pub(crate) fn composed_children(&self, id: NodeId, view: ComposedView) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk_composed(id, view, &mut |c| {
            out.push(c);
            true
        });
        out
    }

    /// Composed parent in the given view
    ///
    /// A shadow root resolves to its host; unassigned host content and
    /// fragment children have no composed parent.
    pub(crate) fn composed_parent_in(&self, id: NodeId, view: ComposedView) -> Option<NodeId> {
        let mut current = id;
        loop {
            let node = self.get(current)?;
            let candidate = match node.containing_slot {
                Some(slot) => slot,
                None => {
                    let parent = node.parent?;
                    match &self.get(parent)?.data {
                        NodeData::Component(_) | NodeData::Fragment => return None,
                        NodeData::ShadowRoot {
                            host: Some(host), ..
                        } => *host,
                        _ => parent,
                    }
                }
            };
            let candidate_node = self.get(candidate)?;
            if candidate_node.inherits_slots()
                || (view == ComposedView::NonVirtual && candidate_node.is_virtual())
            {
                current = candidate;
                continue;
            }
            return Some(candidate);
        }
    }

    /// Call `f` for each non-virtual composed child until it returns `false`.
    /// Returns whether the walk ran to completion.
    pub fn for_each_non_virtual_composed_child(
        &self,
        id: NodeId,
        mut f: impl FnMut(NodeId) -> bool,
    ) -> TreeResult<bool> {
        self.node(id)?;
        Ok(self.walk_composed(id, ComposedView::NonVirtual, &mut f))
    }

    /// Like [`Tree::for_each_non_virtual_composed_child`], keeping virtual nodes
    pub fn for_each_composed_child(
        &self,
        id: NodeId,
        mut f: impl FnMut(NodeId) -> bool,
    ) -> TreeResult<bool> {
        self.node(id)?;
        Ok(self.walk_composed(id, ComposedView::WithVirtual, &mut f))
    }

    /// Composed children with virtual nodes elided
    pub fn child_nodes(&self, id: NodeId) -> TreeResult<Vec<NodeId>> {
        self.node(id)?;
        Ok(self.composed_children(id, ComposedView::NonVirtual))
    }

    /// Inverse of [`Tree::child_nodes`]
    pub fn composed_parent(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
        self.node(id)?;
        Ok(self.composed_parent_in(id, ComposedView::NonVirtual))
    }

    /// Next hop of event propagation: containing slot, shadow parent, host
    pub(crate) fn propagation_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id)?;
        if let Some(slot) = node.containing_slot {
            return Some(slot);
        }
        if let Some(parent) = node.parent {
            return Some(parent);
        }
        match node.data {
            NodeData::ShadowRoot { host, .. } => host,
            _ => None,
        }
    }

    /// Sort key following composed pre-order (shadow order where the node
    /// is not part of the composed tree)
    pub(crate) fn position_key(&self, id: NodeId) -> Vec<usize> {
        let mut key = Vec::new();
        let mut current = id;
        loop {
            if let Some(parent) = self.composed_parent_in(current, ComposedView::WithVirtual) {
                let siblings = self.composed_children(parent, ComposedView::WithVirtual);
                key.push(siblings.iter().position(|&s| s == current).unwrap_or(usize::MAX));
                current = parent;
                continue;
            }
            let Some(node) = self.get(current) else {
                break;
            };
            match node.parent {
                Some(parent) => {
                    let index = self
                        .get(parent)
                        .and_then(|p| p.children.iter().position(|&c| c == current))
                        .unwrap_or(usize::MAX);
                    key.push(index);
                    current = parent;
                }
                None => match node.data {
                    NodeData::ShadowRoot { host: Some(host), .. } => {
                        key.push(0);
                        current = host;
                    }
                    _ => break,
                },
            }
        }
        key.reverse();
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ComponentDefinition, ComponentOptions, SlotMode};

    fn multi_slot() -> std::rc::Rc<ComponentDefinition> {
        ComponentDefinition::new("multi")
            .options(ComponentOptions {
                slot_mode: SlotMode::Multiple,
                ..Default::default()
            })
            .build()
    }

    #[test]
    fn test_virtual_nodes_are_elided() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let block = tree.create_virtual_node(root, "block").unwrap();
        let a = tree.create_native_node(root, "a").unwrap();
        let b = tree.create_native_node(root, "b").unwrap();
        tree.append_child(root, block).unwrap();
        tree.append_child(block, a).unwrap();
        tree.append_child(root, b).unwrap();

        assert_eq!(tree.child_nodes(root).unwrap(), vec![a, b]);
        assert_eq!(tree.composed_children(root, ComposedView::WithVirtual), vec![block, b]);
        assert_eq!(tree.composed_parent(a).unwrap(), Some(root));
        assert_eq!(tree.composed_parent_in(a, ComposedView::WithVirtual), Some(block));
    }

    #[test]
    fn test_early_termination() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        for tag in ["a", "b", "c"] {
            let n = tree.create_native_node(root, tag).unwrap();
            tree.append_child(root, n).unwrap();
        }
        let mut seen = 0;
        let completed = tree
            .for_each_non_virtual_composed_child(root, |_| {
                seen += 1;
                seen < 2
            })
            .unwrap();
        assert!(!completed);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_slot_projection() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let comp = tree.create_component(root, "multi", multi_slot()).unwrap();
        let sr = tree.shadow_root(comp).unwrap();

        // <multi> shadow: <header/> <slot name="a"/> <slot/>
        let header = tree.create_native_node(sr, "header").unwrap();
        let slot_a = tree.create_slot(sr, "a").unwrap();
        let slot_default = tree.create_slot(sr, "").unwrap();
        tree.append_child(sr, header).unwrap();
        tree.append_child(sr, slot_a).unwrap();
        tree.append_child(sr, slot_default).unwrap();

        // content: <x/> <y slot="a"/>
        let x = tree.create_native_node(root, "x").unwrap();
        let y = tree.create_native_node(root, "y").unwrap();
        tree.set_slot(y, "a").unwrap();
        tree.append_child(root, comp).unwrap();
        tree.append_child(comp, x).unwrap();
        tree.append_child(comp, y).unwrap();

        assert_eq!(tree.child_nodes(comp).unwrap(), vec![header, y, x]);
        assert_eq!(tree.composed_parent(y).unwrap(), Some(comp));
        assert_eq!(tree.composed_parent_in(y, ComposedView::WithVirtual), Some(slot_a));
        assert!(tree.position_key(header) < tree.position_key(y));
        assert!(tree.position_key(y) < tree.position_key(x));
    }

    #[test]
    fn test_inherit_slots_flattened() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let comp = tree.create_component(root, "multi", multi_slot()).unwrap();
        let sr = tree.shadow_root(comp).unwrap();
        let slot_a = tree.create_slot(sr, "a").unwrap();
        let slot_b = tree.create_slot(sr, "b").unwrap();
        tree.append_child(sr, slot_a).unwrap();
        tree.append_child(sr, slot_b).unwrap();

        let wrapper = tree.create_virtual_node(root, "wx:if").unwrap();
        tree.set_inherit_slots(wrapper, true).unwrap();
        let p = tree.create_native_node(root, "p").unwrap();
        let q = tree.create_native_node(root, "q").unwrap();
        tree.set_slot(p, "b").unwrap();
        tree.set_slot(q, "a").unwrap();
        tree.append_child(wrapper, p).unwrap();
        tree.append_child(wrapper, q).unwrap();
        tree.append_child(comp, wrapper).unwrap();

        assert_eq!(tree.child_nodes(comp).unwrap(), vec![q, p]);
        assert_eq!(tree.composed_parent(p).unwrap(), Some(comp));
    }

    #[test]
    fn test_unassigned_content_has_no_composed_parent() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let comp = tree.create_component(root, "multi", multi_slot()).unwrap();
        let orphan = tree.create_native_node(root, "orphan").unwrap();
        tree.append_child(comp, orphan).unwrap();

        assert!(tree.child_nodes(comp).unwrap().is_empty());
        assert_eq!(tree.composed_parent(orphan).unwrap(), None);
    }
}
