//! Structural operations on shadow child lists
//!
//! Every public operation funnels into [`Tree::splice_children`], which
//! validates the whole request before touching the tree, then updates slot
//! assignments, the backend mirror, mutation observers and attachment state
//! in that order.

use crate::backend::DirtySet;
use crate::error::{DeferredError, TreeError, TreeResult};
use crate::node::NodeData;
use crate::observer::MutationRecord;
use crate::tree::Tree;
use crate::NodeId;

fn push_unique(list: &mut Vec<NodeId>, id: Option<NodeId>) {
    if let Some(id) = id {
        if !list.contains(&id) {
            list.push(id);
        }
    }
}

impl Tree {
    fn check_insert(&self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let node = self.node(child)?;
        if matches!(node.data, NodeData::ShadowRoot { .. } | NodeData::Fragment) {
            return Err(TreeError::HierarchyRequest { parent, child });
        }
        let mut current = Some(parent);
        while let Some(c) = current {
            if c == child {
                return Err(TreeError::HierarchyRequest { parent, child });
            }
            let n = self.node(c)?;
            current = match n.data {
                NodeData::ShadowRoot { host, .. } => host,
                _ => n.parent,
            };
        }
        let parent_is_fragment = matches!(self.node(parent)?.data, NodeData::Fragment);
        if !parent_is_fragment && self.scope_of(parent) != node.owner {
            return Err(TreeError::ShadowScopeMismatch { parent, child });
        }
        Ok(())
    }

    /// Position of `child` in the shadow child list of `parent`
    pub fn index_of(&self, parent: NodeId, child: NodeId) -> TreeResult<usize> {
        self.node(parent)?
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(TreeError::NotAChild { parent, child })
    }

    fn check_hint(&self, parent: NodeId, child: NodeId, hint: usize) -> TreeResult<usize> {
        let actual = self.index_of(parent, child)?;
        if actual != hint {
            return Err(TreeError::IndexMismatch { hint, actual });
        }
        Ok(actual)
    }

    fn fragment_children(&self, fragment: NodeId) -> TreeResult<Vec<NodeId>> {
        let node = self.node(fragment)?;
        if !matches!(node.data, NodeData::Fragment) {
            return Err(self.wrong_kind(fragment, "fragment"));
        }
        if node.parent.is_some() {
            return Err(TreeError::FragmentHasParent(fragment));
        }
        Ok(node.children.clone())
    }

    /// Replace `delete_count` children of `parent` starting at `index` with
    /// `inserts`. Inserted nodes are taken from their current parents.
    /// Returns the removed nodes.
    pub(crate) fn splice_children(
        &mut self,
        parent: NodeId,
        index: usize,
        delete_count: usize,
        inserts: Vec<NodeId>,
    ) -> TreeResult<Vec<NodeId>> {
        let parent_node = self.node(parent)?;
        if matches!(parent_node.data, NodeData::Text { .. }) {
            return Err(self.wrong_kind(parent, "container"));
        }
        let old_children = parent_node.children.clone();
        let len = old_children.len();
        let end = index
            .checked_add(delete_count)
            .filter(|&end| end <= len)
            .ok_or(TreeError::IndexOutOfRange {
                start: index,
                count: delete_count,
                len,
            })?;
        for (i, &child) in inserts.iter().enumerate() {
            if inserts[..i].contains(&child) {
                return Err(TreeError::HierarchyRequest { parent, child });
            }
            self.check_insert(parent, child)?;
        }

        let not_inserted = |c: &&NodeId| !inserts.contains(c);
        let deleted: Vec<NodeId> = old_children[index..end].iter().filter(not_inserted).copied().collect();
        let mut new_children: Vec<NodeId> = old_children[..index].iter().filter(not_inserted).copied().collect();
        new_children.extend(&inserts);
        new_children.extend(old_children[end..].iter().filter(not_inserted).copied());

        let parent_attached = self.node(parent)?.attached;
        let mut inserts_attached = Vec::with_capacity(inserts.len());
        let mut old_parents: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        // Reordered children are reported as removed and added
        let mut removed_records = deleted.clone();
        for &c in &inserts {
            let node = self.node(c)?;
            inserts_attached.push(node.attached);
            match node.parent {
                Some(p) if p == parent => removed_records.push(c),
                Some(p) => match old_parents.iter_mut().find(|(q, _)| *q == p) {
                    Some((_, moved)) => moved.push(c),
                    None => old_parents.push((p, vec![c])),
                },
                None => {}
            }
        }
        let mut deleted_attached = Vec::with_capacity(deleted.len());
        for &c in &deleted {
            deleted_attached.push(self.node(c)?.attached);
        }

        let mut dirty = DirtySet::default();
        for &c in deleted.iter().chain(&inserts) {
            self.mark_old_position(c, &mut dirty);
            self.clear_slot_assignment(c, &mut dirty)?;
        }

        for (p, moved) in &old_parents {
            self.node_mut(*p)?.children.retain(|c| !moved.contains(c));
        }
        for &c in &deleted {
            self.node_mut(c)?.parent = None;
        }
        for &c in &inserts {
            self.node_mut(c)?.parent = Some(parent);
        }
        self.node_mut(parent)?.children = new_children;

        // Slot tables, then assignments of every affected host
        let mut hosts = Vec::new();
        let mut scopes = Vec::new();
        for &c in deleted.iter().chain(&inserts) {
            if self.subtree_has_slot(c) {
                push_unique(&mut scopes, self.node(c)?.owner);
            }
        }
        for scope in scopes {
            if let Some(host) = self.host_of(scope) {
                self.rebuild_slot_table(scope)?;
                push_unique(&mut hosts, Some(host));
            }
        }
        push_unique(&mut hosts, self.slot_host_for_parent(parent));
        for (p, _) in &old_parents {
            push_unique(&mut hosts, self.slot_host_for_parent(*p));
        }
        for host in hosts {
            self.reassign_slots(host, &mut dirty)?;
        }

        for &c in &inserts {
            self.mark_new_position(c, &mut dirty);
        }
        self.sync_dirty(dirty)?;
        tracing::trace!(
            "Spliced {:?} at {}: -{} +{}",
            parent,
            index,
            deleted.len(),
            inserts.len()
        );

        // Every notification runs; the first user-code error is returned last
        let mut deferred = DeferredError::default();
        for (p, moved) in &old_parents {
            if !matches!(self.node(*p)?.data, NodeData::Fragment) {
                let notified = self.notify(MutationRecord::child_list(*p, Vec::new(), moved.clone()));
                deferred.check(notified)?;
            }
        }
        if !inserts.is_empty() || !deleted.is_empty() {
            let notified = self.notify(MutationRecord::child_list(parent, inserts.clone(), removed_records));
            deferred.check(notified)?;
        }

        for (&c, &was_attached) in deleted.iter().zip(&deleted_attached) {
            if was_attached {
                let detached = self.detach_subtree(c);
                deferred.check(detached)?;
            }
        }
        for (&c, &was_attached) in inserts.iter().zip(&inserts_attached) {
            let result = match (was_attached, parent_attached) {
                (false, true) => self.attach_subtree(c),
                (true, true) => self.move_subtree(c),
                (true, false) => self.detach_subtree(c),
                (false, false) => Ok(()),
            };
            deferred.check(result)?;
        }
        deferred.finish()?;
        Ok(deleted)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let len = self.node(parent)?.children.len();
        self.splice_children(parent, len, 0, vec![child])?;
        Ok(())
    }

    /// Insert `child` before `before` (DOM semantics: an existing parent
    /// loses the child first)
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, before: NodeId) -> TreeResult<()> {
        let index = self.index_of(parent, before)?;
        self.splice_children(parent, index, 0, vec![child])?;
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let index = self.index_of(parent, child)?;
        self.splice_children(parent, index, 1, Vec::new())?;
        Ok(())
    }

    pub fn replace_child(&mut self, parent: NodeId, child: NodeId, old_child: NodeId) -> TreeResult<()> {
        let index = self.index_of(parent, old_child)?;
        self.splice_children(parent, index, 1, vec![child])?;
        Ok(())
    }

    /// [`Tree::insert_before`] with the expected index of `before`
    pub fn insert_before_at(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: NodeId,
        index: usize,
    ) -> TreeResult<()> {
        let index = self.check_hint(parent, before, index)?;
        self.splice_children(parent, index, 0, vec![child])?;
        Ok(())
    }

    /// [`Tree::remove_child`] with the expected index of `child`
    pub fn remove_child_at(&mut self, parent: NodeId, child: NodeId, index: usize) -> TreeResult<()> {
        let index = self.check_hint(parent, child, index)?;
        self.splice_children(parent, index, 1, Vec::new())?;
        Ok(())
    }

    /// [`Tree::replace_child`] with the expected index of `old_child`
    pub fn replace_child_at(
        &mut self,
        parent: NodeId,
        child: NodeId,
        old_child: NodeId,
        index: usize,
    ) -> TreeResult<()> {
        let index = self.check_hint(parent, old_child, index)?;
        self.splice_children(parent, index, 1, vec![child])?;
        Ok(())
    }

    /// Remove `delete_count` children starting at `before` and insert the
    /// content of `fragment` in their place
    pub fn splice_before(
        &mut self,
        parent: NodeId,
        before: NodeId,
        delete_count: usize,
        fragment: NodeId,
    ) -> TreeResult<Vec<NodeId>> {
        let inserts = self.fragment_children(fragment)?;
        let index = self.index_of(parent, before)?;
        self.splice_children(parent, index, delete_count, inserts)
    }

    /// Append the content of `fragment`
    pub fn splice_append(&mut self, parent: NodeId, fragment: NodeId) -> TreeResult<()> {
        let inserts = self.fragment_children(fragment)?;
        let len = self.node(parent)?.children.len();
        self.splice_children(parent, len, 0, inserts)?;
        Ok(())
    }

    /// Remove `delete_count` children starting at `start`
    pub fn splice_remove(&mut self, parent: NodeId, start: NodeId, delete_count: usize) -> TreeResult<Vec<NodeId>> {
        let index = self.index_of(parent, start)?;
        self.splice_children(parent, index, delete_count, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ComponentDefinition;

    fn with_children(tree: &mut Tree, root: NodeId, tags: &[&str]) -> Vec<NodeId> {
        tags.iter()
            .map(|tag| {
                let n = tree.create_native_node(root, tag).unwrap();
                tree.append_child(root, n).unwrap();
                n
            })
            .collect()
    }

    #[test]
    fn test_append_moves_existing_child() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let nodes = with_children(&mut tree, root, &["a", "b"]);
        let div = tree.create_native_node(root, "div").unwrap();
        tree.append_child(root, div).unwrap();
        tree.append_child(div, nodes[0]).unwrap();

        assert_eq!(tree.children(root).unwrap(), &[nodes[1], div]);
        assert_eq!(tree.parent(nodes[0]).unwrap(), Some(div));
    }

    #[test]
    fn test_index_hints() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let nodes = with_children(&mut tree, root, &["a", "b", "c"]);
        let x = tree.create_native_node(root, "x").unwrap();

        let err = tree.insert_before_at(root, x, nodes[1], 2).unwrap_err();
        assert!(matches!(err, TreeError::IndexMismatch { hint: 2, actual: 1 }));
        assert_eq!(tree.parent(x).unwrap(), None);

        tree.insert_before_at(root, x, nodes[1], 1).unwrap();
        tree.remove_child_at(root, nodes[2], 3).unwrap();
        assert_eq!(tree.children(root).unwrap(), &[nodes[0], x, nodes[1]]);
    }

    #[test]
    fn test_cycles_rejected() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let outer = tree.create_native_node(root, "outer").unwrap();
        let inner = tree.create_native_node(root, "inner").unwrap();
        tree.append_child(outer, inner).unwrap();
        assert!(matches!(
            tree.append_child(inner, outer),
            Err(TreeError::HierarchyRequest { .. })
        ));
        assert!(matches!(
            tree.append_child(outer, outer),
            Err(TreeError::HierarchyRequest { .. })
        ));
        assert!(matches!(
            tree.append_child(outer, root),
            Err(TreeError::HierarchyRequest { .. })
        ));
    }

    #[test]
    fn test_scope_mismatch() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let comp = tree
            .create_component(root, "comp", ComponentDefinition::new("comp").build())
            .unwrap();
        let sr = tree.shadow_root(comp).unwrap();
        let inside = tree.create_native_node(sr, "div").unwrap();
        assert!(matches!(
            tree.append_child(root, inside),
            Err(TreeError::ShadowScopeMismatch { .. })
        ));
        // content of the component belongs to the outer tree
        let content = tree.create_native_node(root, "span").unwrap();
        tree.append_child(comp, content).unwrap();
    }

    #[test]
    fn test_text_nodes_have_no_children() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let text = tree.create_text_node(root, "hello").unwrap();
        let div = tree.create_native_node(root, "div").unwrap();
        assert!(matches!(
            tree.append_child(text, div),
            Err(TreeError::WrongNodeKind { .. })
        ));
    }

    #[test]
    fn test_splices_consume_fragment() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let nodes = with_children(&mut tree, root, &["a", "b", "c"]);
        let fragment = tree.create_fragment().unwrap();
        let x = tree.create_native_node(root, "x").unwrap();
        let y = tree.create_native_node(root, "y").unwrap();
        tree.append_child(fragment, x).unwrap();
        tree.append_child(fragment, y).unwrap();

        let removed = tree.splice_before(root, nodes[1], 1, fragment).unwrap();
        assert_eq!(removed, vec![nodes[1]]);
        assert_eq!(tree.children(root).unwrap(), &[nodes[0], x, y, nodes[2]]);
        assert!(tree.children(fragment).unwrap().is_empty());
        assert_eq!(tree.parent(nodes[1]).unwrap(), None);

        let removed = tree.splice_remove(root, x, 2).unwrap();
        assert_eq!(removed, vec![x, y]);
        assert_eq!(tree.children(root).unwrap(), &[nodes[0], nodes[2]]);

        assert!(matches!(
            tree.splice_remove(root, nodes[0], 3),
            Err(TreeError::IndexOutOfRange { start: 0, count: 3, len: 2 })
        ));
        assert!(matches!(
            tree.splice_append(root, nodes[0]),
            Err(TreeError::WrongNodeKind { .. })
        ));
    }

    #[test]
    fn test_replace_child() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let nodes = with_children(&mut tree, root, &["a", "b"]);
        let x = tree.create_native_node(root, "x").unwrap();
        tree.replace_child(root, x, nodes[0]).unwrap();
        assert_eq!(tree.children(root).unwrap(), &[x, nodes[1]]);
        assert!(matches!(
            tree.replace_child(root, nodes[0], nodes[0]),
            Err(TreeError::NotAChild { .. })
        ));
        tree.replace_child_at(root, nodes[0], nodes[1], 1).unwrap();
        assert_eq!(tree.children(root).unwrap(), &[x, nodes[0]]);
    }
}
