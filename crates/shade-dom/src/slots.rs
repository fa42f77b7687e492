//! Slot tables and slot assignment
//!
//! Each shadow root keeps its slots in tree order. Host content (children
//! of the component, flattened through `inherit_slots` nodes) is assigned
//! to one of them according to the component's [`SlotMode`].

use crate::backend::DirtySet;
use crate::definition::SlotMode;
use crate::error::{TreeError, TreeResult};
use crate::node::NodeData;
use crate::tree::Tree;
use crate::NodeId;

impl Tree {
    /// Component whose slot content includes the children of `parent`
    pub(crate) fn slot_host_for_parent(&self, parent: NodeId) -> Option<NodeId> {
        let mut current = parent;
        loop {
            let node = self.get(current)?;
            if node.data.component().is_some() {
                return Some(current);
            }
            if !node.inherits_slots() {
                return None;
            }
            current = node.parent?;
        }
    }

    /// Host content flattened through `inherit_slots` nodes
    pub(crate) fn slot_content(&self, host: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(node) = self.get(host) {
            for &child in &node.children {
                self.collect_slot_content(child, &mut out);
            }
        }
        out
    }

    fn collect_slot_content(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.get(id) else {
            return;
        };
        if node.inherits_slots() {
            for &child in &node.children {
                self.collect_slot_content(child, out);
            }
        } else {
            out.push(id);
        }
    }

    /// Whether `id` or one of its same-scope descendants is a slot
    pub(crate) fn subtree_has_slot(&self, id: NodeId) -> bool {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            if node.slot_name().is_some() {
                return true;
            }
            stack.extend(node.children.iter().copied());
        }
        false
    }

    pub(crate) fn rebuild_slot_table(&mut self, shadow_root: NodeId) -> TreeResult<()> {
        let mut slots = Vec::new();
        let mut stack: Vec<NodeId> = self.node(shadow_root)?.children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            if node.slot_name().is_some() {
                slots.push(current);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        if let NodeData::ShadowRoot { slots: table, .. } = &mut self.node_mut(shadow_root)?.data {
            *table = slots;
        }
        Ok(())
    }

    fn slot_table(&self, shadow_root: NodeId) -> Vec<NodeId> {
        match self.get(shadow_root).map(|n| &n.data) {
            Some(NodeData::ShadowRoot { slots, .. }) => slots.clone(),
            _ => Vec::new(),
        }
    }

    fn slot_by_name(&self, slots: &[NodeId], name: &str) -> Option<NodeId> {
        slots
            .iter()
            .copied()
            .find(|&s| self.get(s).and_then(|n| n.slot_name()) == Some(name))
    }

    /// Recompute the slot of every content node of `host`
    pub(crate) fn reassign_slots(&mut self, host: NodeId, dirty: &mut DirtySet) -> TreeResult<()> {
        let content = self.slot_content(host);
        let data = self.component_data(host)?;
        let mode = data.definition.component_options().slot_mode;
        let slots = self.slot_table(data.shadow_root);

        let mut changes = Vec::new();
        for &c in &content {
            let node = self.node(c)?;
            let new_slot = match mode {
                SlotMode::Single => slots.first().copied(),
                SlotMode::Multiple => self.slot_by_name(&slots, node.target_slot()),
                SlotMode::Dynamic => data
                    .manual_slots
                    .get(&c)
                    .copied()
                    .filter(|s| slots.contains(s))
                    .or_else(|| self.slot_by_name(&slots, node.target_slot())),
            };
            if node.containing_slot != new_slot {
                changes.push((c, node.containing_slot, new_slot));
            }
        }

        self.component_data_mut(host)?
            .manual_slots
            .retain(|c, _| content.contains(c));

        for &(c, old_slot, new_slot) in &changes {
            self.mark_old_position(c, dirty);
            self.node_mut(c)?.containing_slot = new_slot;
            self.backend_reassign_slot(c, old_slot, new_slot)?;
        }
        for &(c, _, _) in &changes {
            self.mark_new_position(c, dirty);
        }
        if !changes.is_empty() {
            tracing::trace!("Reassigned {} content nodes of {:?}", changes.len(), host);
        }
        Ok(())
    }

    /// Clear the slot assignment of a node leaving a host
    pub(crate) fn clear_slot_assignment(&mut self, id: NodeId, dirty: &mut DirtySet) -> TreeResult<()> {
        let node = self.node(id)?;
        if node.inherits_slots() {
            for child in node.children.clone() {
                self.clear_slot_assignment(child, dirty)?;
            }
            return Ok(());
        }
        let Some(old_slot) = node.containing_slot else {
            return Ok(());
        };
        self.mark_old_position(id, dirty);
        self.node_mut(id)?.containing_slot = None;
        self.backend_reassign_slot(id, Some(old_slot), None)
    }

    /// Slots of a shadow tree in tree order
    pub fn slot_nodes(&self, shadow_root: NodeId) -> TreeResult<Vec<NodeId>> {
        self.expect_shadow_root(shadow_root)?;
        Ok(self.slot_table(shadow_root))
    }

    /// Content currently projected through a slot
    pub fn assigned_nodes(&self, slot: NodeId) -> TreeResult<Vec<NodeId>> {
        let node = self.node(slot)?;
        if node.slot_name().is_none() {
            return Err(self.wrong_kind(slot, "slot"));
        }
        let Some(host) = self.slot_host(slot) else {
            return Ok(Vec::new());
        };
        Ok(self
            .slot_content(host)
            .into_iter()
            .filter(|&c| self.get(c).is_some_and(|n| n.containing_slot == Some(slot)))
            .collect())
    }

    /// Route a content node of a dynamic-slot host to `slot`
    ///
    /// `None` drops the manual assignment and falls back to name matching.
    pub fn assign_slot(&mut self, host: NodeId, content: NodeId, slot: Option<NodeId>) -> TreeResult<()> {
        let data = self.component_data(host)?;
        if data.definition.component_options().slot_mode != SlotMode::Dynamic {
            return Err(self.wrong_kind(host, "dynamic slot host"));
        }
        let shadow_root = data.shadow_root;
        if !self.slot_content(host).contains(&content) {
            return Err(TreeError::NotAChild {
                parent: host,
                child: content,
            });
        }
        match slot {
            Some(slot) => {
                if !self.slot_table(shadow_root).contains(&slot) {
                    return Err(TreeError::NotAChild {
                        parent: shadow_root,
                        child: slot,
                    });
                }
                self.component_data_mut(host)?.manual_slots.insert(content, slot);
            }
            None => {
                self.component_data_mut(host)?.manual_slots.remove(&content);
            }
        }
        let mut dirty = DirtySet::default();
        self.reassign_slots(host, &mut dirty)?;
        self.sync_dirty(dirty)
    }
}
