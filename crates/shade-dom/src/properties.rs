//! Element properties
//!
//! Setters update the node, forward the change to a live backend element
//! and emit a mutation record.

use std::collections::BTreeMap;

use serde_json::Value;
use shade_backend::BackendMode;

use crate::backend::DirtySet;
use crate::composed::ComposedView;
use crate::error::TreeResult;
use crate::node::{ElementData, NodeData};
use crate::observer::{MutationRecord, NameType};
use crate::tree::Tree;
use crate::NodeId;

impl Tree {
    fn update_element_data(&mut self, id: NodeId, f: impl FnOnce(&mut ElementData)) -> TreeResult<()> {
        f(self.element_data_mut(id)?);
        Ok(())
    }

    pub fn set_id(&mut self, id: NodeId, value: &str) -> TreeResult<()> {
        self.update_element_data(id, |e| e.id = value.to_string())?;
        self.update_element(id, |backend, el| backend.set_id(el, value))?;
        self.notify(MutationRecord::property(id, NameType::Basic, "id"))
    }

    /// Replace all classes with the whitespace separated list `classes`
    pub fn set_classes(&mut self, id: NodeId, classes: &str) -> TreeResult<()> {
        let list: Vec<String> = classes.split_whitespace().map(str::to_string).collect();
        self.update_element_data(id, |e| e.classes = list.clone())?;
        self.update_element(id, |backend, el| {
            backend.clear_classes(el)?;
            list.iter().try_for_each(|class| backend.add_class(el, class))
        })?;
        self.notify(MutationRecord::property(id, NameType::Class, "class"))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> TreeResult<()> {
        if self.element_data(id)?.classes.iter().any(|c| c == class) {
            return Ok(());
        }
        self.update_element_data(id, |e| e.classes.push(class.to_string()))?;
        self.update_element(id, |backend, el| backend.add_class(el, class))?;
        self.notify(MutationRecord::property(id, NameType::Class, "class"))
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> TreeResult<()> {
        if !self.element_data(id)?.classes.iter().any(|c| c == class) {
            return Ok(());
        }
        self.update_element_data(id, |e| e.classes.retain(|c| c != class))?;
        self.update_element(id, |backend, el| backend.remove_class(el, class))?;
        self.notify(MutationRecord::property(id, NameType::Class, "class"))
    }

    pub fn set_style(&mut self, id: NodeId, style: &str) -> TreeResult<()> {
        self.update_element_data(id, |e| e.style = style.to_string())?;
        self.update_element(id, |backend, el| backend.set_style(el, style))?;
        self.notify(MutationRecord::property(id, NameType::Style, "style"))
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> TreeResult<()> {
        self.update_element_data(id, |e| {
            e.attributes.insert(name.to_string(), value.to_string());
        })?;
        self.update_element(id, |backend, el| backend.set_attribute(el, name, value))?;
        self.notify(MutationRecord::property(id, NameType::Attribute, name))
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> TreeResult<()> {
        let mut removed = false;
        self.update_element_data(id, |e| removed = e.attributes.remove(name).is_some())?;
        if !removed {
            return Ok(());
        }
        self.update_element(id, |backend, el| backend.remove_attribute(el, name))?;
        self.notify(MutationRecord::property(id, NameType::Attribute, name))
    }

    /// `data-*` value, read by event handlers through the target
    pub fn set_dataset(&mut self, id: NodeId, name: &str, value: Value) -> TreeResult<()> {
        self.update_element_data(id, |e| {
            e.dataset.insert(name.to_string(), value);
        })?;
        self.notify(MutationRecord::property(id, NameType::Dataset, name))
    }

    /// Mark merged into events passing through this node
    pub fn set_mark(&mut self, id: NodeId, name: &str, value: Value) -> TreeResult<()> {
        self.update_element_data(id, |e| {
            e.marks.insert(name.to_string(), value);
        })?;
        self.notify(MutationRecord::property(id, NameType::Mark, name))
    }

    /// Name of the slot this node is routed to
    pub fn set_slot(&mut self, id: NodeId, slot: &str) -> TreeResult<()> {
        self.update_element_data(id, |e| e.slot = slot.to_string())?;
        let host = self.node(id)?.parent.and_then(|p| self.slot_host_for_parent(p));
        if let Some(host) = host {
            let mut dirty = DirtySet::default();
            self.reassign_slots(host, &mut dirty)?;
            self.sync_dirty(dirty)?;
        }
        self.notify(MutationRecord::property(id, NameType::Basic, "slot"))
    }

    /// Turn the node into a slot named `name` (empty for the default slot)
    pub fn set_slot_name(&mut self, id: NodeId, name: &str) -> TreeResult<()> {
        let was_slot = self.element_data(id)?.slot_name.is_some();
        let mut dirty = DirtySet::default();
        self.mark_old_position(id, &mut dirty);
        if !was_slot {
            for child in self.composed_children(id, ComposedView::WithVirtual) {
                self.mark_old_position(child, &mut dirty);
            }
        }

        self.update_element_data(id, |e| e.slot_name = Some(name.to_string()))?;
        if self.backend_mode() == Some(BackendMode::Shadow) {
            self.update_element(id, |backend, el| backend.set_slot_name(el, name))?;
        }
        let owner = self.node(id)?.owner;
        if let Some(owner) = owner {
            self.rebuild_slot_table(owner)?;
            if let Some(host) = self.host_of(owner) {
                self.reassign_slots(host, &mut dirty)?;
            }
        }

        dirty.add(id);
        self.mark_new_position(id, &mut dirty);
        self.sync_dirty(dirty)?;
        self.notify(MutationRecord::property(id, NameType::Basic, "name"))
    }

    /// Make the node transparent to slot assignment and composition
    pub fn set_inherit_slots(&mut self, id: NodeId, inherit: bool) -> TreeResult<()> {
        if self.element_data(id)?.inherit_slots == inherit {
            return Ok(());
        }
        let mut dirty = DirtySet::default();
        self.mark_old_position(id, &mut dirty);
        self.clear_slot_assignment(id, &mut dirty)?;

        self.update_element_data(id, |e| e.inherit_slots = inherit)?;
        let host = self.node(id)?.parent.and_then(|p| self.slot_host_for_parent(p));
        if let Some(host) = host {
            self.reassign_slots(host, &mut dirty)?;
        }

        self.mark_new_position(id, &mut dirty);
        for child in self.node(id)?.children.clone() {
            self.mark_new_position(child, &mut dirty);
        }
        self.sync_dirty(dirty)?;
        self.notify(MutationRecord::property(id, NameType::Basic, "inherit-slots"))
    }

    /// Component property
    pub fn set_property(&mut self, component: NodeId, name: &str, value: Value) -> TreeResult<()> {
        self.component_data_mut(component)?
            .properties
            .insert(name.to_string(), value);
        self.notify(MutationRecord::property(component, NameType::ComponentProperty, name))
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> TreeResult<()> {
        if !matches!(self.node(id)?.data, NodeData::Text { .. }) {
            return Err(self.wrong_kind(id, "text node"));
        }
        if let NodeData::Text { content } = &mut self.node_mut(id)?.data {
            *content = text.to_string();
        }
        self.update_element(id, |backend, el| backend.set_text(el, text))?;
        self.notify(MutationRecord::character_data(id))
    }

    // --- Getters ---

    pub fn id(&self, id: NodeId) -> TreeResult<&str> {
        Ok(&self.element_data(id)?.id)
    }

    pub fn classes(&self, id: NodeId) -> TreeResult<&[String]> {
        Ok(&self.element_data(id)?.classes)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> TreeResult<bool> {
        Ok(self.element_data(id)?.classes.iter().any(|c| c == class))
    }

    pub fn style(&self, id: NodeId) -> TreeResult<&str> {
        Ok(&self.element_data(id)?.style)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> TreeResult<Option<&str>> {
        Ok(self.element_data(id)?.attributes.get(name).map(String::as_str))
    }

    pub fn attributes(&self, id: NodeId) -> TreeResult<&BTreeMap<String, String>> {
        Ok(&self.element_data(id)?.attributes)
    }

    pub fn dataset(&self, id: NodeId) -> TreeResult<&BTreeMap<String, Value>> {
        Ok(&self.element_data(id)?.dataset)
    }

    pub fn marks(&self, id: NodeId) -> TreeResult<&BTreeMap<String, Value>> {
        Ok(&self.element_data(id)?.marks)
    }

    pub fn slot(&self, id: NodeId) -> TreeResult<&str> {
        Ok(&self.element_data(id)?.slot)
    }

    /// Slot name, `None` unless the node is a slot
    pub fn slot_name(&self, id: NodeId) -> TreeResult<Option<&str>> {
        Ok(self.element_data(id)?.slot_name.as_deref())
    }

    pub fn inherit_slots(&self, id: NodeId) -> TreeResult<bool> {
        Ok(self.element_data(id)?.inherit_slots)
    }

    pub fn property(&self, component: NodeId, name: &str) -> TreeResult<Option<&Value>> {
        Ok(self.component_data(component)?.properties.get(name))
    }

    pub fn text(&self, id: NodeId) -> TreeResult<&str> {
        match &self.node(id)?.data {
            NodeData::Text { content } => Ok(content),
            _ => Err(self.wrong_kind(id, "text node")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shade_backend::MemoryBackend;

    use super::*;
    use crate::definition::ComponentDefinition;
    use crate::error::TreeError;
    use crate::node::NodeType;

    #[test]
    fn test_classes() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let div = tree.create_native_node(root, "div").unwrap();
        tree.set_classes(div, "  a b\tc ").unwrap();
        assert_eq!(tree.classes(div).unwrap(), ["a", "b", "c"]);
        tree.add_class(div, "b").unwrap();
        tree.add_class(div, "d").unwrap();
        tree.remove_class(div, "a").unwrap();
        assert_eq!(tree.classes(div).unwrap(), ["b", "c", "d"]);
        assert!(tree.has_class(div, "d").unwrap());
    }

    #[test]
    fn test_text_only_on_text_nodes() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let div = tree.create_native_node(root, "div").unwrap();
        let text = tree.create_text_node(root, "hi").unwrap();
        tree.set_text(text, "there").unwrap();
        assert_eq!(tree.text(text).unwrap(), "there");
        let err = tree.set_text(div, "x").unwrap_err();
        assert!(matches!(
            err,
            TreeError::WrongNodeKind {
                actual: NodeType::NativeNode,
                ..
            }
        ));
        assert!(tree.set_id(text, "x").is_err());
    }

    #[test]
    fn test_component_properties() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let comp = tree
            .create_component(root, "comp", ComponentDefinition::new("comp").build())
            .unwrap();
        tree.set_property(comp, "count", json!(3)).unwrap();
        assert_eq!(tree.property(comp, "count").unwrap(), Some(&json!(3)));
        assert_eq!(tree.property(comp, "other").unwrap(), None);
        assert!(tree.set_property(root, "count", json!(1)).is_err());
    }

    #[test]
    fn test_backend_receives_properties() {
        let backend = MemoryBackend::new(BackendMode::Domlike);
        let mut tree = Tree::with_backend(Box::new(backend.clone()));
        let root = tree.create_root().unwrap();
        let div = tree.create_native_node(root, "div").unwrap();
        tree.append_child(root, div).unwrap();
        tree.set_id(div, "d").unwrap();
        tree.set_attribute(div, "title", "t").unwrap();
        tree.remove_attribute(div, "title").unwrap();
        tree.set_dataset(div, "key", json!("v")).unwrap();

        let root_element = tree.backend_element(root).unwrap().unwrap();
        assert_eq!(backend.serialize_children(root_element), "<div#d></div>");
        assert_eq!(tree.attribute(div, "title").unwrap(), None);
        assert_eq!(tree.dataset(div).unwrap().get("key"), Some(&json!("v")));
    }
}
