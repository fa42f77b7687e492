//! Relations between component definitions
//!
//! A relation is declared on both sides: the lower component declares an
//! upward type (`Parent`, `Ancestor`, `ParentCommonNode`) and the upper one
//! the counterpart. Only lower components search; a found pair becomes an
//! edge in the [`RelationIndex`] until it is unlinked.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::context::{ErrorKind, ErrorOrigin};
use crate::definition::ComponentDefinition;
use crate::error::TreeResult;
use crate::node::NodeData;
use crate::tree::Tree;
use crate::NodeId;

/// Relation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationType {
    Parent,
    Child,
    Ancestor,
    Descendant,
    ParentCommonNode,
    ChildCommonNode,
}

impl RelationType {
    /// Type the other side has to declare
    pub fn counterpart(self) -> Self {
        match self {
            Self::Parent => Self::Child,
            Self::Child => Self::Parent,
            Self::Ancestor => Self::Descendant,
            Self::Descendant => Self::Ancestor,
            Self::ParentCommonNode => Self::ChildCommonNode,
            Self::ChildCommonNode => Self::ParentCommonNode,
        }
    }

    /// Whether the declaring component is the lower side
    pub fn is_upward(self) -> bool {
        matches!(self, Self::Parent | Self::Ancestor | Self::ParentCommonNode)
    }
}

/// What the other side of a relation must be
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationTarget {
    /// A component with this `is`
    Component(String),
    /// Any component using this behavior
    Behavior(String),
}

impl RelationTarget {
    pub fn matches(&self, definition: &ComponentDefinition) -> bool {
        match self {
            Self::Component(is) => definition.is() == is,
            Self::Behavior(name) => definition.has_behavior(name),
        }
    }
}

/// Called with the declaring node and the node on the other side
pub type RelationCallback = Rc<dyn Fn(&mut Tree, NodeId, NodeId) -> anyhow::Result<()>>;

/// Called with the declaring node when no counterpart was found
pub type LinkFailedCallback = Rc<dyn Fn(&mut Tree, NodeId) -> anyhow::Result<()>>;

/// A relation declared by a component definition
#[derive(Clone)]
pub struct RelationDefinition {
    name: String,
    relation_type: RelationType,
    target: RelationTarget,
    linked: Option<RelationCallback>,
    link_changed: Option<RelationCallback>,
    unlinked: Option<RelationCallback>,
    link_failed: Option<LinkFailedCallback>,
}

impl RelationDefinition {
    pub fn new(name: &str, relation_type: RelationType, target: RelationTarget) -> Self {
        Self {
            name: name.to_string(),
            relation_type,
            target,
            linked: None,
            link_changed: None,
            unlinked: None,
            link_failed: None,
        }
    }

    pub fn linked(mut self, f: impl Fn(&mut Tree, NodeId, NodeId) -> anyhow::Result<()> + 'static) -> Self {
        self.linked = Some(Rc::new(f));
        self
    }

    /// Called when a moved node keeps the same counterpart
    pub fn link_changed(
        mut self,
        f: impl Fn(&mut Tree, NodeId, NodeId) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.link_changed = Some(Rc::new(f));
        self
    }

    pub fn unlinked(mut self, f: impl Fn(&mut Tree, NodeId, NodeId) -> anyhow::Result<()> + 'static) -> Self {
        self.unlinked = Some(Rc::new(f));
        self
    }

    pub fn link_failed(mut self, f: impl Fn(&mut Tree, NodeId) -> anyhow::Result<()> + 'static) -> Self {
        self.link_failed = Some(Rc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relation_type(&self) -> RelationType {
        self.relation_type
    }

    pub fn target(&self) -> &RelationTarget {
        &self.target
    }
}

impl fmt::Debug for RelationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDefinition")
            .field("name", &self.name)
            .field("relation_type", &self.relation_type)
            .field("target", &self.target)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkEdge {
    pub(crate) upper: NodeId,
    pub(crate) upper_relation: String,
    pub(crate) lower: NodeId,
    pub(crate) lower_relation: String,
}

/// Live relation edges
#[derive(Debug, Default)]
pub(crate) struct RelationIndex {
    edges: Vec<LinkEdge>,
}

impl RelationIndex {
    pub(crate) fn remove_node(&mut self, id: NodeId) {
        self.edges.retain(|e| e.upper != id && e.lower != id);
    }
}

/// Why relations are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelationCause {
    Attach,
    Move,
    Resync,
}

#[derive(Debug, Clone, Copy)]
enum LinkEvent {
    Linked,
    Changed,
    Unlinked,
}

impl Tree {
    /// One step up for relation searches; a shadow root steps to its host
    fn relation_up(&self, id: NodeId) -> Option<(NodeId, bool)> {
        let node = self.get(id)?;
        if let Some(parent) = node.parent {
            return match self.get(parent)?.data {
                NodeData::ShadowRoot { host, .. } => host.map(|h| (h, true)),
                _ => Some((parent, false)),
            };
        }
        None
    }

    /// Name of the counterpart relation `upper` declares for `lower`
    fn counterpart_relation(
        &self,
        upper: NodeId,
        lower_definition: &ComponentDefinition,
        relation: &RelationDefinition,
    ) -> Option<String> {
        let upper_definition = &self.get(upper)?.data.component()?.definition;
        if !relation.target.matches(upper_definition) {
            return None;
        }
        let wanted = relation.relation_type.counterpart();
        upper_definition
            .relations()
            .iter()
            .find(|r| r.relation_type == wanted && r.target.matches(lower_definition))
            .map(|r| r.name.clone())
    }

    fn find_upper(
        &self,
        lower: NodeId,
        lower_definition: &ComponentDefinition,
        relation: &RelationDefinition,
    ) -> Option<(NodeId, String)> {
        let mut current = lower;
        loop {
            let (candidate, crossed) = self.relation_up(current)?;
            current = candidate;
            let node = self.get(candidate)?;
            match relation.relation_type {
                RelationType::Parent => {
                    if matches!(node.data, NodeData::Virtual { .. }) && !crossed {
                        continue;
                    }
                    return self
                        .counterpart_relation(candidate, lower_definition, relation)
                        .map(|name| (candidate, name));
                }
                RelationType::Ancestor => {
                    if let Some(name) = self.counterpart_relation(candidate, lower_definition, relation) {
                        return Some((candidate, name));
                    }
                    if crossed {
                        return None;
                    }
                }
                RelationType::ParentCommonNode => {
                    if let Some(name) = self.counterpart_relation(candidate, lower_definition, relation) {
                        return Some((candidate, name));
                    }
                }
                _ => return None,
            }
        }
    }

    fn call_link_event(&mut self, node: NodeId, relation_name: &str, other: NodeId, event: LinkEvent) -> TreeResult<()> {
        let Some(definition) = self.get(node).and_then(|n| n.data.component()).map(|d| d.definition.clone()) else {
            return Ok(());
        };
        let Some(relation) = definition.relation_named(relation_name) else {
            return Ok(());
        };
        let callback = match event {
            LinkEvent::Linked => relation.linked.clone(),
            LinkEvent::Changed => relation.link_changed.clone(),
            LinkEvent::Unlinked => relation.unlinked.clone(),
        };
        if let Some(callback) = callback {
            if let Err(error) = callback(self, node, other) {
                let origin = ErrorOrigin::new(ErrorKind::Relation, Some(node), relation_name);
                self.context.dispatch_error(error, origin)?;
            }
        }
        Ok(())
    }

    /// Fire an event on both sides of an edge, upper side first
    fn fire_edge(&mut self, edge: &LinkEdge, event: LinkEvent) -> TreeResult<()> {
        tracing::trace!("Relation {:?}: {:?} <-> {:?}", event, edge.upper, edge.lower);
        self.call_link_event(edge.upper, &edge.upper_relation, edge.lower, event)?;
        self.call_link_event(edge.lower, &edge.lower_relation, edge.upper, event)
    }

    fn link_failed(&mut self, lower: NodeId, relation: &RelationDefinition) -> TreeResult<()> {
        if self.context.options().report_link_failed {
            let message = format!(
                "relation `{}` of <{}> found no {:?} counterpart",
                relation.name,
                self.tag_name(lower).unwrap_or_default(),
                relation.relation_type.counterpart()
            );
            self.context.dispatch_warning(&message);
        }
        if let Some(callback) = relation.link_failed.clone() {
            if let Err(error) = callback(self, lower) {
                let origin = ErrorOrigin::new(ErrorKind::Relation, Some(lower), relation.name.as_str());
                self.context.dispatch_error(error, origin)?;
            }
        }
        Ok(())
    }

    /// Re-resolve the upward relations of a lower component
    pub(crate) fn resolve_node_relations(&mut self, lower: NodeId, cause: RelationCause) -> TreeResult<()> {
        let Some(definition) = self.get(lower).and_then(|n| n.data.component()).map(|d| d.definition.clone()) else {
            return Ok(());
        };
        for relation in definition.relations().iter().filter(|r| r.relation_type.is_upward()) {
            let found = self.find_upper(lower, &definition, relation);
            let existing = self
                .relations
                .edges
                .iter()
                .position(|e| e.lower == lower && e.lower_relation == relation.name);

            if let Some(index) = existing {
                let edge = &self.relations.edges[index];
                let unchanged = found
                    .as_ref()
                    .is_some_and(|(upper, name)| edge.upper == *upper && edge.upper_relation == *name);
                if unchanged {
                    if cause == RelationCause::Move {
                        let edge = edge.clone();
                        self.fire_edge(&edge, LinkEvent::Changed)?;
                    }
                    continue;
                }
                let edge = self.relations.edges.remove(index);
                self.fire_edge(&edge, LinkEvent::Unlinked)?;
            }

            match found {
                Some((upper, upper_relation)) => {
                    let edge = LinkEdge {
                        upper,
                        upper_relation,
                        lower,
                        lower_relation: relation.name.clone(),
                    };
                    self.relations.edges.push(edge.clone());
                    self.fire_edge(&edge, LinkEvent::Linked)?;
                }
                None if cause != RelationCause::Resync => self.link_failed(lower, relation)?,
                None => {}
            }
        }
        Ok(())
    }

    /// Unlink every edge whose lower side is `lower`
    pub(crate) fn unlink_lower(&mut self, lower: NodeId) -> TreeResult<()> {
        let (removed, kept) = std::mem::take(&mut self.relations.edges)
            .into_iter()
            .partition::<Vec<_>, _>(|e| e.lower == lower);
        self.relations.edges = kept;
        for edge in removed {
            self.fire_edge(&edge, LinkEvent::Unlinked)?;
        }
        Ok(())
    }

    /// Re-resolve relations of every attached component in the subtree
    ///
    /// Links that still hold are left alone, so calling this repeatedly
    /// fires nothing.
    pub fn resolve_relations(&mut self, id: NodeId) -> TreeResult<()> {
        self.node(id)?;
        for n in self.attach_order(id) {
            if self.get(n).is_some_and(|node| node.attached && node.data.component().is_some()) {
                self.resolve_node_relations(n, RelationCause::Resync)?;
            }
        }
        Ok(())
    }

    /// Nodes currently linked to `id` through its relation `name`, in
    /// composed order
    pub fn get_relation_nodes(&self, id: NodeId, name: &str) -> TreeResult<Vec<NodeId>> {
        self.node(id)?;
        let mut nodes: Vec<NodeId> = self
            .relations
            .edges
            .iter()
            .filter_map(|e| {
                if e.upper == id && e.upper_relation == name {
                    Some(e.lower)
                } else if e.lower == id && e.lower_relation == name {
                    Some(e.upper)
                } else {
                    None
                }
            })
            .collect();
        nodes.sort_by_cached_key(|&n| self.position_key(n));
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    type Log = Rc<RefCell<Vec<String>>>;

    fn record(log: &Log, label: &str) -> impl Fn(&mut Tree, NodeId, NodeId) -> anyhow::Result<()> + 'static {
        let log = log.clone();
        let label = label.to_string();
        move |_, _, _| {
            log.borrow_mut().push(label.clone());
            Ok(())
        }
    }

    fn parent_child(log: &Log) -> (Rc<ComponentDefinition>, Rc<ComponentDefinition>) {
        let parent = ComponentDefinition::new("p")
            .relation(
                RelationDefinition::new("c", RelationType::Child, RelationTarget::Component("c".into()))
                    .linked(record(log, "P.linked"))
                    .link_changed(record(log, "P.changed"))
                    .unlinked(record(log, "P.unlinked")),
            )
            .unwrap()
            .build();
        let child = ComponentDefinition::new("c")
            .relation(
                RelationDefinition::new("p", RelationType::Parent, RelationTarget::Component("p".into()))
                    .linked(record(log, "C.linked"))
                    .link_changed(record(log, "C.changed"))
                    .unlinked(record(log, "C.unlinked")),
            )
            .unwrap()
            .build();
        (parent, child)
    }

    #[test]
    fn test_link_and_unlink_order() {
        let log: Log = Default::default();
        let (p_def, c_def) = parent_child(&log);
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        tree.pretend_attached(root).unwrap();
        let p = tree.create_component(root, "p", p_def).unwrap();
        tree.append_child(root, p).unwrap();
        let c = tree.create_component(root, "c", c_def).unwrap();

        tree.append_child(p, c).unwrap();
        assert_eq!(*log.borrow(), ["P.linked", "C.linked"]);
        assert_eq!(tree.get_relation_nodes(p, "c").unwrap(), vec![c]);
        assert_eq!(tree.get_relation_nodes(c, "p").unwrap(), vec![p]);

        log.borrow_mut().clear();
        tree.resolve_relations(root).unwrap();
        assert!(log.borrow().is_empty());

        tree.remove_child(p, c).unwrap();
        assert_eq!(*log.borrow(), ["P.unlinked", "C.unlinked"]);
        assert!(tree.get_relation_nodes(p, "c").unwrap().is_empty());
    }

    #[test]
    fn test_move_under_same_parent() {
        let log: Log = Default::default();
        let (p_def, c_def) = parent_child(&log);
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        tree.pretend_attached(root).unwrap();
        let p = tree.create_component(root, "p", p_def).unwrap();
        let block = tree.create_virtual_node(root, "block").unwrap();
        let c = tree.create_component(root, "c", c_def).unwrap();
        tree.append_child(root, p).unwrap();
        tree.append_child(p, block).unwrap();
        tree.append_child(p, c).unwrap();
        log.borrow_mut().clear();

        // virtual wrappers are skipped when looking for the parent
        tree.append_child(block, c).unwrap();
        assert_eq!(*log.borrow(), ["P.changed", "C.changed"]);
    }

    #[test]
    fn test_remove_and_readd() {
        let log: Log = Default::default();
        let (p_def, c_def) = parent_child(&log);
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        tree.pretend_attached(root).unwrap();
        let p = tree.create_component(root, "p", p_def).unwrap();
        let c = tree.create_component(root, "c", c_def).unwrap();
        tree.append_child(root, p).unwrap();
        tree.append_child(p, c).unwrap();
        log.borrow_mut().clear();

        tree.remove_child(p, c).unwrap();
        tree.append_child(p, c).unwrap();
        assert_eq!(*log.borrow(), ["P.unlinked", "C.unlinked", "P.linked", "C.linked"]);
    }

    #[test]
    fn test_ancestor_by_behavior() {
        let log: Log = Default::default();
        let form = ComponentDefinition::new("my-form")
            .behavior("form")
            .relation(
                RelationDefinition::new("fields", RelationType::Descendant, RelationTarget::Behavior("field".into()))
                    .linked(record(&log, "form.linked")),
            )
            .unwrap()
            .build();
        let input = ComponentDefinition::new("my-input")
            .behavior("field")
            .relation(
                RelationDefinition::new("form", RelationType::Ancestor, RelationTarget::Behavior("form".into()))
                    .linked(record(&log, "input.linked")),
            )
            .unwrap()
            .build();

        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let f = tree.create_component(root, "my-form", form).unwrap();
        let div = tree.create_native_node(root, "div").unwrap();
        let first = tree.create_component(root, "my-input", input.clone()).unwrap();
        let second = tree.create_component(root, "my-input", input).unwrap();
        tree.append_child(root, f).unwrap();
        tree.append_child(f, div).unwrap();
        tree.append_child(div, second).unwrap();
        tree.insert_before(div, first, second).unwrap();
        tree.pretend_attached(root).unwrap();

        assert_eq!(
            *log.borrow(),
            ["form.linked", "input.linked", "form.linked", "input.linked"]
        );
        assert_eq!(tree.get_relation_nodes(f, "fields").unwrap(), vec![first, second]);
    }

    #[test]
    fn test_link_failed_reports_warning() {
        let failed: Rc<RefCell<Vec<NodeId>>> = Default::default();
        let warnings: Rc<RefCell<Vec<String>>> = Default::default();
        let f = failed.clone();
        let orphan = ComponentDefinition::new("orphan")
            .relation(
                RelationDefinition::new("p", RelationType::Parent, RelationTarget::Component("p".into()))
                    .link_failed(move |_, node| {
                        f.borrow_mut().push(node);
                        Ok(())
                    }),
            )
            .unwrap()
            .build();

        let mut tree = Tree::new();
        let w = warnings.clone();
        tree.context().add_warning_listener(move |message| {
            w.borrow_mut().push(message.to_string());
            true
        });
        let root = tree.create_root().unwrap();
        let node = tree.create_component(root, "orphan", orphan).unwrap();
        tree.append_child(root, node).unwrap();
        tree.pretend_attached(root).unwrap();

        assert_eq!(*failed.borrow(), vec![node]);
        assert_eq!(warnings.borrow().len(), 1);
        assert!(warnings.borrow()[0].contains("orphan"));

        // resolving again does not report another failure
        tree.resolve_relations(root).unwrap();
        assert_eq!(failed.borrow().len(), 1);
    }
}
