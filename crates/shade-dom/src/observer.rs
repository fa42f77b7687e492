//! Mutation observers
//!
//! Observers are stored per target node. A change is delivered once to
//! every observer on the changed node and to subtree observers on its
//! composed ancestors (nodes outside the composed tree fall back to their
//! shadow parent, shadow roots to their host).

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::composed::ComposedView;
use crate::context::{ErrorKind, ErrorOrigin};
use crate::error::{TreeError, TreeResult};
use crate::tree::Tree;
use crate::NodeId;

/// What an observer watches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationObserverOptions {
    pub properties: bool,
    pub child_list: bool,
    pub character_data: bool,
    pub attach_status: bool,
    /// Also watch the composed subtree of the target
    pub subtree: bool,
}

impl MutationObserverOptions {
    fn watches(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::Properties => self.properties,
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
            MutationKind::AttachStatus => self.attach_status,
        }
    }

    fn is_empty(&self) -> bool {
        !(self.properties || self.child_list || self.character_data || self.attach_status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    Properties,
    ChildList,
    CharacterData,
    AttachStatus,
}

/// Which kind of name a property record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameType {
    /// `id`, `slot`, `name`, ...
    Basic,
    Attribute,
    ComponentProperty,
    Dataset,
    Mark,
    Style,
    Class,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachStatus {
    Attached,
    Detached,
}

/// One observed change
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    pub name_type: Option<NameType>,
    pub attribute_name: Option<String>,
    pub property_name: Option<String>,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub status: Option<AttachStatus>,
}

impl MutationRecord {
    fn new(kind: MutationKind, target: NodeId) -> Self {
        Self {
            kind,
            target,
            name_type: None,
            attribute_name: None,
            property_name: None,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            status: None,
        }
    }

    pub(crate) fn property(target: NodeId, name_type: NameType, name: &str) -> Self {
        let mut record = Self::new(MutationKind::Properties, target);
        record.name_type = Some(name_type);
        if name_type == NameType::ComponentProperty {
            record.property_name = Some(name.to_string());
        } else {
            record.attribute_name = Some(name.to_string());
        }
        record
    }

    pub(crate) fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        let mut record = Self::new(MutationKind::ChildList, target);
        record.added_nodes = added;
        record.removed_nodes = removed;
        record
    }

    pub(crate) fn character_data(target: NodeId) -> Self {
        Self::new(MutationKind::CharacterData, target)
    }

    pub(crate) fn attach_status(target: NodeId, status: AttachStatus) -> Self {
        let mut record = Self::new(MutationKind::AttachStatus, target);
        record.status = Some(status);
        record
    }
}

/// Mutation observer id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

pub type ObserverCallback = Rc<dyn Fn(&mut Tree, &MutationRecord) -> anyhow::Result<()>>;

struct ObserverEntry {
    id: ObserverId,
    options: MutationObserverOptions,
    callback: ObserverCallback,
}

/// Observers indexed by target node
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    by_target: HashMap<NodeId, Vec<ObserverEntry>>,
    next_id: u32,
}

impl ObserverRegistry {
    pub(crate) fn remove_target(&mut self, target: NodeId) {
        self.by_target.remove(&target);
    }

    fn is_registered(&self, target: NodeId, id: ObserverId) -> bool {
        self.by_target
            .get(&target)
            .is_some_and(|list| list.iter().any(|e| e.id == id))
    }

    fn matching(&self, target: NodeId, kind: MutationKind, at_target: bool) -> Vec<(ObserverId, ObserverCallback)> {
        self.by_target
            .get(&target)
            .map(|list| {
                list.iter()
                    .filter(|e| e.options.watches(kind) && (at_target || e.options.subtree))
                    .map(|e| (e.id, e.callback.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("targets", &self.by_target.len())
            .finish()
    }
}

impl Tree {
    /// Observe changes on `target`
    pub fn observe(
        &mut self,
        target: NodeId,
        options: MutationObserverOptions,
        callback: impl Fn(&mut Tree, &MutationRecord) -> anyhow::Result<()> + 'static,
    ) -> TreeResult<ObserverId> {
        self.node(target)?;
        if options.is_empty() {
            return Err(TreeError::EmptyObserverOptions);
        }
        self.observers.next_id += 1;
        let id = ObserverId(self.observers.next_id);
        self.observers
            .by_target
            .entry(target)
            .or_default()
            .push(ObserverEntry {
                id,
                options,
                callback: Rc::new(callback),
            });
        Ok(id)
    }

    /// Stop an observer; records not yet delivered are dropped
    pub fn disconnect_observer(&mut self, id: ObserverId) -> bool {
        let mut found = false;
        self.observers.by_target.retain(|_, list| {
            let before = list.len();
            list.retain(|e| e.id != id);
            found |= list.len() != before;
            !list.is_empty()
        });
        found
    }

    fn observer_parent(&self, id: NodeId) -> Option<NodeId> {
        self.composed_parent_in(id, ComposedView::WithVirtual)
            .or_else(|| self.propagation_parent(id))
    }

    /// Deliver a record to the observers of its target and ancestors
    pub(crate) fn notify(&mut self, record: MutationRecord) -> TreeResult<()> {
        if self.observers.by_target.is_empty() {
            return Ok(());
        }
        let mut deliveries = Vec::new();
        let mut current = Some(record.target);
        while let Some(node) = current {
            for (id, callback) in self.observers.matching(node, record.kind, node == record.target) {
                deliveries.push((node, id, callback));
            }
            current = self.observer_parent(node);
        }

        for (node, id, callback) in deliveries {
            if !self.observers.is_registered(node, id) {
                continue;
            }
            if let Err(error) = callback(self, &record) {
                let origin = ErrorOrigin::new(ErrorKind::Observer, Some(node), format!("{:?}", record.kind));
                self.context.dispatch_error(error, origin)?;
            }
        }
        Ok(())
    }
}
