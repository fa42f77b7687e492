//! Node storage
//!
//! A node is a shared header (tree links, attachment, backend association,
//! listeners) plus a closed payload enum.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde_json::Value;
use shade_backend::ElementHandle;

use crate::definition::{ComponentDefinition, Lifetime};
use crate::event::{ListenerEntry, ListenerId};
use crate::lifecycle::LifetimeListenerEntry;
use crate::NodeId;

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    NativeNode,
    VirtualNode,
    Component,
    ShadowRoot,
    TextNode,
    Fragment,
}

impl NodeType {
    /// Kinds carrying element data (id, slot, classes, ...)
    pub fn is_element(self) -> bool {
        !matches!(self, Self::TextNode | Self::Fragment)
    }
}

/// Backend association of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum BackendSlot {
    /// No element in this backend mode, or no backend at all
    #[default]
    Absent,
    Live(ElementHandle),
    /// Released on detach, recreated on demand
    Destroyed,
}

/// Element properties shared by every element kind
#[derive(Debug, Clone, Default)]
pub(crate) struct ElementData {
    pub(crate) id: String,
    /// Name of the slot this node wants to be projected into
    pub(crate) slot: String,
    /// Set when this node is itself a slot
    pub(crate) slot_name: Option<String>,
    pub(crate) inherit_slots: bool,
    pub(crate) classes: Vec<String>,
    pub(crate) style: String,
    pub(crate) attributes: BTreeMap<String, String>,
    pub(crate) dataset: BTreeMap<String, Value>,
    pub(crate) marks: BTreeMap<String, Value>,
}

pub(crate) struct ComponentData {
    pub(crate) element: ElementData,
    pub(crate) tag: String,
    pub(crate) definition: Rc<ComponentDefinition>,
    pub(crate) shadow_root: NodeId,
    pub(crate) properties: BTreeMap<String, Value>,
    /// Dynamic slot mode overrides: content node -> slot
    pub(crate) manual_slots: HashMap<NodeId, NodeId>,
}

pub(crate) enum NodeData {
    Native {
        element: ElementData,
        tag: String,
        styling_tag: String,
    },
    Virtual {
        element: ElementData,
        name: String,
    },
    Component(Box<ComponentData>),
    ShadowRoot {
        element: ElementData,
        /// `None` for the document root
        host: Option<NodeId>,
        /// Slots of this shadow tree in tree order
        slots: Vec<NodeId>,
    },
    Text {
        content: String,
    },
    Fragment,
}

impl NodeData {
    pub(crate) fn node_type(&self) -> NodeType {
        match self {
            Self::Native { .. } => NodeType::NativeNode,
            Self::Virtual { .. } => NodeType::VirtualNode,
            Self::Component(_) => NodeType::Component,
            Self::ShadowRoot { .. } => NodeType::ShadowRoot,
            Self::Text { .. } => NodeType::TextNode,
            Self::Fragment => NodeType::Fragment,
        }
    }

    pub(crate) fn element(&self) -> Option<&ElementData> {
        match self {
            Self::Native { element, .. }
            | Self::Virtual { element, .. }
            | Self::ShadowRoot { element, .. } => Some(element),
            Self::Component(data) => Some(&data.element),
            Self::Text { .. } | Self::Fragment => None,
        }
    }

    pub(crate) fn element_mut(&mut self) -> Option<&mut ElementData> {
        match self {
            Self::Native { element, .. }
            | Self::Virtual { element, .. }
            | Self::ShadowRoot { element, .. } => Some(element),
            Self::Component(data) => Some(&mut data.element),
            Self::Text { .. } | Self::Fragment => None,
        }
    }

    pub(crate) fn component(&self) -> Option<&ComponentData> {
        match self {
            Self::Component(data) => Some(&**data),
            _ => None,
        }
    }
}

pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Shadow root whose factory created this node
    pub(crate) owner: Option<NodeId>,
    pub(crate) attached: bool,
    /// Slot this node is currently projected through
    pub(crate) containing_slot: Option<NodeId>,
    pub(crate) backend: BackendSlot,
    /// Container whose backend child list holds this node's element
    pub(crate) backend_parent: Option<NodeId>,
    /// Nodes whose elements are the backend children of this node's element
    pub(crate) mirror: Vec<NodeId>,
    pub(crate) destroy_backend_on_detach: bool,
    pub(crate) listeners: Vec<ListenerEntry>,
    pub(crate) lifetime_listeners: Vec<LifetimeListenerEntry>,
    pub(crate) executing_lifetime: Option<Lifetime>,
    pub(crate) data: NodeData,
}

impl Node {
    pub(crate) fn new(owner: Option<NodeId>, data: NodeData, destroy_on_detach: bool) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            owner,
            attached: false,
            containing_slot: None,
            backend: BackendSlot::Absent,
            backend_parent: None,
            mirror: Vec::new(),
            destroy_backend_on_detach: destroy_on_detach,
            listeners: Vec::new(),
            lifetime_listeners: Vec::new(),
            executing_lifetime: None,
            data,
        }
    }

    pub(crate) fn node_type(&self) -> NodeType {
        self.data.node_type()
    }

    pub(crate) fn live_element(&self) -> Option<ElementHandle> {
        match self.backend {
            BackendSlot::Live(handle) => Some(handle),
            _ => None,
        }
    }

    /// Virtual nodes and virtual-host components
    pub(crate) fn is_virtual(&self) -> bool {
        match &self.data {
            NodeData::Virtual { .. } => true,
            NodeData::Component(data) => data.definition.component_options().virtual_host,
            _ => false,
        }
    }

    pub(crate) fn inherits_slots(&self) -> bool {
        self.data.element().is_some_and(|e| e.inherit_slots)
    }

    pub(crate) fn slot_name(&self) -> Option<&str> {
        self.data.element()?.slot_name.as_deref()
    }

    /// Name of the slot this node targets (text nodes target the default slot)
    pub(crate) fn target_slot(&self) -> &str {
        self.data.element().map_or("", |e| e.slot.as_str())
    }

    pub(crate) fn has_listener(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|l| l.id == id)
    }

    pub(crate) fn listeners_for(&self, name: &str, capture: bool) -> Vec<ListenerEntry> {
        self.listeners
            .iter()
            .filter(|l| l.name == name && l.options.capture == capture)
            .cloned()
            .collect()
    }
}

