//! Tree arena
//!
//! Owns every node, the optional backend context and the side indices
//! (backend handles, observers, relation edges).

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use shade_backend::{BackendContext, ElementHandle, RawEvent};

use crate::context::GlobalContext;
use crate::definition::{ComponentDefinition, Lifetime};
use crate::error::{TreeError, TreeResult};
use crate::node::{ComponentData, ElementData, Node, NodeData, NodeType};
use crate::observer::ObserverRegistry;
use crate::relation::RelationIndex;
use crate::NodeId;

struct Entry {
    generation: u32,
    node: Option<Node>,
}

/// Component tree
pub struct Tree {
    entries: Vec<Entry>,
    free_list: Vec<u32>,
    pub(crate) backend: Option<Box<dyn BackendContext>>,
    pub(crate) backend_index: HashMap<ElementHandle, NodeId>,
    /// Events pushed by the backend sink, drained by `pump_backend_events`
    pub(crate) inbox: Rc<RefCell<VecDeque<RawEvent>>>,
    pub(crate) context: Rc<GlobalContext>,
    pub(crate) observers: ObserverRegistry,
    pub(crate) relations: RelationIndex,
    next_listener: u32,
}

impl Tree {
    /// Tree without a backend
    pub fn new() -> Self {
        Self::with_context(Rc::new(GlobalContext::new()))
    }

    pub fn with_context(context: Rc<GlobalContext>) -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            backend: None,
            backend_index: HashMap::new(),
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            context,
            observers: ObserverRegistry::default(),
            relations: RelationIndex::default(),
            next_listener: 1,
        }
    }

    /// Tree mirroring its nodes into `backend`
    pub fn with_backend(backend: Box<dyn BackendContext>) -> Self {
        Self::with_backend_and_context(backend, Rc::new(GlobalContext::new()))
    }

    pub fn with_backend_and_context(
        mut backend: Box<dyn BackendContext>,
        context: Rc<GlobalContext>,
    ) -> Self {
        let mut tree = Self::with_context(context);
        let inbox = tree.inbox.clone();
        backend.on_event(Box::new(move |event| inbox.borrow_mut().push_back(event)));
        tracing::debug!("Tree created with {:?} backend", backend.mode());
        tree.backend = Some(backend);
        tree
    }

    pub fn context(&self) -> &Rc<GlobalContext> {
        &self.context
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.entries.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    // --- Arena ---

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.entries
            .get(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.node.as_mut())
    }

    pub(crate) fn node(&self, id: NodeId) -> TreeResult<&Node> {
        self.get(id).ok_or(TreeError::DoubleRelease(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
        self.get_mut(id).ok_or(TreeError::DoubleRelease(id))
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free_list.pop() {
            if let Some(entry) = self.entries.get_mut(index as usize) {
                entry.generation += 1;
                entry.node = Some(node);
                return NodeId {
                    index,
                    generation: entry.generation,
                };
            }
        }
        self.entries.push(Entry {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index: self.entries.len() as u32 - 1,
            generation: 0,
        }
    }

    fn free(&mut self, id: NodeId) {
        if let Some(entry) = self.entries.get_mut(id.index as usize) {
            if entry.generation == id.generation && entry.node.take().is_some() {
                self.free_list.push(id.index);
            }
        }
    }

    pub(crate) fn next_listener_id(&mut self) -> u32 {
        let id = self.next_listener;
        self.next_listener += 1;
        id
    }

    // --- Kind checks ---

    pub(crate) fn wrong_kind(&self, node: NodeId, expected: &'static str) -> TreeError {
        match self.get(node) {
            Some(n) => TreeError::WrongNodeKind {
                node,
                expected,
                actual: n.node_type(),
            },
            None => TreeError::DoubleRelease(node),
        }
    }

    pub(crate) fn expect_shadow_root(&self, id: NodeId) -> TreeResult<()> {
        match self.node(id)?.data {
            NodeData::ShadowRoot { .. } => Ok(()),
            _ => Err(self.wrong_kind(id, "shadow root")),
        }
    }

    pub(crate) fn component_data(&self, id: NodeId) -> TreeResult<&ComponentData> {
        self.node(id)?
            .data
            .component()
            .ok_or_else(|| self.wrong_kind(id, "component"))
    }

    pub(crate) fn component_data_mut(&mut self, id: NodeId) -> TreeResult<&mut ComponentData> {
        let err = self.wrong_kind(id, "component");
        match &mut self.node_mut(id)?.data {
            NodeData::Component(data) => Ok(&mut **data),
            _ => Err(err),
        }
    }

    pub(crate) fn element_data(&self, id: NodeId) -> TreeResult<&ElementData> {
        self.node(id)?
            .data
            .element()
            .ok_or_else(|| self.wrong_kind(id, "element"))
    }

    pub(crate) fn element_data_mut(&mut self, id: NodeId) -> TreeResult<&mut ElementData> {
        let err = self.wrong_kind(id, "element");
        self.node_mut(id)?.data.element_mut().ok_or(err)
    }

    /// Shadow tree a node belongs to (a shadow root belongs to itself)
    pub(crate) fn scope_of(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id)?;
        match node.data {
            NodeData::ShadowRoot { .. } => Some(id),
            _ => node.owner,
        }
    }

    /// Host of a shadow root, `None` for the document root or other kinds
    pub(crate) fn host_of(&self, shadow_root: NodeId) -> Option<NodeId> {
        match self.get(shadow_root)?.data {
            NodeData::ShadowRoot { host, .. } => host,
            _ => None,
        }
    }

    // --- Factories ---

    fn create_node(&mut self, owner: Option<NodeId>, data: NodeData) -> TreeResult<NodeId> {
        if let Some(owner) = owner {
            self.expect_shadow_root(owner)?;
        }
        let destroy_on_detach = self.context.options().destroy_backend_element_on_detach;
        let id = self.alloc(Node::new(owner, data, destroy_on_detach));
        self.create_backend_element(id)?;
        Ok(id)
    }

    /// Create a document root shadow root
    pub fn create_root(&mut self) -> TreeResult<NodeId> {
        let id = self.create_node(
            None,
            NodeData::ShadowRoot {
                element: ElementData::default(),
                host: None,
                slots: Vec::new(),
            },
        )?;
        tracing::debug!("Created root {:?}", id);
        Ok(id)
    }

    pub fn create_native_node(&mut self, owner: NodeId, tag: &str) -> TreeResult<NodeId> {
        self.create_native_node_styled(owner, tag, tag)
    }

    /// Native node whose styling tag differs from its logical tag
    pub fn create_native_node_styled(
        &mut self,
        owner: NodeId,
        tag: &str,
        styling_tag: &str,
    ) -> TreeResult<NodeId> {
        self.create_node(
            Some(owner),
            NodeData::Native {
                element: ElementData::default(),
                tag: tag.to_string(),
                styling_tag: styling_tag.to_string(),
            },
        )
    }

    pub fn create_virtual_node(&mut self, owner: NodeId, name: &str) -> TreeResult<NodeId> {
        self.create_node(
            Some(owner),
            NodeData::Virtual {
                element: ElementData::default(),
                name: name.to_string(),
            },
        )
    }

    /// Virtual `slot` node named `name` (empty for the default slot)
    pub fn create_slot(&mut self, owner: NodeId, name: &str) -> TreeResult<NodeId> {
        let element = ElementData {
            slot_name: Some(name.to_string()),
            ..Default::default()
        };
        self.create_node(
            Some(owner),
            NodeData::Virtual {
                element,
                name: "slot".to_string(),
            },
        )
    }

    pub fn create_text_node(&mut self, owner: NodeId, text: &str) -> TreeResult<NodeId> {
        self.create_node(
            Some(owner),
            NodeData::Text {
                content: text.to_string(),
            },
        )
    }

    /// Component together with its shadow root; fires the `created` lifetime
    pub fn create_component(
        &mut self,
        owner: NodeId,
        tag: &str,
        definition: Rc<ComponentDefinition>,
    ) -> TreeResult<NodeId> {
        self.expect_shadow_root(owner)?;
        let destroy_on_detach = self.context.options().destroy_backend_element_on_detach;
        let shadow_root = self.alloc(Node::new(
            None,
            NodeData::ShadowRoot {
                element: ElementData::default(),
                host: None,
                slots: Vec::new(),
            },
            destroy_on_detach,
        ));
        let data = ComponentData {
            element: ElementData::default(),
            tag: tag.to_string(),
            definition,
            shadow_root,
            properties: Default::default(),
            manual_slots: HashMap::new(),
        };
        let id = self.alloc(Node::new(
            Some(owner),
            NodeData::Component(Box::new(data)),
            destroy_on_detach,
        ));
        if let NodeData::ShadowRoot { host, .. } = &mut self.node_mut(shadow_root)?.data {
            *host = Some(id);
        }
        self.create_backend_element(id)?;
        self.create_backend_element(shadow_root)?;
        tracing::trace!("Created component <{}> {:?}", tag, id);
        self.call_lifetime(id, Lifetime::Created)?;
        Ok(id)
    }

    /// Parentless container for batch splices
    pub fn create_fragment(&mut self) -> TreeResult<NodeId> {
        self.create_node(None, NodeData::Fragment)
    }

    // --- Queries ---

    pub fn node_type(&self, id: NodeId) -> TreeResult<NodeType> {
        Ok(self.node(id)?.node_type())
    }

    /// Shadow parent
    pub fn parent(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    /// Shadow children
    pub fn children(&self, id: NodeId) -> TreeResult<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    pub fn is_virtual(&self, id: NodeId) -> TreeResult<bool> {
        Ok(self.node(id)?.is_virtual())
    }

    pub fn is_attached(&self, id: NodeId) -> TreeResult<bool> {
        Ok(self.node(id)?.attached)
    }

    /// Shadow root of a component
    pub fn shadow_root(&self, component: NodeId) -> TreeResult<NodeId> {
        Ok(self.component_data(component)?.shadow_root)
    }

    /// Host component of a shadow root (`None` for a document root)
    pub fn host(&self, shadow_root: NodeId) -> TreeResult<Option<NodeId>> {
        match self.node(shadow_root)?.data {
            NodeData::ShadowRoot { host, .. } => Ok(host),
            _ => Err(self.wrong_kind(shadow_root, "shadow root")),
        }
    }

    pub fn is_root(&self, id: NodeId) -> TreeResult<bool> {
        Ok(self.host(id)?.is_none())
    }

    /// Shadow root of the shadow tree containing `id`
    pub fn owner_shadow_root(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
        Ok(self.node(id)?.owner)
    }

    pub fn definition(&self, component: NodeId) -> TreeResult<Rc<ComponentDefinition>> {
        Ok(self.component_data(component)?.definition.clone())
    }

    /// Tag of native nodes and components, name of virtual nodes
    pub fn tag_name(&self, id: NodeId) -> TreeResult<&str> {
        match &self.node(id)?.data {
            NodeData::Native { tag, .. } => Ok(tag),
            NodeData::Virtual { name, .. } => Ok(name),
            NodeData::Component(data) => Ok(&data.tag),
            _ => Err(self.wrong_kind(id, "tagged element")),
        }
    }

    /// Styling tag of a native node
    pub fn styling_tag(&self, id: NodeId) -> TreeResult<&str> {
        match &self.node(id)?.data {
            NodeData::Native { styling_tag, .. } => Ok(styling_tag),
            _ => Err(self.wrong_kind(id, "native node")),
        }
    }

    /// Slot the node is currently projected through
    pub fn containing_slot(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
        Ok(self.node(id)?.containing_slot)
    }

    /// First node with the given id in a shadow tree, in tree order
    pub fn get_element_by_id(&self, shadow_root: NodeId, id: &str) -> TreeResult<Option<NodeId>> {
        self.expect_shadow_root(shadow_root)?;
        let mut stack: Vec<NodeId> = self.node(shadow_root)?.children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            if node.data.element().is_some_and(|e| e.id == id) {
                return Ok(Some(current));
            }
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(None)
    }

    /// Node and all shadow descendants, entering component shadow roots
    pub(crate) fn shadow_subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
            if let Some(data) = node.data.component() {
                stack.push(data.shadow_root);
            }
        }
        out
    }

    // --- Release ---

    /// Free a parentless, detached node with its whole subtree
    pub fn release(&mut self, id: NodeId) -> TreeResult<()> {
        let node = self.node(id)?;
        if node.parent.is_some() || node.attached {
            return Err(TreeError::StillInTree(id));
        }
        if let NodeData::ShadowRoot { host: Some(_), .. } = node.data {
            return Err(TreeError::StillInTree(id));
        }
        let subtree = self.shadow_subtree(id);
        for &n in &subtree {
            self.release_backend_element(n)?;
        }
        for &n in &subtree {
            self.observers.remove_target(n);
            self.relations.remove_node(n);
            self.free(n);
        }
        tracing::debug!("Released {:?} ({} nodes)", id, subtree.len());
        Ok(())
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.len())
            .field("backend", &self.backend.as_ref().map(|b| b.mode()))
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_ids_are_rejected() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let div = tree.create_native_node(root, "div").unwrap();
        tree.release(div).unwrap();

        assert!(matches!(tree.release(div), Err(TreeError::DoubleRelease(id)) if id == div));
        assert!(matches!(tree.node_type(div), Err(TreeError::DoubleRelease(_))));

        // The slot is reused with a new generation
        let span = tree.create_native_node(root, "span").unwrap();
        assert_eq!(span.index(), div.index());
        assert_ne!(span.generation(), div.generation());
        assert!(!tree.contains(div));
        assert!(tree.contains(span));
    }

    #[test]
    fn test_owner_must_be_shadow_root() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let div = tree.create_native_node(root, "div").unwrap();
        let err = tree.create_native_node(div, "span").unwrap_err();
        assert!(matches!(
            err,
            TreeError::WrongNodeKind {
                actual: NodeType::NativeNode,
                ..
            }
        ));
    }

    #[test]
    fn test_component_owns_shadow_root() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let def = ComponentDefinition::new("comp").build();
        let comp = tree.create_component(root, "comp", def).unwrap();
        let sr = tree.shadow_root(comp).unwrap();

        assert_eq!(tree.host(sr).unwrap(), Some(comp));
        assert!(tree.is_root(root).unwrap());
        assert!(!tree.is_root(sr).unwrap());
        assert_eq!(tree.tag_name(comp).unwrap(), "comp");
        assert!(matches!(tree.release(sr), Err(TreeError::StillInTree(_))));

        let before = tree.len();
        tree.release(comp).unwrap();
        assert_eq!(tree.len(), before - 2);
        assert!(!tree.contains(sr));
    }

    #[test]
    fn test_release_requires_detached_node() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let div = tree.create_native_node(root, "div").unwrap();
        tree.append_child(root, div).unwrap();
        assert!(matches!(tree.release(div), Err(TreeError::StillInTree(_))));
        tree.remove_child(root, div).unwrap();
        tree.release(div).unwrap();
    }

    #[test]
    fn test_get_element_by_id() {
        let mut tree = Tree::new();
        let root = tree.create_root().unwrap();
        let div = tree.create_native_node(root, "div").unwrap();
        let span = tree.create_native_node(root, "span").unwrap();
        tree.set_id(span, "b").unwrap();
        tree.append_child(root, div).unwrap();
        assert_eq!(tree.get_element_by_id(root, "b").unwrap(), None);
        tree.append_child(div, span).unwrap();
        assert_eq!(tree.get_element_by_id(root, "b").unwrap(), Some(span));
    }
}
