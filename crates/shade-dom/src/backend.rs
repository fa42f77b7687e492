//! Backend association
//!
//! Nodes get a backend element according to the backend mode. Backend
//! child lists mirror the shadow tree (shadow mode) or the composed tree
//! (DOM-like mode elides virtual nodes, composed mode keeps them). After a
//! mutation the affected containers are collected in a [`DirtySet`] and
//! re-synchronised by diffing their previous mirror against the desired
//! child list.

use shade_backend::{
    BackendContext, BackendMode, BoundingClientRect, ComponentInit, ContextHandle, ElementHandle,
    IntersectionInit, IntersectionStatus, MediaQueryStatus, ObserverHandle, ScrollOffset,
    StyleScope, StyleSheetId,
};

use crate::composed::ComposedView;
use crate::error::{TreeError, TreeResult};
use crate::node::{BackendSlot, NodeData};
use crate::tree::Tree;
use crate::NodeId;

type DynBackend = dyn BackendContext;

/// Containers whose backend child list must be re-synchronised
#[derive(Debug, Default)]
pub(crate) struct DirtySet {
    containers: Vec<NodeId>,
}

impl DirtySet {
    pub(crate) fn add(&mut self, id: NodeId) {
        if !self.containers.contains(&id) {
            self.containers.push(id);
        }
    }
}

impl Tree {
    pub fn backend_mode(&self) -> Option<BackendMode> {
        self.backend.as_ref().map(|b| b.mode())
    }

    pub fn backend_context(&self) -> Option<&DynBackend> {
        self.backend.as_deref()
    }

    pub fn backend_context_mut(&mut self) -> Option<&mut DynBackend> {
        self.backend.as_deref_mut()
    }

    /// Run `f` with the backend taken out of the tree
    fn with_backend_taken<R>(
        &mut self,
        f: impl FnOnce(&mut Tree, &mut DynBackend) -> TreeResult<R>,
    ) -> TreeResult<Option<R>> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(None);
        };
        let result = f(self, backend.as_mut());
        self.backend = Some(backend);
        result.map(Some)
    }

    fn composed_view(mode: BackendMode) -> ComposedView {
        match mode {
            BackendMode::Composed => ComposedView::WithVirtual,
            _ => ComposedView::NonVirtual,
        }
    }

    /// Whether the node kind is represented by an element in the current mode
    pub(crate) fn has_element_kind(&self, id: NodeId) -> bool {
        let (Some(mode), Some(node)) = (self.backend_mode(), self.get(id)) else {
            return false;
        };
        match (&node.data, mode) {
            (NodeData::Fragment, _) => false,
            (NodeData::ShadowRoot { .. }, BackendMode::Shadow) => true,
            (NodeData::ShadowRoot { host, .. }, _) => host.is_none(),
            (NodeData::Virtual { .. }, BackendMode::Domlike) => false,
            (NodeData::Component(_), BackendMode::Domlike) => !node.is_virtual(),
            _ => true,
        }
    }

    fn build_element(&self, backend: &mut DynBackend, id: NodeId) -> TreeResult<Option<ElementHandle>> {
        let node = self.node(id)?;
        let mode = backend.mode();
        let handle = match &node.data {
            NodeData::Native {
                tag, styling_tag, ..
            } => backend.create_element(tag, styling_tag)?,
            NodeData::Text { content } => backend.create_text_node(content)?,
            NodeData::Virtual { name, .. } => backend.create_virtual_node(name)?,
            NodeData::Component(data) if mode == BackendMode::Domlike => {
                backend.create_element(&data.tag, &data.tag)?
            }
            NodeData::Component(data) => {
                let options = data.definition.component_options();
                // Scope of the component whose shadow tree holds this one
                let owner_scope = node
                    .owner
                    .and_then(|owner| self.host_of(owner))
                    .and_then(|host| self.get(host))
                    .and_then(|host| host.data.component())
                    .and_then(|host| host.definition.component_options().style_scope.as_deref());
                let style_scope = options
                    .style_scope
                    .as_deref()
                    .map(|name| backend.resolve_style_scope(name));
                let extra_style_scope = owner_scope.map(|name| backend.resolve_style_scope(name));
                backend.create_component(&ComponentInit {
                    tag_name: data.tag.clone(),
                    external: false,
                    virtual_host: options.virtual_host,
                    style_scope,
                    extra_style_scope,
                    external_classes: options.external_classes.clone(),
                })?
            }
            NodeData::ShadowRoot {
                host: Some(host), ..
            } => {
                let Some(host_element) = self.node(*host)?.live_element() else {
                    return Ok(None);
                };
                backend.create_shadow_root(host_element)?
            }
            NodeData::ShadowRoot { host: None, .. } => backend.create_element("root", "root")?,
            NodeData::Fragment => return Ok(None),
        };

        if let Some(element) = node.data.element() {
            if !element.id.is_empty() {
                backend.set_id(handle, &element.id)?;
            }
            for class in &element.classes {
                backend.add_class(handle, class)?;
            }
            if !element.style.is_empty() {
                backend.set_style(handle, &element.style)?;
            }
            for (name, value) in &element.attributes {
                backend.set_attribute(handle, name, value)?;
            }
            if mode == BackendMode::Shadow {
                if let Some(slot_name) = &element.slot_name {
                    backend.set_slot_name(handle, slot_name)?;
                }
            }
        }
        if mode == BackendMode::Shadow {
            let slot_element = node
                .containing_slot
                .and_then(|s| self.get(s))
                .and_then(|s| s.live_element());
            if slot_element.is_some() {
                backend.set_containing_slot(handle, slot_element)?;
            }
        }
        Ok(Some(handle))
    }

    pub(crate) fn create_backend_element(&mut self, id: NodeId) -> TreeResult<()> {
        if !self.has_element_kind(id) {
            return Ok(());
        }
        let handle = self
            .with_backend_taken(|tree, backend| tree.build_element(backend, id))?
            .flatten();
        if let Some(handle) = handle {
            self.node_mut(id)?.backend = BackendSlot::Live(handle);
            self.backend_index.insert(handle, id);
        }
        Ok(())
    }

    /// Release the element of `id`, leaving the slot in state `next`
    fn drop_element(&mut self, id: NodeId, next: BackendSlot) -> TreeResult<()> {
        let node = self.node(id)?;
        let Some(handle) = node.live_element() else {
            return Ok(());
        };
        let backend_parent = node.backend_parent;
        let mirror = node.mirror.clone();

        if let Some(parent) = backend_parent.and_then(|p| self.get_mut(p)) {
            parent.mirror.retain(|&c| c != id);
        }
        for child in mirror {
            if let Some(child) = self.get_mut(child) {
                child.backend_parent = None;
            }
        }
        self.with_backend_taken(|_, backend| Ok(backend.release(handle)?))?;
        self.backend_index.remove(&handle);
        let node = self.node_mut(id)?;
        node.backend = next;
        node.backend_parent = None;
        node.mirror.clear();
        Ok(())
    }

    /// Release for good (node disposal)
    pub(crate) fn release_backend_element(&mut self, id: NodeId) -> TreeResult<()> {
        self.drop_element(id, BackendSlot::Absent)
    }

    /// Release on detach; the element is recreated when needed again
    pub(crate) fn destroy_backend_element(&mut self, id: NodeId) -> TreeResult<()> {
        if self.node(id)?.live_element().is_none() {
            return Ok(());
        }
        self.drop_element(id, BackendSlot::Destroyed)?;
        if self.backend_mode() == Some(BackendMode::Shadow) {
            if let Some(data) = self.node(id)?.data.component() {
                let shadow_root = data.shadow_root;
                self.drop_element(shadow_root, BackendSlot::Destroyed)?;
            }
        }
        tracing::trace!("Destroyed backend element of {:?}", id);
        Ok(())
    }

    /// Recreate a destroyed element, marking its container and its own
    /// child list dirty
    pub(crate) fn recreate_backend_element(&mut self, id: NodeId, dirty: &mut DirtySet) -> TreeResult<()> {
        if self.node(id)?.backend != BackendSlot::Destroyed {
            return Ok(());
        }
        self.node_mut(id)?.backend = BackendSlot::Absent;
        self.create_backend_element(id)?;
        dirty.add(id);
        self.mark_new_position(id, dirty);

        if self.backend_mode() == Some(BackendMode::Shadow) {
            if let Some(data) = self.node(id)?.data.component() {
                let shadow_root = data.shadow_root;
                self.recreate_backend_element(shadow_root, dirty)?;
            }
        }
        Ok(())
    }

    /// Nearest nodes carrying elements at or below `id`
    fn frontier(&self, id: NodeId) -> Vec<NodeId> {
        if self.has_element_kind(id) {
            return vec![id];
        }
        let Some(mode) = self.backend_mode() else {
            return Vec::new();
        };
        if mode == BackendMode::Shadow {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.walk_composed(id, Self::composed_view(mode), &mut |c| {
            out.extend(self.frontier(c));
            true
        });
        out
    }

    /// Node whose element should hold the elements of `id`
    fn container_of(&self, id: NodeId) -> Option<NodeId> {
        let mode = self.backend_mode()?;
        if mode == BackendMode::Shadow {
            let parent = self.get(id)?.parent?;
            return self.has_element_kind(parent).then_some(parent);
        }
        let view = Self::composed_view(mode);
        let mut current = id;
        loop {
            let parent = self.composed_parent_in(current, view)?;
            if self.has_element_kind(parent) {
                return Some(parent);
            }
            current = parent;
        }
    }

    /// Mark the containers currently holding the elements of `id`
    pub(crate) fn mark_old_position(&self, id: NodeId, dirty: &mut DirtySet) {
        if self.backend.is_none() {
            return;
        }
        for f in self.frontier(id) {
            if let Some(parent) = self.get(f).and_then(|n| n.backend_parent) {
                dirty.add(parent);
            }
        }
    }

    /// Mark the container that should hold the elements of `id`
    pub(crate) fn mark_new_position(&self, id: NodeId, dirty: &mut DirtySet) {
        if let Some(container) = self.container_of(id) {
            dirty.add(container);
        }
    }

    fn desired_children(&self, container: NodeId) -> Vec<NodeId> {
        let Some(mode) = self.backend_mode() else {
            return Vec::new();
        };
        let candidates = if mode == BackendMode::Shadow {
            self.get(container)
                .map(|n| n.children.clone())
                .unwrap_or_default()
        } else {
            self.frontier_children(container, mode)
        };
        candidates
            .into_iter()
            .filter(|&c| self.get(c).is_some_and(|n| n.live_element().is_some()))
            .collect()
    }

    fn frontier_children(&self, container: NodeId, mode: BackendMode) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk_composed(container, Self::composed_view(mode), &mut |c| {
            out.extend(self.frontier(c));
            true
        });
        out
    }

    fn live_handle(&self, id: NodeId) -> TreeResult<ElementHandle> {
        self.node(id)?
            .live_element()
            .ok_or(TreeError::BackendElementDestroyed(id))
    }

    /// Bring the backend child list of `container` in line with the tree
    fn sync_children(&mut self, container: NodeId) -> TreeResult<()> {
        let Some(container_element) = self.get(container).and_then(|n| n.live_element()) else {
            return Ok(());
        };
        let desired = self.desired_children(container);
        let current: Vec<NodeId> = self
            .node(container)?
            .mirror
            .iter()
            .copied()
            .filter(|&c| {
                self.get(c)
                    .is_some_and(|n| n.live_element().is_some() && n.backend_parent == Some(container))
            })
            .collect();
        if desired == current {
            self.node_mut(container)?.mirror = desired;
            return Ok(());
        }

        // Keep the mirrored nodes already in desired relative order
        let mut kept = Vec::new();
        let mut removals = Vec::new();
        let mut last_pos: Option<usize> = None;
        for c in current {
            match desired.iter().position(|&d| d == c) {
                Some(pos) if last_pos.is_none_or(|l| pos > l) => {
                    kept.push(c);
                    last_pos = Some(pos);
                }
                _ => removals.push(c),
            }
        }
        for &c in &removals {
            let element = self.live_handle(c)?;
            self.with_backend_taken(|_, backend| Ok(backend.remove_child(container_element, element)?))?;
            self.node_mut(c)?.backend_parent = None;
        }

        let mut i = 0;
        while i < desired.len() {
            if kept.contains(&desired[i]) {
                i += 1;
                continue;
            }
            let start = i;
            while i < desired.len() && !kept.contains(&desired[i]) {
                i += 1;
            }
            let run = desired[start..i].to_vec();
            self.insert_run(container, container_element, &run, desired.get(i).copied())?;
        }

        for &c in &desired {
            self.node_mut(c)?.backend_parent = Some(container);
        }
        self.node_mut(container)?.mirror = desired;
        Ok(())
    }

    fn insert_run(
        &mut self,
        container: NodeId,
        container_element: ElementHandle,
        run: &[NodeId],
        before: Option<NodeId>,
    ) -> TreeResult<()> {
        let mut elements = Vec::with_capacity(run.len());
        for &c in run {
            let element = self.live_handle(c)?;
            // Detach from the container currently holding it
            if let Some(other) = self.node(c)?.backend_parent.filter(|&p| p != container) {
                if let Some(other_element) = self.get(other).and_then(|n| n.live_element()) {
                    self.with_backend_taken(|_, backend| Ok(backend.remove_child(other_element, element)?))?;
                }
                if let Some(other) = self.get_mut(other) {
                    other.mirror.retain(|&m| m != c);
                }
                self.node_mut(c)?.backend_parent = None;
            }
            elements.push(element);
        }
        let before_element = match before {
            Some(b) => Some(self.live_handle(b)?),
            None => None,
        };

        self.with_backend_taken(|_, backend| {
            if let [element] = elements.as_slice() {
                match before_element {
                    Some(b) => backend.insert_before(container_element, *element, b)?,
                    None => backend.append_child(container_element, *element)?,
                }
                return Ok(());
            }
            let fragment = backend.create_fragment()?;
            for &element in &elements {
                backend.append_child(fragment, element)?;
            }
            match before_element {
                Some(b) => backend.splice_before(container_element, b, 0, fragment)?,
                None => backend.splice_append(container_element, fragment)?,
            }
            backend.release(fragment)?;
            Ok(())
        })?;
        Ok(())
    }

    pub(crate) fn sync_dirty(&mut self, dirty: DirtySet) -> TreeResult<()> {
        if self.backend.is_none() {
            return Ok(());
        }
        for container in dirty.containers {
            self.sync_children(container)?;
        }
        Ok(())
    }

    /// Forward a containing slot change to a shadow backend
    pub(crate) fn backend_reassign_slot(
        &mut self,
        id: NodeId,
        old_slot: Option<NodeId>,
        new_slot: Option<NodeId>,
    ) -> TreeResult<()> {
        if self.backend_mode() != Some(BackendMode::Shadow) {
            return Ok(());
        }
        let Some(element) = self.get(id).and_then(|n| n.live_element()) else {
            return Ok(());
        };
        let old_element = old_slot.and_then(|s| self.get(s)).and_then(|n| n.live_element());
        let new_element = new_slot.and_then(|s| self.get(s)).and_then(|n| n.live_element());
        self.with_backend_taken(|_, backend| {
            Ok(backend.reassign_containing_slot(element, old_element, new_element)?)
        })?;
        Ok(())
    }

    /// Apply `f` to the live element of `id`, if any
    pub(crate) fn update_element(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut DynBackend, ElementHandle) -> Result<(), shade_backend::BackendError>,
    ) -> TreeResult<()> {
        let Some(element) = self.node(id)?.live_element() else {
            return Ok(());
        };
        self.with_backend_taken(|_, backend| Ok(f(backend, element)?))?;
        Ok(())
    }

    // --- Public surface ---

    /// Backend element of a node
    ///
    /// A destroyed element is recreated when the node is attached again;
    /// querying it while detached is [`TreeError::BackendElementDestroyed`].
    pub fn backend_element(&mut self, id: NodeId) -> TreeResult<Option<ElementHandle>> {
        let node = self.node(id)?;
        match node.backend {
            BackendSlot::Live(handle) => Ok(Some(handle)),
            BackendSlot::Absent => Ok(None),
            BackendSlot::Destroyed if node.attached => {
                let mut dirty = DirtySet::default();
                self.recreate_backend_element(id, &mut dirty)?;
                self.sync_dirty(dirty)?;
                Ok(self.node(id)?.live_element())
            }
            BackendSlot::Destroyed => Err(TreeError::BackendElementDestroyed(id)),
        }
    }

    /// Node owning a backend element
    pub fn node_for_element(&self, element: ElementHandle) -> Option<NodeId> {
        self.backend_index.get(&element).copied()
    }

    pub fn destroy_backend_element_on_detach(&self, id: NodeId) -> TreeResult<bool> {
        Ok(self.node(id)?.destroy_backend_on_detach)
    }

    pub fn set_destroy_backend_element_on_detach(&mut self, id: NodeId, destroy: bool) -> TreeResult<()> {
        self.node_mut(id)?.destroy_backend_on_detach = destroy;
        Ok(())
    }

    fn query_element(&self, id: NodeId) -> TreeResult<ElementHandle> {
        if self.backend.is_none() {
            return Err(TreeError::NoBackend);
        }
        match self.node(id)?.backend {
            BackendSlot::Live(handle) => Ok(handle),
            BackendSlot::Destroyed => Err(TreeError::BackendElementDestroyed(id)),
            BackendSlot::Absent => Err(TreeError::NoBackendElement(id)),
        }
    }

    fn backend_mut(&mut self) -> TreeResult<&mut DynBackend> {
        self.backend.as_deref_mut().ok_or(TreeError::NoBackend)
    }

    pub fn bounding_client_rect(
        &mut self,
        id: NodeId,
        callback: impl FnOnce(BoundingClientRect) + 'static,
    ) -> TreeResult<()> {
        let element = self.query_element(id)?;
        self.backend_mut()?
            .get_bounding_client_rect(element, Box::new(callback))?;
        Ok(())
    }

    pub fn scroll_offset(
        &mut self,
        id: NodeId,
        callback: impl FnOnce(ScrollOffset) + 'static,
    ) -> TreeResult<()> {
        let element = self.query_element(id)?;
        self.backend_mut()?
            .get_scroll_offset(element, Box::new(callback))?;
        Ok(())
    }

    /// Observe the intersection of `id` with `relative` (viewport if `None`)
    pub fn create_intersection_observer(
        &mut self,
        id: NodeId,
        relative: Option<NodeId>,
        relative_margin: &str,
        thresholds: Vec<f64>,
        callback: impl FnMut(IntersectionStatus) + 'static,
    ) -> TreeResult<ObserverHandle> {
        let element = self.query_element(id)?;
        let relative = match relative {
            Some(r) => Some(self.query_element(r)?),
            None => None,
        };
        let init = IntersectionInit {
            relative,
            relative_margin: relative_margin.to_string(),
            thresholds,
        };
        Ok(self
            .backend_mut()?
            .create_intersection_observer(element, init, Box::new(callback))?)
    }

    pub fn create_media_query_observer(
        &mut self,
        status: MediaQueryStatus,
        callback: impl FnMut(bool) + 'static,
    ) -> TreeResult<ObserverHandle> {
        Ok(self
            .backend_mut()?
            .create_media_query_observer(status, Box::new(callback))?)
    }

    pub fn disconnect_backend_observer(&mut self, handle: ObserverHandle) -> TreeResult<()> {
        self.backend_mut()?.disconnect_observer(handle)?;
        Ok(())
    }

    /// Rendering context of a canvas-like element
    pub fn element_context(
        &mut self,
        id: NodeId,
        callback: impl FnOnce(Option<ContextHandle>) + 'static,
    ) -> TreeResult<()> {
        let element = self.query_element(id)?;
        self.backend_mut()?.get_context(element, Box::new(callback))?;
        Ok(())
    }

    pub fn register_style_sheet(&mut self, path: &str, content: &str) -> TreeResult<()> {
        self.backend_mut()?.register_style_sheet_content(path, content);
        Ok(())
    }

    pub fn append_style_sheet(&mut self, path: &str, scope: Option<StyleScope>) -> TreeResult<StyleSheetId> {
        Ok(self.backend_mut()?.append_style_sheet_path(path, scope)?)
    }

    pub fn disable_style_sheet(&mut self, id: StyleSheetId) -> TreeResult<()> {
        self.backend_mut()?.disable_style_sheet(id)?;
        Ok(())
    }

    /// Schedule a backend paint; `callback` runs once the pass completes
    pub fn render(&mut self, callback: impl FnOnce() + 'static) -> TreeResult<()> {
        self.backend_mut()?.render(Box::new(callback));
        Ok(())
    }

    /// Destroy the backend context. Fails while elements are alive.
    pub fn destroy_backend(&mut self) -> TreeResult<()> {
        self.backend_mut()?.destroy()?;
        tracing::debug!("Backend context destroyed");
        Ok(())
    }
}
