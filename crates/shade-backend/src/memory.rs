//! In-memory backend
//!
//! Implements the whole backend contract for any [`BackendMode`] without a
//! real rendering target. Elements live in a table keyed by handle; the
//! element tree can be inspected and serialized, asynchronous query
//! callbacks run on [`MemoryBackend::flush_tasks`] and render callbacks on
//! [`MemoryBackend::complete_render`].
//!
//! The handle is cheap to clone; clones share the same state, so a test can
//! keep one clone while the tree owns another.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::context::{
    BackendContext, BackendResult, BoundingClientRect, ComponentInit, ContextHandle, EventSink,
    IntersectionInit, IntersectionStatus, MediaQueryStatus, ObserverHandle, RawEvent,
    ScrollOffset,
};
use crate::{
    BackendError, BackendMode, ElementHandle, RenderQueue, StyleScope, StyleSheetId,
    StyleSheetRegistry,
};

/// Kind of a memory element
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryElementKind {
    Element {
        logical_tag: String,
        styling_tag: String,
    },
    Text,
    Fragment,
    Component {
        tag_name: String,
        virtual_host: bool,
        style_scope: Option<StyleScope>,
        extra_style_scope: Option<StyleScope>,
    },
    Virtual {
        name: String,
    },
    ShadowRoot {
        host: ElementHandle,
    },
}

/// Snapshot of a memory element
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryElement {
    pub kind: MemoryElementKind,
    pub parent: Option<ElementHandle>,
    pub children: Vec<ElementHandle>,
    pub shadow_root: Option<ElementHandle>,
    pub id: String,
    pub style: String,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub slot_name: Option<String>,
    pub containing_slot: Option<ElementHandle>,
    pub rect: BoundingClientRect,
    pub scroll: ScrollOffset,
}

impl MemoryElement {
    fn new(kind: MemoryElementKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            shadow_root: None,
            id: String::new(),
            style: String::new(),
            classes: Vec::new(),
            attributes: BTreeMap::new(),
            text: String::new(),
            slot_name: None,
            containing_slot: None,
            rect: BoundingClientRect::default(),
            scroll: ScrollOffset::default(),
        }
    }

    fn can_hold_children(&self) -> bool {
        !matches!(self.kind, MemoryElementKind::Text)
    }
}

struct IntersectionEntry {
    element: ElementHandle,
    init: IntersectionInit,
    callback: Box<dyn FnMut(IntersectionStatus)>,
    last_ratio: Option<f64>,
}

struct MediaEntry {
    status: MediaQueryStatus,
    callback: Box<dyn FnMut(bool)>,
    last: Option<bool>,
}

struct MemoryState {
    elements: HashMap<ElementHandle, MemoryElement>,
    next_element: u32,
    styles: StyleSheetRegistry,
    render: RenderQueue,
    tasks: VecDeque<Box<dyn FnOnce()>>,
    sink: Option<EventSink>,
    intersections: HashMap<ObserverHandle, IntersectionEntry>,
    media: HashMap<ObserverHandle, MediaEntry>,
    next_observer: u32,
    window_width: f64,
    window_height: f64,
    device_pixel_ratio: f64,
    theme: String,
    destroyed: bool,
    mutations: usize,
}

impl MemoryState {
    fn check_usable(&self) -> BackendResult<()> {
        if self.destroyed {
            return Err(BackendError::Destroyed);
        }
        Ok(())
    }

    fn live(&self, handle: ElementHandle) -> BackendResult<&MemoryElement> {
        self.check_usable()?;
        self.elements
            .get(&handle)
            .ok_or(BackendError::ElementReleased(handle))
    }

    fn live_mut(&mut self, handle: ElementHandle) -> BackendResult<&mut MemoryElement> {
        self.check_usable()?;
        self.elements
            .get_mut(&handle)
            .ok_or(BackendError::ElementReleased(handle))
    }

    fn alloc(&mut self, kind: MemoryElementKind) -> BackendResult<ElementHandle> {
        self.check_usable()?;
        let handle = ElementHandle(self.next_element);
        self.next_element += 1;
        self.elements.insert(handle, MemoryElement::new(kind));
        Ok(handle)
    }

    fn container(&self, parent: ElementHandle) -> BackendResult<&MemoryElement> {
        let elem = self.live(parent)?;
        if !elem.can_hold_children() {
            return Err(BackendError::NotAContainer(parent));
        }
        Ok(elem)
    }

    /// Child must exist, be parentless and not be a fragment
    fn check_free_child(&self, child: ElementHandle) -> BackendResult<()> {
        let elem = self.live(child)?;
        if matches!(elem.kind, MemoryElementKind::Fragment) {
            return Err(BackendError::InvalidFragment(child));
        }
        if elem.parent.is_some() {
            return Err(BackendError::AlreadyHasParent(child));
        }
        Ok(())
    }

    fn check_fragment(&self, fragment: ElementHandle) -> BackendResult<()> {
        let elem = self.live(fragment)?;
        if !matches!(elem.kind, MemoryElementKind::Fragment) || elem.parent.is_some() {
            return Err(BackendError::InvalidFragment(fragment));
        }
        Ok(())
    }

    fn position(&self, parent: ElementHandle, child: ElementHandle) -> BackendResult<usize> {
        self.container(parent)?
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(BackendError::NotAChild { parent, child })
    }

    fn set_parent(&mut self, children: &[ElementHandle], parent: Option<ElementHandle>) {
        for child in children {
            if let Some(elem) = self.elements.get_mut(child) {
                elem.parent = parent;
            }
        }
    }

    fn splice(
        &mut self,
        parent: ElementHandle,
        index: usize,
        delete_count: usize,
        fragment: Option<ElementHandle>,
    ) -> BackendResult<()> {
        let len = self.container(parent)?.children.len();
        let end = index
            .checked_add(delete_count)
            .filter(|&end| end <= len)
            .ok_or(BackendError::IndexOutOfRange {
                start: index,
                count: delete_count,
                len,
            })?;
        let inserted = match fragment {
            Some(fragment) => {
                self.check_fragment(fragment)?;
                std::mem::take(&mut self.live_mut(fragment)?.children)
            }
            None => Vec::new(),
        };
        let removed: Vec<ElementHandle> = self
            .live_mut(parent)?
            .children
            .splice(index..end, inserted.iter().copied())
            .collect();
        self.set_parent(&removed, None);
        self.set_parent(&inserted, Some(parent));
        self.mutations += 1;
        Ok(())
    }

    fn serialize_into(&self, handle: ElementHandle, out: &mut String) {
        let Some(elem) = self.elements.get(&handle) else {
            return;
        };
        let tag = match &elem.kind {
            MemoryElementKind::Text => {
                out.push_str(&elem.text);
                return;
            }
            MemoryElementKind::Element { logical_tag, .. } => logical_tag.clone(),
            MemoryElementKind::Fragment => "#fragment".to_string(),
            MemoryElementKind::Component { tag_name, .. } => tag_name.clone(),
            MemoryElementKind::Virtual { name } => format!("virtual:{name}"),
            MemoryElementKind::ShadowRoot { .. } => "#shadow".to_string(),
        };
        out.push('<');
        out.push_str(&tag);
        if !elem.id.is_empty() {
            out.push('#');
            out.push_str(&elem.id);
        }
        out.push('>');
        if let Some(shadow) = elem.shadow_root {
            self.serialize_into(shadow, out);
        }
        for &child in &elem.children {
            self.serialize_into(child, out);
        }
        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
    }

    fn viewport(&self) -> BoundingClientRect {
        BoundingClientRect::new(0.0, 0.0, self.window_width, self.window_height)
    }
}

/// In-memory backend
#[derive(Clone)]
pub struct MemoryBackend {
    mode: BackendMode,
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryBackend {
    /// Create a backend for the given mode
    pub fn new(mode: BackendMode) -> Self {
        let state = MemoryState {
            elements: HashMap::new(),
            next_element: 1,
            styles: StyleSheetRegistry::new(),
            render: RenderQueue::new(),
            tasks: VecDeque::new(),
            sink: None,
            intersections: HashMap::new(),
            media: HashMap::new(),
            next_observer: 1,
            window_width: 375.0,
            window_height: 667.0,
            device_pixel_ratio: 2.0,
            theme: "light".to_string(),
            destroyed: false,
            mutations: 0,
        };
        Self {
            mode,
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Snapshot of an element
    pub fn element(&self, handle: ElementHandle) -> Option<MemoryElement> {
        self.state.borrow().elements.get(&handle).cloned()
    }

    /// Children of an element (empty for unknown handles)
    pub fn children(&self, handle: ElementHandle) -> Vec<ElementHandle> {
        self.state
            .borrow()
            .elements
            .get(&handle)
            .map(|e| e.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, handle: ElementHandle) -> Option<ElementHandle> {
        self.state.borrow().elements.get(&handle)?.parent
    }

    pub fn is_live(&self, handle: ElementHandle) -> bool {
        self.state.borrow().elements.contains_key(&handle)
    }

    /// Number of elements not yet released
    pub fn live_elements(&self) -> usize {
        self.state.borrow().elements.len()
    }

    /// Number of tree mutation calls received so far
    pub fn mutation_count(&self) -> usize {
        self.state.borrow().mutations
    }

    /// Serialize an element subtree, e.g. `<div#a><span>text</span></div>`
    pub fn serialize(&self, handle: ElementHandle) -> String {
        let mut out = String::new();
        self.state.borrow().serialize_into(handle, &mut out);
        out
    }

    /// Serialize the children of an element without the element itself
    pub fn serialize_children(&self, handle: ElementHandle) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        if let Some(elem) = state.elements.get(&handle) {
            for &child in &elem.children {
                state.serialize_into(child, &mut out);
            }
        }
        out
    }

    pub fn set_rect(&self, handle: ElementHandle, rect: BoundingClientRect) {
        if let Some(elem) = self.state.borrow_mut().elements.get_mut(&handle) {
            elem.rect = rect;
        }
    }

    pub fn set_scroll_offset(&self, handle: ElementHandle, offset: ScrollOffset) {
        if let Some(elem) = self.state.borrow_mut().elements.get_mut(&handle) {
            elem.scroll = offset;
        }
    }

    pub fn set_window_size(&self, width: f64, height: f64) {
        let mut state = self.state.borrow_mut();
        state.window_width = width;
        state.window_height = height;
    }

    pub fn set_theme(&self, theme: &str) {
        self.state.borrow_mut().theme = theme.to_string();
    }

    pub fn register_style_scope(&self, name: &str) -> StyleScope {
        self.state.borrow_mut().styles.register_scope(name)
    }

    pub fn active_style_sheets(&self) -> Vec<String> {
        self.state
            .borrow()
            .styles
            .active_paths()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Run queued query callbacks and evaluate observers.
    /// Returns the number of callbacks invoked.
    pub fn flush_tasks(&self) -> usize {
        let mut count = 0;
        loop {
            let task = self.state.borrow_mut().tasks.pop_front();
            match task {
                Some(task) => {
                    task();
                    count += 1;
                }
                None => break,
            }
        }
        count + self.evaluate_media() + self.evaluate_intersections()
    }

    /// Report completion of the pending paint pass.
    /// Returns the number of render callbacks invoked.
    pub fn complete_render(&self) -> usize {
        let callbacks = self.state.borrow_mut().render.take_pass();
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    pub fn render_pending(&self) -> bool {
        self.state.borrow().render.is_pending()
    }

    pub fn render_passes(&self) -> u64 {
        self.state.borrow().render.passes()
    }

    /// Feed an event into the global sink. Returns `false` without a sink.
    pub fn trigger_event(
        &self,
        target: ElementHandle,
        name: &str,
        detail: Value,
        bubbles: bool,
        composed: bool,
        capture_phase: bool,
    ) -> bool {
        let sink = self.state.borrow_mut().sink.take();
        let Some(mut sink) = sink else {
            return false;
        };
        sink(RawEvent {
            target,
            name: name.to_string(),
            detail,
            bubbles,
            composed,
            capture_phase,
        });
        let mut state = self.state.borrow_mut();
        if state.sink.is_none() {
            state.sink = Some(sink);
        }
        true
    }

    fn evaluate_media(&self) -> usize {
        let handles: Vec<ObserverHandle> = self.state.borrow().media.keys().copied().collect();
        let mut count = 0;
        for handle in handles {
            let (matches, entry) = {
                let mut state = self.state.borrow_mut();
                let (width, height) = (state.window_width, state.window_height);
                let Some(entry) = state.media.get(&handle) else {
                    continue;
                };
                let matches = entry.status.matches(width, height);
                if entry.last == Some(matches) {
                    continue;
                }
                let Some(entry) = state.media.remove(&handle) else {
                    continue;
                };
                (matches, entry)
            };
            let mut entry = entry;
            (entry.callback)(matches);
            entry.last = Some(matches);
            self.state.borrow_mut().media.insert(handle, entry);
            count += 1;
        }
        count
    }

    fn evaluate_intersections(&self) -> usize {
        let handles: Vec<ObserverHandle> =
            self.state.borrow().intersections.keys().copied().collect();
        let mut count = 0;
        for handle in handles {
            let (status, entry) = {
                let mut state = self.state.borrow_mut();
                let Some(entry) = state.intersections.get(&handle) else {
                    continue;
                };
                let Some(target) = state.elements.get(&entry.element) else {
                    continue;
                };
                let rect = target.rect;
                let relative_rect = match entry.init.relative {
                    Some(relative) => match state.elements.get(&relative) {
                        Some(elem) => elem.rect,
                        None => continue,
                    },
                    None => state.viewport(),
                };
                let intersection = rect.intersection(&relative_rect);
                let ratio = if rect.area() > 0.0 {
                    intersection.area() / rect.area()
                } else {
                    0.0
                };
                let crossed = match entry.last_ratio {
                    None => true,
                    Some(last) if entry.init.thresholds.is_empty() => last != ratio,
                    Some(last) => entry
                        .init
                        .thresholds
                        .iter()
                        .any(|&t| (last >= t) != (ratio >= t)),
                };
                if !crossed {
                    continue;
                }
                let Some(entry) = state.intersections.remove(&handle) else {
                    continue;
                };
                let status = IntersectionStatus {
                    intersection_ratio: ratio,
                    bounding_client_rect: rect,
                    intersection_rect: intersection,
                    relative_rect,
                };
                (status, entry)
            };
            let mut entry = entry;
            (entry.callback)(status);
            entry.last_ratio = Some(status.intersection_ratio);
            self.state.borrow_mut().intersections.insert(handle, entry);
            count += 1;
        }
        count
    }

    fn require_mode(&self, supported: bool) -> BackendResult<()> {
        if supported {
            Ok(())
        } else {
            Err(BackendError::Unsupported(self.mode))
        }
    }

    fn with_element(
        &mut self,
        handle: ElementHandle,
        f: impl FnOnce(&mut MemoryElement),
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        f(state.live_mut(handle)?);
        Ok(())
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryBackend")
            .field("mode", &self.mode)
            .field("live_elements", &state.elements.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl BackendContext for MemoryBackend {
    fn mode(&self) -> BackendMode {
        self.mode
    }

    fn destroy(&mut self) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_usable()?;
        if !state.elements.is_empty() {
            return Err(BackendError::LiveElements(state.elements.len()));
        }
        tracing::debug!("Memory backend ({:?}) destroyed", self.mode);
        state.destroyed = true;
        state.sink = None;
        state.intersections.clear();
        state.media.clear();
        Ok(())
    }

    fn window_width(&self) -> f64 {
        self.state.borrow().window_width
    }

    fn window_height(&self) -> f64 {
        self.state.borrow().window_height
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.state.borrow().device_pixel_ratio
    }

    fn theme(&self) -> String {
        self.state.borrow().theme.clone()
    }

    fn register_style_sheet_content(&mut self, path: &str, content: &str) {
        self.state.borrow_mut().styles.register_content(path, content);
    }

    fn append_style_sheet_path(
        &mut self,
        path: &str,
        scope: Option<StyleScope>,
    ) -> BackendResult<StyleSheetId> {
        let mut state = self.state.borrow_mut();
        state.check_usable()?;
        state.styles.append(path, scope)
    }

    fn disable_style_sheet(&mut self, id: StyleSheetId) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_usable()?;
        state.styles.disable(id)
    }

    fn resolve_style_scope(&mut self, name: &str) -> StyleScope {
        self.state.borrow_mut().styles.register_scope(name)
    }

    fn create_element(
        &mut self,
        logical_tag: &str,
        styling_tag: &str,
    ) -> BackendResult<ElementHandle> {
        self.state.borrow_mut().alloc(MemoryElementKind::Element {
            logical_tag: logical_tag.to_string(),
            styling_tag: styling_tag.to_string(),
        })
    }

    fn create_text_node(&mut self, text: &str) -> BackendResult<ElementHandle> {
        let mut state = self.state.borrow_mut();
        let handle = state.alloc(MemoryElementKind::Text)?;
        state.live_mut(handle)?.text = text.to_string();
        Ok(handle)
    }

    fn create_fragment(&mut self) -> BackendResult<ElementHandle> {
        self.state.borrow_mut().alloc(MemoryElementKind::Fragment)
    }

    fn create_component(&mut self, init: &ComponentInit) -> BackendResult<ElementHandle> {
        self.require_mode(self.mode.supports_virtual_nodes())?;
        let mut state = self.state.borrow_mut();
        for scope in [init.style_scope, init.extra_style_scope].into_iter().flatten() {
            if state.styles.scope_name(scope).is_none() {
                return Err(BackendError::UnknownStyleScope(scope));
            }
        }
        state.alloc(MemoryElementKind::Component {
            tag_name: init.tag_name.clone(),
            virtual_host: init.virtual_host,
            style_scope: init.style_scope,
            extra_style_scope: init.extra_style_scope,
        })
    }

    fn create_virtual_node(&mut self, name: &str) -> BackendResult<ElementHandle> {
        self.require_mode(self.mode.supports_virtual_nodes())?;
        self.state.borrow_mut().alloc(MemoryElementKind::Virtual {
            name: name.to_string(),
        })
    }

    fn create_shadow_root(&mut self, host: ElementHandle) -> BackendResult<ElementHandle> {
        self.require_mode(self.mode.mirrors_shadow_tree())?;
        let mut state = self.state.borrow_mut();
        let host_elem = state.live(host)?;
        if !matches!(host_elem.kind, MemoryElementKind::Component { .. })
            || host_elem.shadow_root.is_some()
        {
            return Err(BackendError::NotAContainer(host));
        }
        let shadow = state.alloc(MemoryElementKind::ShadowRoot { host })?;
        state.live_mut(host)?.shadow_root = Some(shadow);
        Ok(shadow)
    }

    fn release(&mut self, element: ElementHandle) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let elem = state.live(element)?.clone();
        if let Some(parent) = elem.parent {
            if let Some(p) = state.elements.get_mut(&parent) {
                p.children.retain(|&c| c != element);
            }
        }
        state.set_parent(&elem.children, None);
        if let MemoryElementKind::ShadowRoot { host } = elem.kind {
            if let Some(h) = state.elements.get_mut(&host) {
                h.shadow_root = None;
            }
        }
        for other in state.elements.values_mut() {
            if other.containing_slot == Some(element) {
                other.containing_slot = None;
            }
        }
        state.elements.remove(&element);
        Ok(())
    }

    fn append_child(&mut self, parent: ElementHandle, child: ElementHandle) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.container(parent)?;
        state.check_free_child(child)?;
        state.live_mut(parent)?.children.push(child);
        state.live_mut(child)?.parent = Some(parent);
        state.mutations += 1;
        Ok(())
    }

    fn remove_child(&mut self, parent: ElementHandle, child: ElementHandle) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let pos = state.position(parent, child)?;
        state.live_mut(parent)?.children.remove(pos);
        state.live_mut(child)?.parent = None;
        state.mutations += 1;
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: ElementHandle,
        child: ElementHandle,
        before: ElementHandle,
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let pos = state.position(parent, before)?;
        state.check_free_child(child)?;
        state.live_mut(parent)?.children.insert(pos, child);
        state.live_mut(child)?.parent = Some(parent);
        state.mutations += 1;
        Ok(())
    }

    fn replace_child(
        &mut self,
        parent: ElementHandle,
        child: ElementHandle,
        old_child: ElementHandle,
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let pos = state.position(parent, old_child)?;
        state.check_free_child(child)?;
        state.live_mut(parent)?.children[pos] = child;
        state.live_mut(old_child)?.parent = None;
        state.live_mut(child)?.parent = Some(parent);
        state.mutations += 1;
        Ok(())
    }

    fn splice_before(
        &mut self,
        parent: ElementHandle,
        before: ElementHandle,
        delete_count: usize,
        fragment: ElementHandle,
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let pos = state.position(parent, before)?;
        state.splice(parent, pos, delete_count, Some(fragment))
    }

    fn splice_append(&mut self, parent: ElementHandle, fragment: ElementHandle) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let len = state.container(parent)?.children.len();
        state.splice(parent, len, 0, Some(fragment))
    }

    fn splice_remove(
        &mut self,
        parent: ElementHandle,
        start: ElementHandle,
        delete_count: usize,
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let pos = state.position(parent, start)?;
        state.splice(parent, pos, delete_count, None)
    }

    fn set_id(&mut self, element: ElementHandle, id: &str) -> BackendResult<()> {
        self.with_element(element, |e| e.id = id.to_string())
    }

    fn set_style(&mut self, element: ElementHandle, style: &str) -> BackendResult<()> {
        self.with_element(element, |e| e.style = style.to_string())
    }

    fn add_class(&mut self, element: ElementHandle, class: &str) -> BackendResult<()> {
        self.with_element(element, |e| {
            if !e.classes.iter().any(|c| c == class) {
                e.classes.push(class.to_string());
            }
        })
    }

    fn remove_class(&mut self, element: ElementHandle, class: &str) -> BackendResult<()> {
        self.with_element(element, |e| e.classes.retain(|c| c != class))
    }

    fn clear_classes(&mut self, element: ElementHandle) -> BackendResult<()> {
        self.with_element(element, |e| e.classes.clear())
    }

    fn set_attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
        value: &str,
    ) -> BackendResult<()> {
        self.with_element(element, |e| {
            e.attributes.insert(name.to_string(), value.to_string());
        })
    }

    fn remove_attribute(&mut self, element: ElementHandle, name: &str) -> BackendResult<()> {
        self.with_element(element, |e| {
            e.attributes.remove(name);
        })
    }

    fn set_text(&mut self, element: ElementHandle, text: &str) -> BackendResult<()> {
        self.with_element(element, |e| e.text = text.to_string())
    }

    fn set_slot_name(&mut self, element: ElementHandle, name: &str) -> BackendResult<()> {
        self.require_mode(self.mode.mirrors_shadow_tree())?;
        self.with_element(element, |e| e.slot_name = Some(name.to_string()))
    }

    fn set_containing_slot(
        &mut self,
        element: ElementHandle,
        slot: Option<ElementHandle>,
    ) -> BackendResult<()> {
        self.require_mode(self.mode.mirrors_shadow_tree())?;
        if let Some(slot) = slot {
            self.state.borrow().live(slot)?;
        }
        self.with_element(element, |e| e.containing_slot = slot)
    }

    fn reassign_containing_slot(
        &mut self,
        element: ElementHandle,
        old_slot: Option<ElementHandle>,
        new_slot: Option<ElementHandle>,
    ) -> BackendResult<()> {
        self.require_mode(self.mode.mirrors_shadow_tree())?;
        let current = self.state.borrow().live(element)?.containing_slot;
        if current != old_slot {
            tracing::warn!(
                "Reassigning slot of {:?}: expected {:?}, found {:?}",
                element,
                old_slot,
                current
            );
        }
        self.set_containing_slot(element, new_slot)
    }

    fn get_bounding_client_rect(
        &mut self,
        element: ElementHandle,
        callback: Box<dyn FnOnce(BoundingClientRect)>,
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let rect = state.live(element)?.rect;
        state.tasks.push_back(Box::new(move || callback(rect)));
        Ok(())
    }

    fn get_scroll_offset(
        &mut self,
        element: ElementHandle,
        callback: Box<dyn FnOnce(ScrollOffset)>,
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let offset = state.live(element)?.scroll;
        state.tasks.push_back(Box::new(move || callback(offset)));
        Ok(())
    }

    fn create_intersection_observer(
        &mut self,
        element: ElementHandle,
        init: IntersectionInit,
        callback: Box<dyn FnMut(IntersectionStatus)>,
    ) -> BackendResult<ObserverHandle> {
        let mut state = self.state.borrow_mut();
        state.live(element)?;
        if let Some(relative) = init.relative {
            state.live(relative)?;
        }
        let handle = ObserverHandle(state.next_observer);
        state.next_observer += 1;
        state.intersections.insert(
            handle,
            IntersectionEntry {
                element,
                init,
                callback,
                last_ratio: None,
            },
        );
        Ok(handle)
    }

    fn create_media_query_observer(
        &mut self,
        status: MediaQueryStatus,
        callback: Box<dyn FnMut(bool)>,
    ) -> BackendResult<ObserverHandle> {
        let mut state = self.state.borrow_mut();
        state.check_usable()?;
        let handle = ObserverHandle(state.next_observer);
        state.next_observer += 1;
        state.media.insert(
            handle,
            MediaEntry {
                status,
                callback,
                last: None,
            },
        );
        Ok(handle)
    }

    fn disconnect_observer(&mut self, handle: ObserverHandle) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_usable()?;
        state.intersections.remove(&handle);
        state.media.remove(&handle);
        Ok(())
    }

    fn get_context(
        &mut self,
        element: ElementHandle,
        callback: Box<dyn FnOnce(Option<ContextHandle>)>,
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let context = match &state.live(element)?.kind {
            MemoryElementKind::Element { logical_tag, .. } if logical_tag == "canvas" => {
                Some(ContextHandle(element.0))
            }
            _ => None,
        };
        state.tasks.push_back(Box::new(move || callback(context)));
        Ok(())
    }

    fn on_event(&mut self, sink: EventSink) {
        self.state.borrow_mut().sink = Some(sink);
    }

    fn render(&mut self, callback: Box<dyn FnOnce()>) {
        let opened = self.state.borrow_mut().render.schedule(callback);
        if opened {
            tracing::trace!("Render pass requested");
        }
    }
}
