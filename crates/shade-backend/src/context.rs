//! Backend Context contract
//!
//! Lifecycle, style, element factories, tree mutation, node properties,
//! asynchronous queries, the global event sink and render scheduling.
//! Mode-specific operations default to [`BackendError::Unsupported`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BackendError, BackendMode, ElementHandle, StyleScope, StyleSheetId};

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Element geometry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingClientRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingClientRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Overlapping area of two rectangles (empty rect when disjoint)
    pub fn intersection(&self, other: &Self) -> Self {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return Self::new(left, top, 0.0, 0.0);
        }
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Scroll position and extent of an element
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub scroll_left: f64,
    pub scroll_top: f64,
    pub scroll_width: f64,
    pub scroll_height: f64,
}

/// Screen orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// Conditions of a media query observer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaQueryStatus {
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    pub width: Option<f64>,
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
    pub height: Option<f64>,
    pub orientation: Option<Orientation>,
}

impl MediaQueryStatus {
    /// Check the conditions against a viewport size
    pub fn matches(&self, width: f64, height: f64) -> bool {
        let orientation = if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        };
        self.min_width.is_none_or(|v| width >= v)
            && self.max_width.is_none_or(|v| width <= v)
            && self.width.is_none_or(|v| width == v)
            && self.min_height.is_none_or(|v| height >= v)
            && self.max_height.is_none_or(|v| height <= v)
            && self.height.is_none_or(|v| height == v)
            && self.orientation.is_none_or(|o| o == orientation)
    }
}

/// Intersection change notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IntersectionStatus {
    pub intersection_ratio: f64,
    pub bounding_client_rect: BoundingClientRect,
    pub intersection_rect: BoundingClientRect,
    pub relative_rect: BoundingClientRect,
}

/// Intersection observer parameters
#[derive(Debug, Clone, Default)]
pub struct IntersectionInit {
    /// Element the target is measured against (viewport when `None`)
    pub relative: Option<ElementHandle>,
    /// CSS-like margin applied to the relative rect
    pub relative_margin: String,
    pub thresholds: Vec<f64>,
}

/// Handle of a backend-side observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(pub u32);

/// Opaque rendering context of canvas-like elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub u32);

/// Event raised by the backend, before translation into a tree event
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub target: ElementHandle,
    pub name: String,
    pub detail: Value,
    pub bubbles: bool,
    pub composed: bool,
    pub capture_phase: bool,
}

/// The single global event sink registered with [`BackendContext::on_event`]
pub type EventSink = Box<dyn FnMut(RawEvent)>;

/// Component creation parameters for shadow and composed backends
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentInit {
    pub tag_name: String,
    pub external: bool,
    pub virtual_host: bool,
    pub style_scope: Option<StyleScope>,
    pub extra_style_scope: Option<StyleScope>,
    pub external_classes: Vec<String>,
}

/// Rendering backend
///
/// Tree mutation methods follow the same assertion contract as the tree core:
/// a child must not already have a parent when appended, `remove_child`
/// requires the child to actually be a child, and splice methods consume a
/// parentless fragment.
pub trait BackendContext {
    /// Mode this backend runs in
    fn mode(&self) -> BackendMode;

    // --- Lifecycle ---

    /// Tear the backend down. Fails while live elements remain.
    fn destroy(&mut self) -> BackendResult<()>;
    fn window_width(&self) -> f64;
    fn window_height(&self) -> f64;
    fn device_pixel_ratio(&self) -> f64;
    fn theme(&self) -> String;

    // --- Style ---

    fn register_style_sheet_content(&mut self, path: &str, content: &str);
    fn append_style_sheet_path(
        &mut self,
        path: &str,
        scope: Option<StyleScope>,
    ) -> BackendResult<StyleSheetId>;
    fn disable_style_sheet(&mut self, id: StyleSheetId) -> BackendResult<()>;
    /// Scope id of a scope name, registered on first use
    fn resolve_style_scope(&mut self, name: &str) -> StyleScope;

    // --- Factories ---

    fn create_element(&mut self, logical_tag: &str, styling_tag: &str)
        -> BackendResult<ElementHandle>;
    fn create_text_node(&mut self, text: &str) -> BackendResult<ElementHandle>;
    fn create_fragment(&mut self) -> BackendResult<ElementHandle>;

    fn create_component(&mut self, init: &ComponentInit) -> BackendResult<ElementHandle> {
        let _ = init;
        Err(BackendError::Unsupported(self.mode()))
    }

    fn create_virtual_node(&mut self, name: &str) -> BackendResult<ElementHandle> {
        let _ = name;
        Err(BackendError::Unsupported(self.mode()))
    }

    fn create_shadow_root(&mut self, host: ElementHandle) -> BackendResult<ElementHandle> {
        let _ = host;
        Err(BackendError::Unsupported(self.mode()))
    }

    /// Release an element; it is detached from its parent and children first
    fn release(&mut self, element: ElementHandle) -> BackendResult<()>;

    // --- Tree mutation ---

    fn append_child(&mut self, parent: ElementHandle, child: ElementHandle) -> BackendResult<()>;
    fn remove_child(&mut self, parent: ElementHandle, child: ElementHandle) -> BackendResult<()>;
    fn insert_before(
        &mut self,
        parent: ElementHandle,
        child: ElementHandle,
        before: ElementHandle,
    ) -> BackendResult<()>;
    fn replace_child(
        &mut self,
        parent: ElementHandle,
        child: ElementHandle,
        old_child: ElementHandle,
    ) -> BackendResult<()>;
    fn splice_before(
        &mut self,
        parent: ElementHandle,
        before: ElementHandle,
        delete_count: usize,
        fragment: ElementHandle,
    ) -> BackendResult<()>;
    fn splice_append(&mut self, parent: ElementHandle, fragment: ElementHandle) -> BackendResult<()>;
    fn splice_remove(
        &mut self,
        parent: ElementHandle,
        start: ElementHandle,
        delete_count: usize,
    ) -> BackendResult<()>;

    // --- Node properties ---

    fn set_id(&mut self, element: ElementHandle, id: &str) -> BackendResult<()>;
    fn set_style(&mut self, element: ElementHandle, style: &str) -> BackendResult<()>;
    fn add_class(&mut self, element: ElementHandle, class: &str) -> BackendResult<()>;
    fn remove_class(&mut self, element: ElementHandle, class: &str) -> BackendResult<()>;
    fn clear_classes(&mut self, element: ElementHandle) -> BackendResult<()>;
    fn set_attribute(&mut self, element: ElementHandle, name: &str, value: &str)
        -> BackendResult<()>;
    fn remove_attribute(&mut self, element: ElementHandle, name: &str) -> BackendResult<()>;
    fn set_text(&mut self, element: ElementHandle, text: &str) -> BackendResult<()>;

    fn set_slot_name(&mut self, element: ElementHandle, name: &str) -> BackendResult<()> {
        let _ = (element, name);
        Err(BackendError::Unsupported(self.mode()))
    }

    fn set_containing_slot(
        &mut self,
        element: ElementHandle,
        slot: Option<ElementHandle>,
    ) -> BackendResult<()> {
        let _ = (element, slot);
        Err(BackendError::Unsupported(self.mode()))
    }

    fn reassign_containing_slot(
        &mut self,
        element: ElementHandle,
        old_slot: Option<ElementHandle>,
        new_slot: Option<ElementHandle>,
    ) -> BackendResult<()> {
        let _ = (element, old_slot, new_slot);
        Err(BackendError::Unsupported(self.mode()))
    }

    // --- Asynchronous queries ---

    fn get_bounding_client_rect(
        &mut self,
        element: ElementHandle,
        callback: Box<dyn FnOnce(BoundingClientRect)>,
    ) -> BackendResult<()>;
    fn get_scroll_offset(
        &mut self,
        element: ElementHandle,
        callback: Box<dyn FnOnce(ScrollOffset)>,
    ) -> BackendResult<()>;
    fn create_intersection_observer(
        &mut self,
        element: ElementHandle,
        init: IntersectionInit,
        callback: Box<dyn FnMut(IntersectionStatus)>,
    ) -> BackendResult<ObserverHandle>;
    fn create_media_query_observer(
        &mut self,
        status: MediaQueryStatus,
        callback: Box<dyn FnMut(bool)>,
    ) -> BackendResult<ObserverHandle>;
    fn disconnect_observer(&mut self, handle: ObserverHandle) -> BackendResult<()>;
    fn get_context(
        &mut self,
        element: ElementHandle,
        callback: Box<dyn FnOnce(Option<ContextHandle>)>,
    ) -> BackendResult<()>;

    // --- Events and rendering ---

    /// Register the global event sink, replacing any previous one
    fn on_event(&mut self, sink: EventSink);

    /// Schedule a paint; `callback` runs exactly once after the pass completes
    fn render(&mut self, callback: Box<dyn FnOnce()>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersection() {
        let a = BoundingClientRect::new(0.0, 0.0, 100.0, 100.0);
        let b = BoundingClientRect::new(50.0, 50.0, 100.0, 100.0);
        let i = a.intersection(&b);
        assert_eq!(i, BoundingClientRect::new(50.0, 50.0, 50.0, 50.0));
        assert_eq!(i.area(), 2500.0);

        let far = BoundingClientRect::new(500.0, 500.0, 10.0, 10.0);
        assert_eq!(a.intersection(&far).area(), 0.0);
    }

    #[test]
    fn test_media_query_matching() {
        let status = MediaQueryStatus {
            min_width: Some(300.0),
            orientation: Some(Orientation::Portrait),
            ..Default::default()
        };
        assert!(status.matches(375.0, 667.0));
        assert!(!status.matches(200.0, 667.0));
        assert!(!status.matches(800.0, 600.0));
        assert!(MediaQueryStatus::default().matches(1.0, 1.0));
    }
}
