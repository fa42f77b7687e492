//! shade backend - rendering backend contract
//!
//! The element-level surface a component tree delegates to. Three backend
//! modes exist (DOM-like, shadow, composed); all of them implement the same
//! [`BackendContext`] trait so the tree core stays backend-agnostic.
//!
//! [`MemoryBackend`] implements the full contract in memory and records the
//! element tree it is asked to build.

mod context;
mod memory;
mod render;
mod style;

pub use context::{
    BackendContext, BackendResult, BoundingClientRect, ComponentInit, ContextHandle,
    EventSink, IntersectionInit, IntersectionStatus, MediaQueryStatus, ObserverHandle,
    Orientation, RawEvent, ScrollOffset,
};
pub use memory::{MemoryBackend, MemoryElement, MemoryElementKind};
pub use render::RenderQueue;
pub use style::{StyleScope, StyleSheetId, StyleSheetRegistry};

use serde::{Deserialize, Serialize};

/// Backend element handle (index into the backend's own element table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub u32);

/// Backend rendering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Elements mirror the composed tree with virtual nodes elided
    #[default]
    Domlike,
    /// Elements mirror the shadow tree, slots are resolved by the backend
    Shadow,
    /// Elements mirror the composed tree, virtual nodes included
    Composed,
}

impl BackendMode {
    /// Whether the backend can represent virtual nodes
    pub fn supports_virtual_nodes(self) -> bool {
        !matches!(self, Self::Domlike)
    }

    /// Whether backend child lists follow the shadow tree
    pub fn mirrors_shadow_tree(self) -> bool {
        matches!(self, Self::Shadow)
    }
}

/// Backend operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("operation is not supported by the {0:?} backend")]
    Unsupported(BackendMode),

    #[error("element {0:?} has been released")]
    ElementReleased(ElementHandle),

    #[error("element {child:?} is not a child of {parent:?}")]
    NotAChild {
        parent: ElementHandle,
        child: ElementHandle,
    },

    #[error("element {0:?} already has a parent")]
    AlreadyHasParent(ElementHandle),

    #[error("element {0:?} cannot hold children")]
    NotAContainer(ElementHandle),

    #[error("range {start}+{count} out of bounds for {len} children")]
    IndexOutOfRange { start: usize, count: usize, len: usize },

    #[error("element {0:?} is not a parentless fragment")]
    InvalidFragment(ElementHandle),

    #[error("unknown style scope {0:?}")]
    UnknownStyleScope(StyleScope),

    #[error("unknown style sheet `{0}`")]
    UnknownStyleSheet(String),

    #[error("backend destroyed while {0} elements are still alive")]
    LiveElements(usize),

    #[error("backend context has been destroyed")]
    Destroyed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_capabilities() {
        assert!(!BackendMode::Domlike.supports_virtual_nodes());
        assert!(BackendMode::Shadow.supports_virtual_nodes());
        assert!(BackendMode::Composed.supports_virtual_nodes());
        assert!(BackendMode::Shadow.mirrors_shadow_tree());
        assert!(!BackendMode::Composed.mirrors_shadow_tree());
    }

    #[test]
    fn test_mode_serde() {
        let json = serde_json::to_string(&BackendMode::Composed).unwrap();
        assert_eq!(json, "\"composed\"");
        let mode: BackendMode = serde_json::from_str("\"shadow\"").unwrap();
        assert_eq!(mode, BackendMode::Shadow);
    }
}
