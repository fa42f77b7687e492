//! shade DOM - component shadow tree core
//!
//! Arena-backed node tree for component based UIs. Every component owns a
//! shadow root; the composed tree (slot projection, virtual node elision) is
//! computed on demand from the shadow tree and a per-host slot table.
//!
//! On top of the tree:
//! - backend association (elements mirrored into a [`shade_backend::BackendContext`])
//! - attachment lifecycle and component lifetimes
//! - event propagation across shadow boundaries
//! - relation linking between component definitions
//! - element iterators and mutation observers

mod backend;
mod composed;
mod config;
mod context;
mod definition;
mod error;
mod event;
mod iterator;
mod lifecycle;
mod mutation;
mod node;
mod observer;
mod properties;
mod relation;
mod slots;
mod tree;

pub use config::GlobalOptions;
pub use context::{ErrorKind, ErrorOrigin, GlobalContext, ListenerHandle};
pub use definition::{
    ComponentDefinition, ComponentOptions, Lifetime, LifetimeCallback, PageLifetimeCallback,
    SlotMode,
};
pub use error::{TreeError, TreeResult};
pub use event::{
    Event, EventHandler, EventOptions, EventPhase, ListenerId, ListenerOptions, Propagation,
};
pub use iterator::{ElementIter, ElementIterator, IterationKind, KindFilter};
pub use lifecycle::LifetimeListenerId;
pub use node::NodeType;
pub use observer::{
    AttachStatus, MutationKind, MutationObserverOptions, MutationRecord, NameType,
    ObserverCallback, ObserverId,
};
pub use relation::{
    LinkFailedCallback, RelationCallback, RelationDefinition, RelationTarget, RelationType,
};
pub use tree::Tree;

pub use shade_backend::{BackendMode, ElementHandle};

/// Node identifier (generational index into the tree arena)
///
/// A released node's id stays invalid even after its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Arena slot
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}
