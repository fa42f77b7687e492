//! Element iterator
//!
//! A cursor over ancestors or descendants of a node, in the shadow tree or
//! in the composed tree (virtual nodes kept). After a node is yielded the
//! consumer may call [`ElementIterator::prune_and_advance`] instead of
//! [`ElementIterator::advance`] to skip the subtree of that node.

use crate::composed::ComposedView;
use crate::error::TreeResult;
use crate::node::NodeType;
use crate::tree::Tree;
use crate::NodeId;

/// Traversal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterationKind {
    ShadowAncestors,
    ComposedAncestors,
    ShadowDescendantsRootFirst,
    ShadowDescendantsRootLast,
    ComposedDescendantsRootFirst,
    ComposedDescendantsRootLast,
}

impl IterationKind {
    fn is_composed(self) -> bool {
        matches!(
            self,
            Self::ComposedAncestors | Self::ComposedDescendantsRootFirst | Self::ComposedDescendantsRootLast
        )
    }
}

/// Node kinds an iterator yields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindFilter(u8);

impl KindFilter {
    pub const NATIVE_NODE: Self = Self(1 << 0);
    pub const VIRTUAL_NODE: Self = Self(1 << 1);
    pub const COMPONENT: Self = Self(1 << 2);
    pub const SHADOW_ROOT: Self = Self(1 << 3);
    pub const TEXT_NODE: Self = Self(1 << 4);
    pub const FRAGMENT: Self = Self(1 << 5);
    /// Every kind carrying element data
    pub const ELEMENT: Self = Self(0b0000_1111);
    pub const ALL: Self = Self(0b0011_1111);

    pub fn of(node_type: NodeType) -> Self {
        match node_type {
            NodeType::NativeNode => Self::NATIVE_NODE,
            NodeType::VirtualNode => Self::VIRTUAL_NODE,
            NodeType::Component => Self::COMPONENT,
            NodeType::ShadowRoot => Self::SHADOW_ROOT,
            NodeType::TextNode => Self::TEXT_NODE,
            NodeType::Fragment => Self::FRAGMENT,
        }
    }

    pub fn includes(self, node_type: NodeType) -> bool {
        self.0 & Self::of(node_type).0 != 0
    }

    pub fn or(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn and(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl Default for KindFilter {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone)]
enum CursorState {
    Ancestors {
        next: Option<NodeId>,
    },
    RootFirst {
        stack: Vec<NodeId>,
        /// Last yielded node, expanded on the next advance unless pruned
        pending: Option<NodeId>,
    },
    RootLast {
        /// Nodes with a flag telling whether their children were pushed
        stack: Vec<(NodeId, bool)>,
    },
}

/// Restartable traversal cursor
#[derive(Debug, Clone)]
pub struct ElementIterator {
    start: NodeId,
    kind: IterationKind,
    filter: KindFilter,
    state: CursorState,
}

impl ElementIterator {
    pub fn new(tree: &Tree, start: NodeId, kind: IterationKind, filter: KindFilter) -> TreeResult<Self> {
        tree.node(start)?;
        Ok(Self {
            start,
            kind,
            filter,
            state: Self::initial_state(start, kind),
        })
    }

    fn initial_state(start: NodeId, kind: IterationKind) -> CursorState {
        match kind {
            IterationKind::ShadowAncestors | IterationKind::ComposedAncestors => {
                CursorState::Ancestors { next: Some(start) }
            }
            IterationKind::ShadowDescendantsRootFirst | IterationKind::ComposedDescendantsRootFirst => {
                CursorState::RootFirst {
                    stack: vec![start],
                    pending: None,
                }
            }
            IterationKind::ShadowDescendantsRootLast | IterationKind::ComposedDescendantsRootLast => {
                CursorState::RootLast {
                    stack: vec![(start, false)],
                }
            }
        }
    }

    pub fn kind(&self) -> IterationKind {
        self.kind
    }

    /// Restart from the start node
    pub fn reset(&mut self) {
        self.state = Self::initial_state(self.start, self.kind);
    }

    fn children(&self, tree: &Tree, id: NodeId) -> Vec<NodeId> {
        if self.kind.is_composed() {
            tree.composed_children(id, ComposedView::WithVirtual)
        } else {
            tree.get(id).map(|n| n.children.clone()).unwrap_or_default()
        }
    }

    fn parent(&self, tree: &Tree, id: NodeId) -> Option<NodeId> {
        if self.kind.is_composed() {
            tree.composed_parent_in(id, ComposedView::WithVirtual)
        } else {
            tree.get(id)?.parent
        }
    }

    fn accepts(&self, tree: &Tree, id: NodeId) -> bool {
        tree.get(id).is_some_and(|n| self.filter.includes(n.node_type()))
    }

    /// Next node
    pub fn advance(&mut self, tree: &Tree) -> Option<NodeId> {
        self.step(tree, false)
    }

    /// Next node, skipping the subtree of the last yielded one
    ///
    /// Ancestor iteration ends; in root-last order the subtree has already
    /// been yielded, so this is the same as [`ElementIterator::advance`].
    pub fn prune_and_advance(&mut self, tree: &Tree) -> Option<NodeId> {
        self.step(tree, true)
    }

    fn step(&mut self, tree: &Tree, prune: bool) -> Option<NodeId> {
        let mut state = std::mem::replace(&mut self.state, CursorState::Ancestors { next: None });
        let found = match &mut state {
            CursorState::Ancestors { next } => {
                if prune {
                    *next = None;
                }
                let mut found = None;
                while let Some(current) = next.take() {
                    *next = self.parent(tree, current);
                    if self.accepts(tree, current) {
                        found = Some(current);
                        break;
                    }
                }
                found
            }
            CursorState::RootFirst { stack, pending } => {
                if let Some(last) = pending.take() {
                    if !prune {
                        stack.extend(self.children(tree, last).into_iter().rev());
                    }
                }
                let mut found = None;
                while let Some(current) = stack.pop() {
                    if !tree.contains(current) {
                        continue;
                    }
                    if self.accepts(tree, current) {
                        *pending = Some(current);
                        found = Some(current);
                        break;
                    }
                    stack.extend(self.children(tree, current).into_iter().rev());
                }
                found
            }
            CursorState::RootLast { stack } => {
                let mut found = None;
                while let Some((current, expanded)) = stack.pop() {
                    if !tree.contains(current) {
                        continue;
                    }
                    if !expanded {
                        stack.push((current, true));
                        stack.extend(self.children(tree, current).into_iter().rev().map(|c| (c, false)));
                        continue;
                    }
                    if self.accepts(tree, current) {
                        found = Some(current);
                        break;
                    }
                }
                found
            }
        };
        self.state = state;
        found
    }
}

/// [`ElementIterator`] bound to a tree as a standard iterator
pub struct ElementIter<'a> {
    tree: &'a Tree,
    cursor: ElementIterator,
}

impl ElementIter<'_> {
    /// Skip the subtree of the last yielded node
    pub fn prune(&mut self) -> Option<NodeId> {
        self.cursor.prune_and_advance(self.tree)
    }
}

impl Iterator for ElementIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        self.cursor.advance(self.tree)
    }
}

impl Tree {
    pub fn iter_elements(
        &self,
        start: NodeId,
        kind: IterationKind,
        filter: KindFilter,
    ) -> TreeResult<ElementIter<'_>> {
        Ok(ElementIter {
            tree: self,
            cursor: ElementIterator::new(self, start, kind, filter)?,
        })
    }
}
