//! Attachment lifecycle
//!
//! A subtree is attached, detached or moved as a whole. Nodes are visited
//! in composed pre-order (component before its shadow root, slot content
//! at its slot); nodes outside the composed tree follow in shadow order.

use std::collections::HashSet;
use std::rc::Rc;

use serde_json::Value;

use crate::backend::DirtySet;
use crate::composed::ComposedView;
use crate::context::{ErrorKind, ErrorOrigin};
use crate::definition::{Lifetime, LifetimeCallback};
use crate::error::{DeferredError, TreeError, TreeResult};
use crate::observer::{AttachStatus, MutationRecord};
use crate::relation::RelationCause;
use crate::tree::Tree;
use crate::NodeId;

/// Dynamic lifetime listener id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LifetimeListenerId(u32);

#[derive(Clone)]
pub(crate) struct LifetimeListenerEntry {
    pub(crate) id: LifetimeListenerId,
    pub(crate) lifetime: Lifetime,
    pub(crate) callback: LifetimeCallback,
}

impl Tree {
    pub(crate) fn attach_order(&self, id: NodeId) -> Vec<NodeId> {
        let subtree = self.shadow_subtree(id);
        let members: HashSet<NodeId> = subtree.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(subtree.len());
        self.composed_preorder(id, &members, &mut seen, &mut order);
        for n in subtree {
            if seen.insert(n) {
                order.push(n);
            }
        }
        order
    }

    fn composed_preorder(
        &self,
        id: NodeId,
        members: &HashSet<NodeId>,
        seen: &mut HashSet<NodeId>,
        order: &mut Vec<NodeId>,
    ) {
        if !members.contains(&id) || !seen.insert(id) {
            return;
        }
        order.push(id);
        if let Some(data) = self.get(id).and_then(|n| n.data.component()) {
            if seen.insert(data.shadow_root) {
                order.push(data.shadow_root);
            }
        }
        self.walk_composed(id, ComposedView::WithVirtual, &mut |c| {
            self.composed_preorder(c, members, seen, order);
            true
        });
    }

    /// Mark a subtree attached and fire attach notifications
    pub fn pretend_attached(&mut self, id: NodeId) -> TreeResult<()> {
        if self.node(id)?.attached {
            return Ok(());
        }
        self.attach_subtree(id)
    }

    /// Mark a subtree detached and fire detach notifications
    pub fn pretend_detached(&mut self, id: NodeId) -> TreeResult<()> {
        if !self.node(id)?.attached {
            return Ok(());
        }
        self.detach_subtree(id)
    }

    pub(crate) fn attach_subtree(&mut self, id: NodeId) -> TreeResult<()> {
        let order = self.attach_order(id);

        let mut dirty = DirtySet::default();
        for &n in &order {
            self.recreate_backend_element(n, &mut dirty)?;
        }
        self.sync_dirty(dirty)?;

        for &n in &order {
            self.node_mut(n)?.attached = true;
        }
        tracing::debug!("Attached {:?} ({} nodes)", id, order.len());

        let mut deferred = DeferredError::default();
        for &n in &order {
            if !self.get(n).is_some_and(|node| node.attached) {
                continue;
            }
            if self.node(n)?.data.component().is_some() {
                let linked = self.resolve_node_relations(n, RelationCause::Attach);
                deferred.check(linked)?;
            }
            let called = self.call_lifetime(n, Lifetime::Attached);
            deferred.check(called)?;
            let notified = self.notify(MutationRecord::attach_status(n, AttachStatus::Attached));
            deferred.check(notified)?;
        }
        deferred.finish()
    }

    pub(crate) fn detach_subtree(&mut self, id: NodeId) -> TreeResult<()> {
        let order = self.attach_order(id);
        for &n in &order {
            self.node_mut(n)?.attached = false;
        }
        tracing::debug!("Detached {:?} ({} nodes)", id, order.len());

        let mut deferred = DeferredError::default();
        for &n in order.iter().rev() {
            let unlinked = self.unlink_lower(n);
            deferred.check(unlinked)?;
        }
        for &n in &order {
            if self.get(n).is_none_or(|node| node.attached) {
                continue;
            }
            let called = self.call_lifetime(n, Lifetime::Detached);
            deferred.check(called)?;
            let notified = self.notify(MutationRecord::attach_status(n, AttachStatus::Detached));
            deferred.check(notified)?;
        }
        for &n in &order {
            if self.get(n).is_some_and(|node| !node.attached && node.destroy_backend_on_detach) {
                self.destroy_backend_element(n)?;
            }
        }
        deferred.finish()
    }

    /// An attached subtree changed position inside an attached tree
    pub(crate) fn move_subtree(&mut self, id: NodeId) -> TreeResult<()> {
        let mut deferred = DeferredError::default();
        for n in self.attach_order(id) {
            if !self.get(n).is_some_and(|node| node.attached) {
                continue;
            }
            if self.node(n)?.data.component().is_some() {
                let linked = self.resolve_node_relations(n, RelationCause::Move);
                deferred.check(linked)?;
                let called = self.call_lifetime(n, Lifetime::Moved);
                deferred.check(called)?;
            }
        }
        deferred.finish()
    }

    /// Run definition callbacks then dynamic listeners of `lifetime`
    pub(crate) fn call_lifetime(&mut self, id: NodeId, lifetime: Lifetime) -> TreeResult<()> {
        let node = self.node(id)?;
        let mut callbacks = node
            .data
            .component()
            .map(|data| data.definition.lifetime_callbacks(lifetime))
            .unwrap_or_default();
        callbacks.extend(
            node.lifetime_listeners
                .iter()
                .filter(|l| l.lifetime == lifetime)
                .map(|l| l.callback.clone()),
        );
        if callbacks.is_empty() {
            return Ok(());
        }

        let previous = self.node_mut(id)?.executing_lifetime.replace(lifetime);
        let mut deferred = DeferredError::default();
        let mut result = Ok(());
        for callback in callbacks {
            if let Err(error) = callback(self, id) {
                let origin = ErrorOrigin::new(ErrorKind::Lifetime, Some(id), lifetime.name());
                let dispatched = self.context.dispatch_error(error, origin);
                result = deferred.check(dispatched);
                if result.is_err() {
                    break;
                }
            }
        }
        if let Some(node) = self.get_mut(id) {
            node.executing_lifetime = previous;
        }
        result.and(deferred.finish())
    }

    fn check_lifetime_phase(&self, id: NodeId, requested: Lifetime) -> TreeResult<()> {
        match self.node(id)?.executing_lifetime {
            Some(executing) if executing != requested => Err(TreeError::ListenerPhaseConflict {
                node: id,
                executing,
                requested,
            }),
            _ => Ok(()),
        }
    }

    /// Listen to a lifetime of a single node
    pub fn add_lifetime_listener(
        &mut self,
        id: NodeId,
        lifetime: Lifetime,
        callback: impl Fn(&mut Tree, NodeId) -> anyhow::Result<()> + 'static,
    ) -> TreeResult<LifetimeListenerId> {
        self.check_lifetime_phase(id, lifetime)?;
        let listener = LifetimeListenerId(self.next_listener_id());
        self.node_mut(id)?.lifetime_listeners.push(LifetimeListenerEntry {
            id: listener,
            lifetime,
            callback: Rc::new(callback),
        });
        Ok(listener)
    }

    /// Returns whether the listener was registered
    pub fn remove_lifetime_listener(&mut self, id: NodeId, listener: LifetimeListenerId) -> TreeResult<bool> {
        let Some(lifetime) = self
            .node(id)?
            .lifetime_listeners
            .iter()
            .find(|l| l.id == listener)
            .map(|l| l.lifetime)
        else {
            return Ok(false);
        };
        self.check_lifetime_phase(id, lifetime)?;
        self.node_mut(id)?.lifetime_listeners.retain(|l| l.id != listener);
        Ok(true)
    }

    /// Call the page lifetime `name` on every component of the subtree
    pub fn trigger_page_lifetime(&mut self, id: NodeId, name: &str, detail: &Value) -> TreeResult<()> {
        let mut deferred = DeferredError::default();
        for n in self.attach_order(id) {
            let Some(data) = self.get(n).and_then(|node| node.data.component()) else {
                continue;
            };
            for callback in data.definition.page_lifetime_callbacks(name) {
                if let Err(error) = callback(self, n, detail) {
                    let origin = ErrorOrigin::new(ErrorKind::PageLifetime, Some(n), name);
                    let dispatched = self.context.dispatch_error(error, origin);
                    deferred.check(dispatched)?;
                }
            }
        }
        deferred.finish()
    }
}
