//! Event propagation
//!
//! An event travels along a path computed once before delivery: the origin,
//! then repeatedly its containing slot, shadow parent or (for a shadow root)
//! host. Non-composed events stop at the shadow root of the origin's own
//! shadow tree. Capture listeners run outermost first, then non-capture
//! listeners from the origin outwards. The `target` seen by each listener
//! is retargeted into the listener's shadow tree.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ErrorKind, ErrorOrigin};
use crate::error::TreeResult;
use crate::node::NodeData;
use crate::tree::Tree;
use crate::NodeId;

/// Propagation flags of an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventOptions {
    pub bubbles: bool,
    /// Cross shadow boundaries
    pub composed: bool,
    /// Run a capture phase before bubbling
    pub capture_phase: bool,
}

/// Phase of the current delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventPhase {
    #[default]
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

/// Event being dispatched
#[derive(Debug, Clone)]
pub struct Event {
    name: String,
    detail: Value,
    options: EventOptions,
    target: Option<NodeId>,
    current_target: Option<NodeId>,
    phase: EventPhase,
    marks: BTreeMap<String, Value>,
    mutated: bool,
}

impl Event {
    pub fn new(name: &str, detail: Value, options: EventOptions) -> Self {
        Self {
            name: name.to_string(),
            detail,
            options,
            target: None,
            current_target: None,
            phase: EventPhase::None,
            marks: BTreeMap::new(),
            mutated: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    pub fn options(&self) -> EventOptions {
        self.options
    }

    /// Origin retargeted into the shadow tree of the current node
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    pub fn current_target(&self) -> Option<NodeId> {
        self.current_target
    }

    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    /// Marks merged along the path
    pub fn marks(&self) -> &BTreeMap<String, Value> {
        &self.marks
    }

    pub fn mark(&self, name: &str) -> Option<&Value> {
        self.marks.get(name)
    }

    /// Flag the event as handled; `mutated` listeners run from now on
    pub fn mark_mutated(&mut self) {
        self.mutated = true;
    }

    pub fn is_mutated(&self) -> bool {
        self.mutated
    }
}

/// Listener verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    /// Stop once the listeners of the current node have run
    Stop,
}

/// Listener registration options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    pub capture: bool,
    /// Stop propagation after this listener's node
    pub catch: bool,
    /// Only run once a listener has called [`Event::mark_mutated`]
    pub mutated: bool,
}

pub type EventHandler = Rc<dyn Fn(&mut Tree, &mut Event) -> anyhow::Result<Propagation>>;

/// Event listener id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

#[derive(Clone)]
pub(crate) struct ListenerEntry {
    pub(crate) id: ListenerId,
    pub(crate) name: String,
    pub(crate) options: ListenerOptions,
    pub(crate) handler: EventHandler,
}

impl fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("options", &self.options)
            .finish()
    }
}

impl Tree {
    pub fn add_listener(
        &mut self,
        id: NodeId,
        name: &str,
        options: ListenerOptions,
        handler: impl Fn(&mut Tree, &mut Event) -> anyhow::Result<Propagation> + 'static,
    ) -> TreeResult<ListenerId> {
        let listener = ListenerId(self.next_listener_id());
        self.node_mut(id)?.listeners.push(ListenerEntry {
            id: listener,
            name: name.to_string(),
            options,
            handler: Rc::new(handler),
        });
        Ok(listener)
    }

    /// Returns whether the listener was registered on `id`
    pub fn remove_listener(&mut self, id: NodeId, listener: ListenerId) -> TreeResult<bool> {
        let node = self.node_mut(id)?;
        let before = node.listeners.len();
        node.listeners.retain(|l| l.id != listener);
        Ok(node.listeners.len() != before)
    }

    pub(crate) fn event_path(&self, origin: NodeId, composed: bool) -> Vec<NodeId> {
        let boundary = self.scope_of(origin);
        let mut path = vec![origin];
        let mut current = origin;
        while composed || Some(current) != boundary {
            let Some(next) = self.propagation_parent(current) else {
                break;
            };
            path.push(next);
            current = next;
        }
        path
    }

    /// Whether `outer` is `inner` or a shadow-including ancestor scope of it
    fn scope_encloses(&self, outer: Option<NodeId>, inner: Option<NodeId>) -> bool {
        let mut current = inner;
        while let Some(scope) = current {
            if Some(scope) == outer {
                return true;
            }
            current = self.host_of(scope).and_then(|h| self.scope_of(h));
        }
        false
    }

    /// `origin` as seen from the shadow tree of `node`
    pub(crate) fn retarget(&self, origin: NodeId, node: NodeId) -> NodeId {
        let node_scope = self.scope_of(node);
        let mut target = origin;
        let mut crossed = false;
        while !self.scope_encloses(self.scope_of(target), node_scope) {
            match self.scope_of(target).and_then(|s| self.host_of(s)) {
                Some(host) => {
                    target = host;
                    crossed = true;
                }
                None => break,
            }
        }
        if !crossed {
            return target;
        }
        while let Some(n) = self.get(target) {
            if !n.is_virtual() {
                break;
            }
            match n.parent {
                Some(parent) => target = parent,
                None => break,
            }
        }
        target
    }

    fn merge_marks(&self, path: &[NodeId], event: &mut Event) {
        for &n in path.iter().rev() {
            if let Some(element) = self.get(n).and_then(|n| n.data.element()) {
                for (key, value) in &element.marks {
                    event.marks.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Run the listeners of one node. Returns whether propagation stops.
    fn deliver(&mut self, node: NodeId, capture: bool, origin: NodeId, event: &mut Event) -> TreeResult<bool> {
        let Some(listeners) = self.get(node).map(|n| n.listeners_for(&event.name, capture)) else {
            return Ok(false);
        };
        if listeners.is_empty() {
            return Ok(false);
        }
        let target = self.retarget(origin, node);
        event.target = Some(target);
        event.current_target = Some(node);
        event.phase = match (target == node, capture) {
            (true, _) => EventPhase::AtTarget,
            (false, true) => EventPhase::Capturing,
            (false, false) => EventPhase::Bubbling,
        };

        let mut stop = false;
        for listener in listeners {
            if !self.get(node).is_some_and(|n| n.has_listener(listener.id)) {
                continue;
            }
            if listener.options.mutated && !event.mutated {
                continue;
            }
            match (listener.handler)(self, event) {
                Ok(Propagation::Continue) => {}
                Ok(Propagation::Stop) => stop = true,
                Err(error) => {
                    let origin = ErrorOrigin::new(ErrorKind::Listener, Some(node), event.name.clone());
                    self.context.dispatch_error(error, origin)?;
                    stop = true;
                }
            }
            if listener.options.catch {
                stop = true;
            }
        }
        Ok(stop)
    }

    /// Dispatch `event` from `origin`
    pub fn dispatch_event(&mut self, origin: NodeId, event: &mut Event) -> TreeResult<()> {
        self.node(origin)?;
        let options = event.options;
        let path = self.event_path(origin, options.composed);
        self.merge_marks(&path, event);
        tracing::trace!("Dispatching `{}` from {:?} over {} nodes", event.name, origin, path.len());

        let mut stopped = false;
        if options.capture_phase {
            for &n in path.iter().rev() {
                if self.deliver(n, true, origin, event)? {
                    stopped = true;
                    break;
                }
            }
        }
        if !stopped {
            for &n in &path {
                if !options.bubbles && self.retarget(origin, n) != n {
                    continue;
                }
                if self.deliver(n, false, origin, event)? {
                    break;
                }
            }
        }
        event.current_target = None;
        event.phase = EventPhase::None;
        Ok(())
    }

    /// Create and dispatch an event, returning it after delivery
    pub fn trigger_event(
        &mut self,
        origin: NodeId,
        name: &str,
        detail: Value,
        options: EventOptions,
    ) -> TreeResult<Event> {
        let mut event = Event::new(name, detail, options);
        self.dispatch_event(origin, &mut event)?;
        Ok(event)
    }

    /// Dispatch the events the backend pushed since the last call
    pub fn pump_backend_events(&mut self) -> TreeResult<usize> {
        let mut dispatched = 0;
        loop {
            let Some(raw) = self.inbox.borrow_mut().pop_front() else {
                break;
            };
            let Some(&origin) = self.backend_index.get(&raw.target) else {
                tracing::trace!("Dropping `{}` for unknown element {:?}", raw.name, raw.target);
                continue;
            };
            let origin = match self.node(origin)?.data {
                NodeData::ShadowRoot { host: Some(host), .. } => host,
                _ => origin,
            };
            let options = EventOptions {
                bubbles: raw.bubbles,
                composed: raw.composed,
                capture_phase: raw.capture_phase,
            };
            self.trigger_event(origin, &raw.name, raw.detail, options)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }
}
