//! Process-wide context
//!
//! Holds the global options and the error / warning listener registries.
//! A tree keeps an `Rc<GlobalContext>`; several trees may share one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::config::GlobalOptions;
use crate::error::{TreeError, TreeResult};
use crate::NodeId;

/// Kind of user code that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Listener,
    Lifetime,
    PageLifetime,
    Relation,
    Observer,
}

/// Where a user-code error was raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorOrigin {
    pub kind: ErrorKind,
    pub node: Option<NodeId>,
    /// Event, lifetime or relation name
    pub name: String,
}

impl ErrorOrigin {
    pub fn new(kind: ErrorKind, node: Option<NodeId>, name: impl Into<String>) -> Self {
        Self {
            kind,
            node,
            name: name.into(),
        }
    }
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Some(node) => write!(
                f,
                "{:?} `{}` on node {}:{}",
                self.kind, self.name, node.index, node.generation
            ),
            None => write!(f, "{:?} `{}`", self.kind, self.name),
        }
    }
}

/// Registration handle of an error or warning listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u32);

type ErrorListener = Rc<dyn Fn(&anyhow::Error, &ErrorOrigin) -> bool>;
type WarningListener = Rc<dyn Fn(&str) -> bool>;

/// Global options plus error and warning channels
pub struct GlobalContext {
    options: RefCell<GlobalOptions>,
    error_listeners: RefCell<Vec<(ListenerHandle, ErrorListener)>>,
    warning_listeners: RefCell<Vec<(ListenerHandle, WarningListener)>>,
    next_handle: Cell<u32>,
}

impl GlobalContext {
    pub fn new() -> Self {
        Self::with_options(GlobalOptions::default())
    }

    pub fn with_options(options: GlobalOptions) -> Self {
        Self {
            options: RefCell::new(options),
            error_listeners: RefCell::new(Vec::new()),
            warning_listeners: RefCell::new(Vec::new()),
            next_handle: Cell::new(1),
        }
    }

    /// Current options
    pub fn options(&self) -> GlobalOptions {
        self.options.borrow().clone()
    }

    pub fn set_options(&self, options: GlobalOptions) {
        *self.options.borrow_mut() = options;
    }

    /// Modify options in place
    pub fn update_options(&self, f: impl FnOnce(&mut GlobalOptions)) {
        f(&mut self.options.borrow_mut());
    }

    fn next_handle(&self) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        handle
    }

    /// Add an error listener. Returning `false` suppresses forwarding to
    /// later listeners and to the caller.
    pub fn add_error_listener(
        &self,
        listener: impl Fn(&anyhow::Error, &ErrorOrigin) -> bool + 'static,
    ) -> ListenerHandle {
        let handle = self.next_handle();
        self.error_listeners
            .borrow_mut()
            .push((handle, Rc::new(listener)));
        handle
    }

    pub fn remove_error_listener(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.error_listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(h, _)| *h != handle);
        listeners.len() != before
    }

    /// Add a warning listener. Returning `false` stops later listeners.
    pub fn add_warning_listener(&self, listener: impl Fn(&str) -> bool + 'static) -> ListenerHandle {
        let handle = self.next_handle();
        self.warning_listeners
            .borrow_mut()
            .push((handle, Rc::new(listener)));
        handle
    }

    pub fn remove_warning_listener(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.warning_listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(h, _)| *h != handle);
        listeners.len() != before
    }

    /// Report a user-code error
    ///
    /// Returns the error back as [`TreeError::UserCode`] only when
    /// `throw_global_error` is set and no listener suppressed it.
    pub fn dispatch_error(&self, error: anyhow::Error, origin: ErrorOrigin) -> TreeResult<()> {
        tracing::error!("{}: {:#}", origin, error);
        let listeners: Vec<ErrorListener> = self
            .error_listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            if !listener(&error, &origin) {
                return Ok(());
            }
        }
        if self.options.borrow().throw_global_error {
            return Err(TreeError::UserCode { origin, error });
        }
        Ok(())
    }

    /// Report a non-fatal warning
    pub fn dispatch_warning(&self, message: &str) {
        tracing::warn!("{}", message);
        let listeners: Vec<WarningListener> = self
            .warning_listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            if !listener(message) {
                break;
            }
        }
    }
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GlobalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalContext")
            .field("options", &self.options.borrow())
            .field("error_listeners", &self.error_listeners.borrow().len())
            .field("warning_listeners", &self.warning_listeners.borrow().len())
            .finish()
    }
}
