//! Component definitions
//!
//! The static metadata a component contributes to the core: identity,
//! behaviors, options, lifetimes, page lifetimes and relations.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TreeError, TreeResult};
use crate::relation::RelationDefinition;
use crate::tree::Tree;
use crate::NodeId;

/// How host content is routed to slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotMode {
    /// All content goes to the first slot
    #[default]
    Single,
    /// Content `slot` is matched against slot names
    Multiple,
    /// Like `Multiple`, plus runtime reassignment via `assign_slot`
    Dynamic,
}

/// Component options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentOptions {
    /// The component contributes no composed node of its own
    pub virtual_host: bool,
    pub slot_mode: SlotMode,
    pub external_classes: Vec<String>,
    pub style_scope: Option<String>,
}

/// Component lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    Created,
    Attached,
    Moved,
    Detached,
}

impl Lifetime {
    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Attached => "attached",
            Self::Moved => "moved",
            Self::Detached => "detached",
        }
    }
}

/// Lifetime callback, called with the component node
pub type LifetimeCallback = Rc<dyn Fn(&mut Tree, NodeId) -> anyhow::Result<()>>;

/// Page lifetime callback, called with the component node and the detail
pub type PageLifetimeCallback = Rc<dyn Fn(&mut Tree, NodeId, &Value) -> anyhow::Result<()>>;

/// Component definition
pub struct ComponentDefinition {
    is: String,
    behaviors: Vec<String>,
    options: ComponentOptions,
    lifetimes: Vec<(Lifetime, LifetimeCallback)>,
    page_lifetimes: Vec<(String, PageLifetimeCallback)>,
    relations: Vec<RelationDefinition>,
}

impl ComponentDefinition {
    /// Start a definition identified by `is`
    pub fn new(is: &str) -> Self {
        Self {
            is: is.to_string(),
            behaviors: Vec::new(),
            options: ComponentOptions::default(),
            lifetimes: Vec::new(),
            page_lifetimes: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn behavior(mut self, name: &str) -> Self {
        if !self.behaviors.iter().any(|b| b == name) {
            self.behaviors.push(name.to_string());
        }
        self
    }

    pub fn options(mut self, options: ComponentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn lifetime(
        mut self,
        lifetime: Lifetime,
        callback: impl Fn(&mut Tree, NodeId) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.lifetimes.push((lifetime, Rc::new(callback)));
        self
    }

    pub fn page_lifetime(
        mut self,
        name: &str,
        callback: impl Fn(&mut Tree, NodeId, &Value) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.page_lifetimes
            .push((name.to_string(), Rc::new(callback)));
        self
    }

    /// Declare a relation. Names are unique within a definition.
    pub fn relation(mut self, relation: RelationDefinition) -> TreeResult<Self> {
        if self.relations.iter().any(|r| r.name() == relation.name()) {
            return Err(TreeError::RelationDeclaredTwice(relation.name().to_string()));
        }
        self.relations.push(relation);
        Ok(self)
    }

    pub fn build(self) -> Rc<Self> {
        Rc::new(self)
    }

    pub fn is(&self) -> &str {
        &self.is
    }

    pub fn behaviors(&self) -> &[String] {
        &self.behaviors
    }

    pub fn has_behavior(&self, name: &str) -> bool {
        self.behaviors.iter().any(|b| b == name)
    }

    pub fn component_options(&self) -> &ComponentOptions {
        &self.options
    }

    pub fn relations(&self) -> &[RelationDefinition] {
        &self.relations
    }

    pub fn relation_named(&self, name: &str) -> Option<&RelationDefinition> {
        self.relations.iter().find(|r| r.name() == name)
    }

    pub(crate) fn lifetime_callbacks(&self, lifetime: Lifetime) -> Vec<LifetimeCallback> {
        self.lifetimes
            .iter()
            .filter(|(l, _)| *l == lifetime)
            .map(|(_, cb)| cb.clone())
            .collect()
    }

    pub(crate) fn page_lifetime_callbacks(&self, name: &str) -> Vec<PageLifetimeCallback> {
        self.page_lifetimes
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, cb)| cb.clone())
            .collect()
    }
}

impl std::fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("is", &self.is)
            .field("behaviors", &self.behaviors)
            .field("options", &self.options)
            .field("relations", &self.relations.len())
            .finish()
    }
}
