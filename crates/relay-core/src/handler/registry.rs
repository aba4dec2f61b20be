//! Handler registry for runtime handler lookup.
//!
//! Built once at start-up through [`HandlerRegistryBuilder`] and shared as
//! `Arc<HandlerRegistry>`; nothing mutates it afterwards.

use std::collections::HashMap;
use std::fmt;

use relay_types::workflow::HandlerKey;
use serde::Serialize;

use super::box_handler::{BoxActionHandler, BoxReactionHandler};
use super::{ActionHandler, ReactionHandler};

/// A registered handler, tagged with its capability.
pub enum Handler {
    Action(BoxActionHandler),
    Reaction(BoxReactionHandler),
}

impl Handler {
    pub fn action<T: ActionHandler + 'static>(handler: T) -> Self {
        Handler::Action(BoxActionHandler::new(handler))
    }

    pub fn reaction<T: ReactionHandler + 'static>(handler: T) -> Self {
        Handler::Reaction(BoxReactionHandler::new(handler))
    }

    pub fn kind(&self) -> HandlerKind {
        match self {
            Handler::Action(_) => HandlerKind::Action,
            Handler::Reaction(_) => HandlerKind::Reaction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    Action,
    Reaction,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Action => write!(f, "action"),
            HandlerKind::Reaction => write!(f, "reaction"),
        }
    }
}

/// One line of the handler catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogueEntry {
    pub service: String,
    pub operation: String,
    pub kind: HandlerKind,
}

/// Mutable registration phase of the registry.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    actions: HashMap<HandlerKey, BoxActionHandler>,
    reactions: HashMap<HandlerKey, BoxReactionHandler>,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `(service, operation)`.
    ///
    /// An action and a reaction may share a key. Registering the same
    /// capability twice under one key replaces the earlier handler.
    pub fn register(
        &mut self,
        service: impl Into<String>,
        operation: impl Into<String>,
        handler: Handler,
    ) -> &mut Self {
        let key = HandlerKey::new(service, operation);
        let replaced = match handler {
            Handler::Action(h) => self.actions.insert(key.clone(), h).is_some(),
            Handler::Reaction(h) => self.reactions.insert(key.clone(), h).is_some(),
        };
        if replaced {
            tracing::warn!(handler = %key, "handler registered twice, keeping the latest");
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        tracing::debug!(
            actions = self.actions.len(),
            reactions = self.reactions.len(),
            "handler registry built"
        );
        HandlerRegistry {
            actions: self.actions,
            reactions: self.reactions,
        }
    }
}

/// Read-only map from `(service, operation)` to handlers.
pub struct HandlerRegistry {
    actions: HashMap<HandlerKey, BoxActionHandler>,
    reactions: HashMap<HandlerKey, BoxReactionHandler>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    pub fn resolve_action(&self, service: &str, operation: &str) -> Option<&BoxActionHandler> {
        self.actions.get(&HandlerKey::new(service, operation))
    }

    pub fn resolve_reaction(&self, service: &str, operation: &str) -> Option<&BoxReactionHandler> {
        self.reactions.get(&HandlerKey::new(service, operation))
    }

    /// Every registered key, sorted by service, operation, then kind.
    pub fn catalogue(&self) -> Vec<CatalogueEntry> {
        let actions = self.actions.keys().map(|k| (k, HandlerKind::Action));
        let reactions = self.reactions.keys().map(|k| (k, HandlerKind::Reaction));
        let mut entries: Vec<CatalogueEntry> = actions
            .chain(reactions)
            .map(|(key, kind)| CatalogueEntry {
                service: key.service.clone(),
                operation: key.operation.clone(),
                kind,
            })
            .collect();
        entries.sort_by(|a, b| {
            (&a.service, &a.operation, a.kind).cmp(&(&b.service, &b.operation, b.kind))
        });
        entries
    }

    pub fn len(&self) -> usize {
        self.actions.len() + self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
