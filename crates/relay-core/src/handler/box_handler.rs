//! Object-safe dynamic dispatch wrappers for the handler traits.
//!
//! Same blanket-impl pattern for both capabilities:
//! 1. An object-safe `*Dyn` trait with boxed futures
//! 2. Blanket impl of it for every `T` implementing the RPITIT trait
//! 3. A `Box*Handler` wrapping `Box<dyn *Dyn>` that delegates

use std::future::Future;
use std::pin::Pin;

use relay_types::error::HandlerError;

use super::{
    ActionContext, ActionHandler, ActionOutcome, ReactionContext, ReactionHandler,
    ReactionOutcome,
};

/// Object-safe version of [`ActionHandler`].
pub trait ActionHandlerDyn: Send + Sync {
    fn evaluate_boxed<'a>(
        &'a self,
        ctx: ActionContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<ActionOutcome, HandlerError>> + Send + 'a>>;
}

impl<T: ActionHandler> ActionHandlerDyn for T {
    fn evaluate_boxed<'a>(
        &'a self,
        ctx: ActionContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<ActionOutcome, HandlerError>> + Send + 'a>> {
        Box::pin(self.evaluate(ctx))
    }
}

/// Object-safe version of [`ReactionHandler`].
pub trait ReactionHandlerDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        ctx: ReactionContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<ReactionOutcome, HandlerError>> + Send + 'a>>;
}

impl<T: ReactionHandler> ReactionHandlerDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        ctx: ReactionContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<ReactionOutcome, HandlerError>> + Send + 'a>> {
        Box::pin(self.execute(ctx))
    }
}

/// Type-erased action handler stored in the registry.
pub struct BoxActionHandler {
    inner: Box<dyn ActionHandlerDyn + Send + Sync>,
}

impl BoxActionHandler {
    pub fn new<T: ActionHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    pub async fn evaluate(&self, ctx: ActionContext<'_>) -> Result<ActionOutcome, HandlerError> {
        self.inner.evaluate_boxed(ctx).await
    }
}

/// Type-erased reaction handler stored in the registry.
pub struct BoxReactionHandler {
    inner: Box<dyn ReactionHandlerDyn + Send + Sync>,
}

impl BoxReactionHandler {
    pub fn new<T: ReactionHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    pub async fn execute(
        &self,
        ctx: ReactionContext<'_>,
    ) -> Result<ReactionOutcome, HandlerError> {
        self.inner.execute_boxed(ctx).await
    }
}
