// Handler chains: an ordered list of stages sharing one `handle(ctx, next)`
// contract, assembled once per endpoint.

use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use crate::api::Response;
use crate::context::ServiceContext;
use crate::error::ServiceError;

/// `Ok(None)`: the stage (and everything after it) produced no response
pub type HandlerResult = Result<Option<Response>, ServiceError>;

/// One stage of a request pipeline.
///
/// A stage runs its own work and either returns a result of its own
/// (short-circuiting everything after it) or hands control to `next`.
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str {
        "handler"
    }

    fn handle(&self, ctx: &ServiceContext, next: Next<'_>) -> HandlerResult;
}

/// The remaining stages after the one currently running
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Handler>],
}

impl<'a> Next<'a> {
    pub fn run(self, ctx: &ServiceContext) -> HandlerResult {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(ctx, Next { stages: rest }),
            None => Ok(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// An exhausted chain
    pub fn end() -> Next<'static> {
        Next { stages: &[] }
    }
}

/// Business logic wrapped as the innermost stage
pub struct FnHandler<F, R> {
    name: &'static str,
    f: F,
    _result: PhantomData<fn() -> R>,
}

/// Wrap a closure as a handler. Returning `None` (where the closure returns
/// `Option<Response>`) defers to whatever follows.
pub fn handler_fn<F, R>(f: F) -> FnHandler<F, R>
where
    F: Fn(&ServiceContext) -> Result<R, ServiceError> + Send + Sync,
    R: Into<Option<Response>>,
{
    FnHandler {
        name: "handler",
        f,
        _result: PhantomData,
    }
}

impl<F, R> FnHandler<F, R> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F, R> Handler for FnHandler<F, R>
where
    F: Fn(&ServiceContext) -> Result<R, ServiceError> + Send + Sync,
    R: Into<Option<Response>>,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle(&self, ctx: &ServiceContext, next: Next<'_>) -> HandlerResult {
        match (self.f)(ctx)?.into() {
            Some(response) => Ok(Some(response)),
            None => next.run(ctx),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain has no business-logic handler")]
    MissingHandler,
}

/// An assembled pipeline
#[derive(Clone)]
pub struct Chain {
    stages: Vec<Arc<dyn Handler>>,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    pub fn run(&self, ctx: &ServiceContext) -> HandlerResult {
        Next { stages: &self.stages }.run(ctx)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Collects optional stages and assembles them in the fixed order
/// foundation → authentication → logging → tracing → serialization → handler,
/// whatever order the setters were called in.
#[derive(Default)]
pub struct ChainBuilder {
    foundation: Option<Arc<dyn Handler>>,
    authentication: Option<Arc<dyn Handler>>,
    logging: Option<Arc<dyn Handler>>,
    tracing: Option<Arc<dyn Handler>>,
    serialization: Option<Arc<dyn Handler>>,
    handler: Option<Arc<dyn Handler>>,
}

impl ChainBuilder {
    pub fn foundation(mut self, stage: impl Handler + 'static) -> Self {
        self.foundation = Some(Arc::new(stage));
        self
    }

    pub fn authentication(mut self, stage: impl Handler + 'static) -> Self {
        self.authentication = Some(Arc::new(stage));
        self
    }

    pub fn logging(mut self, stage: impl Handler + 'static) -> Self {
        self.logging = Some(Arc::new(stage));
        self
    }

    pub fn tracing(mut self, stage: impl Handler + 'static) -> Self {
        self.tracing = Some(Arc::new(stage));
        self
    }

    pub fn serialization(mut self, stage: impl Handler + 'static) -> Self {
        self.serialization = Some(Arc::new(stage));
        self
    }

    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<Chain, ChainError> {
        let handler = self.handler.ok_or(ChainError::MissingHandler)?;
        let stages: Vec<Arc<dyn Handler>> = [
            self.foundation,
            self.authentication,
            self.logging,
            self.tracing,
            self.serialization,
        ]
        .into_iter()
        .flatten()
        .chain(std::iter::once(handler))
        .collect();

        tracing::debug!(
            "Assembled chain: {:?}",
            stages.iter().map(|stage| stage.name()).collect::<Vec<_>>()
        );
        Ok(Chain { stages })
    }
}
