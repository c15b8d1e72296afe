use std::sync::Arc;

use futures_util::future::{self, BoxFuture};

use crate::error::PipelineError;
use crate::request::Request;
use crate::response::Response;

/// What a stage decided after handling a request.
#[derive(Debug)]
pub enum Flow {
    /// Advance to the next stage.
    Continue,
    /// Stop the chain and answer with this response.
    Respond(Response),
}

/// One stage of a route pipeline.
///
/// Stages are shared across every concurrent request on their route and
/// must not keep per-request state.
pub trait Middleware: Send + Sync {
    fn call<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, Result<Flow, PipelineError>>;
}

pub type SharedMiddleware = Arc<dyn Middleware>;

struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Request) -> BoxFuture<'a, Result<Flow, PipelineError>> + Send + Sync,
{
    fn call<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, Result<Flow, PipelineError>> {
        (self.0)(req)
    }
}

/// Build a stage from an async closure.
///
/// ```ignore
/// let stage = from_fn(|req| Box::pin(async move {
///     req.api.insert("seen", true.into());
///     Ok(Flow::Continue)
/// }));
/// ```
pub fn from_fn<F>(f: F) -> SharedMiddleware
where
    F: for<'a> Fn(&'a mut Request) -> BoxFuture<'a, Result<Flow, PipelineError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnMiddleware(f))
}

struct SyncFnMiddleware<F>(F);

impl<F> Middleware for SyncFnMiddleware<F>
where
    F: Fn(&mut Request) -> Result<Flow, PipelineError> + Send + Sync,
{
    fn call<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, Result<Flow, PipelineError>> {
        Box::pin(future::ready((self.0)(req)))
    }
}

/// Build a stage from a closure that finishes without awaiting.
pub fn from_sync_fn<F>(f: F) -> SharedMiddleware
where
    F: Fn(&mut Request) -> Result<Flow, PipelineError> + Send + Sync + 'static,
{
    Arc::new(SyncFnMiddleware(f))
}

/// An ordered chain of stages.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<SharedMiddleware>,
}

impl Pipeline {
    pub fn new(stages: Vec<SharedMiddleware>) -> Self {
        Self { stages }
    }

    pub fn push(&mut self, stage: SharedMiddleware) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[SharedMiddleware] {
        &self.stages
    }

    /// Run every stage in order.
    ///
    /// Returns `Flow::Continue` when all stages continued, the first
    /// `Flow::Respond`, or the first error.
    pub async fn run(&self, req: &mut Request) -> Result<Flow, PipelineError> {
        for (index, stage) in self.stages.iter().enumerate() {
            match stage.call(req).await? {
                Flow::Continue => {
                    tracing::trace!(stage = index, path = %req.path, "stage continued");
                }
                respond @ Flow::Respond(_) => return Ok(respond),
            }
        }
        Ok(Flow::Continue)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl From<Vec<SharedMiddleware>> for Pipeline {
    fn from(stages: Vec<SharedMiddleware>) -> Self {
        Self::new(stages)
    }
}
