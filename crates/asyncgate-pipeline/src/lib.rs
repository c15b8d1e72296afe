//! Pipeline primitives shared by every asyncgate crate.
//!
//! A compiled route is an ordered list of [`Middleware`] stages. Each stage
//! sees the same [`Request`], may write into its per-request [`ApiContext`],
//! and either continues the chain, answers with a [`Response`], or fails
//! with a [`PipelineError`] that the host turns into an error response.

pub mod error;
pub mod host;
pub mod middleware;
pub mod request;
pub mod response;

pub use error::{BoxError, PipelineError, ValidationFailure, ValidationTarget, Violation};
pub use host::Host;
pub use middleware::{from_fn, from_sync_fn, Flow, Middleware, Pipeline, SharedMiddleware};
pub use request::{ApiContext, JsonMap, Request};
pub use response::Response;

pub use futures_util::future::BoxFuture;
