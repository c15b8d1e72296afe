//! A layered, mount-style host for route pipelines.
//!
//! Patterns use `:name` captures. A pattern matches any request path that
//! starts with it at a segment boundary; unmatched trailing segments are
//! exposed under the positional key `"0"`. Layers run in mount order and a
//! pipeline that finishes with `Continue` falls through to the next match.

pub mod app;
pub mod pattern;
pub mod problem;

pub use app::{App, MountedRoute};
pub use pattern::{percent_decode, RoutePattern};
pub use problem::{ProblemDetails, PROBLEM_CONTENT_TYPE};
