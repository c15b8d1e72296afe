//! Request validation for asyncgate routes.
//!
//! A [`SchemaEngine`] compiles a JSON schema once into a
//! [`CompiledValidator`]; the stage factories wrap a compiled validator into
//! a pipeline stage for one request part (params, headers or body).

mod coerce;
pub mod engine;
pub mod stage;

pub use coerce::coerce_value;
pub use engine::{CompiledValidator, Coercion, SchemaEngine, SchemaError, ValidationErrors};
pub use stage::{validate_body, validate_headers, validate_params, POSITIONAL_PARAM};
