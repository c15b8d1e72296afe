//! Compiles AsyncAPI documents into route pipelines.
//!
//! For every channel with a publish operation the compiler derives the
//! parameter, header and payload schemas, compiles them once into
//! validation stages, resolves the operation's handler from a
//! [`ControllerRegistry`] and mounts the resulting chain on a [`Host`].
//!
//! [`Host`]: asyncgate_pipeline::Host

pub mod compiler;
pub mod error;
pub mod options;
pub mod resolver;
pub mod schema;
pub mod source;

pub use compiler::{
    route_path, route_specs, translate_path, HandlerStatus, RegisteredRoute, Registration, RouteCompiler,
    RouteSpec,
};
pub use error::CompileError;
pub use options::{CompileOptions, DEFAULT_CONFIG_FILE};
pub use resolver::{
    module_key, stub, Controller, ControllerRegistry, Export, HandlerBinding, HandlerFactory,
    OperationHandler, OperationResolver, ResolveError,
};
pub use schema::{header_schema, parameters_schema};
pub use source::{AsyncApiParser, SpecParser, SpecSource};
