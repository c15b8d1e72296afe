//! AsyncAPI 2.x spec parser.
//!
//! Reads YAML/JSON documents, validates the document structure, resolves
//! local `$ref`s and extracts channels with their publish/subscribe
//! operations. Message schemas are annotated with `x-parser-schema-id` the
//! way AsyncAPI tooling does; [`strip_parser_metadata`] removes it again.

pub mod error;
pub mod model;
pub mod parser;
pub mod schema;

pub use error::{ParseError, ValidationIssue};
pub use model::{AsyncApiDocument, Channel, Message, Operation, ParameterDefinition};
pub use parser::{parse_spec, parse_spec_file, parse_value, CONTROLLER_EXTENSION};
pub use schema::{strip_parser_metadata, PARSER_SCHEMA_ID};
