//! The route compiler.

use serde::Serialize;
use serde_json::Value;

use asyncgate_pipeline::{Host, SharedMiddleware, ValidationTarget};
use asyncgate_spec_parser::AsyncApiDocument;
use asyncgate_telemetry::log_route_registered;
use asyncgate_validator::{
    validate_body, validate_headers, validate_params, SchemaEngine, SchemaError,
};

use crate::error::CompileError;
use crate::options::CompileOptions;
use crate::resolver::{ControllerRegistry, HandlerBinding, OperationResolver};
use crate::schema::{header_schema, parameters_schema};
use crate::source::{AsyncApiParser, SpecParser, SpecSource};

/// Everything needed to build one route's pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSpec {
    /// Host route pattern (`:name` captures).
    pub route: String,
    /// The channel the route was derived from.
    pub channel: String,
    pub operation_id: Option<String>,
    pub controller: Option<String>,
    /// The message payload schema as declared.
    pub payload_schema: Value,
    pub header_schema: Value,
    pub parameters_schema: Value,
}

/// Rewrite `{name}` placeholders into `:name` captures.
pub fn translate_path(channel: &str) -> String {
    channel.replace('{', ":").replace('}', "")
}

/// The path a host serves `pattern` under: leading slash implied, empty
/// segments dropped.
pub fn route_path(pattern: &str) -> String {
    let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Route specs for every publish operation, in channel declaration order.
///
/// With `tag` set, operations that do not carry exactly that tag are skipped.
pub fn route_specs(document: &AsyncApiDocument, tag: Option<&str>) -> Vec<RouteSpec> {
    document
        .channels
        .iter()
        .filter_map(|channel| {
            let operation = channel.publish.as_ref()?;
            if let Some(tag) = tag {
                if !operation.has_tag(tag) {
                    return None;
                }
            }

            Some(RouteSpec {
                route: translate_path(&channel.name),
                channel: channel.name.clone(),
                operation_id: operation.operation_id.clone(),
                controller: operation.controller.clone(),
                payload_schema: operation.message.original_payload.clone(),
                header_schema: header_schema(&operation.message),
                parameters_schema: parameters_schema(&channel.parameters),
            })
        })
        .collect()
}

/// How a route's handler stages were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerStatus {
    /// Bound to a registered controller export.
    Resolved,
    /// Resolution failed; a logging stub continues instead.
    Stubbed,
    /// Handler resolution was turned off.
    Suppressed,
}

impl HandlerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerStatus::Resolved => "resolved",
            HandlerStatus::Stubbed => "stubbed",
            HandlerStatus::Suppressed => "suppressed",
        }
    }
}

/// One mounted route.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredRoute {
    /// The translated pattern passed to [`Host::mount`], e.g. `light.measured`.
    pub pattern: String,
    /// `pattern` as the host serves it, e.g. `/light.measured`.
    pub path: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Total pipeline length, validation included.
    pub stages: usize,
    pub handler: HandlerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stub_reason: Option<String>,
}

/// What a registration pass mounted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registration {
    pub title: String,
    pub version: String,
    pub routes: Vec<RegisteredRoute>,
}

impl Registration {
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Sum of all pipeline lengths.
    pub fn stage_count(&self) -> usize {
        self.routes.iter().map(|r| r.stages).sum()
    }
}

/// Compiles documents into pipelines and mounts them on a host.
///
/// Holds no state between registrations; the engine, registry and parser
/// are configuration.
pub struct RouteCompiler<P = AsyncApiParser> {
    options: CompileOptions,
    registry: ControllerRegistry,
    engine: SchemaEngine,
    parser: P,
}

impl RouteCompiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            registry: ControllerRegistry::new(),
            engine: SchemaEngine::new(),
            parser: AsyncApiParser,
        }
    }
}

impl<P: SpecParser> RouteCompiler<P> {
    pub fn with_registry(mut self, registry: ControllerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_engine(mut self, engine: SchemaEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_parser<Q: SpecParser>(self, parser: Q) -> RouteCompiler<Q> {
        RouteCompiler {
            options: self.options,
            registry: self.registry,
            engine: self.engine,
            parser,
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    /// Parse `source` and mount a pipeline per publish operation.
    ///
    /// Parsing is the only await. Callers must not run two registrations
    /// against the same host concurrently.
    pub async fn register<H>(
        &self,
        host: &mut H,
        source: impl Into<SpecSource>,
    ) -> Result<Registration, CompileError>
    where
        H: Host + ?Sized,
    {
        let document = self.parser.parse(source.into()).await?;
        self.register_document(host, &document)
    }

    /// Mount pipelines for an already parsed document.
    ///
    /// Every pipeline is built before the first mount, so a failure leaves
    /// the host untouched.
    pub fn register_document<H>(
        &self,
        host: &mut H,
        document: &AsyncApiDocument,
    ) -> Result<Registration, CompileError>
    where
        H: Host + ?Sized,
    {
        let resolver = OperationResolver::new(
            &self.registry,
            &self.options.controllers,
            self.options.stub_middleware,
        );

        let mut compiled = Vec::new();
        for spec in route_specs(document, self.options.tag.as_deref()) {
            compiled.push(self.compile_route(spec, &resolver)?);
        }

        let mut registration = Registration {
            title: document.title.clone(),
            version: document.api_version.clone(),
            routes: Vec::with_capacity(compiled.len()),
        };

        for (stages, route) in compiled {
            log_route_registered!(
                pattern = %route.pattern,
                channel = %route.channel,
                operation_id = route.operation_id.as_deref().unwrap_or(""),
                stages = route.stages,
                "route registered"
            );
            host.mount(&route.pattern, stages);
            registration.routes.push(route);
        }

        Ok(registration)
    }

    /// Build the pipeline for one route: params, headers, body, then handlers.
    fn compile_route(
        &self,
        spec: RouteSpec,
        resolver: &OperationResolver<'_>,
    ) -> Result<(Vec<SharedMiddleware>, RegisteredRoute), CompileError> {
        let invalid = |target: ValidationTarget| {
            let channel = spec.channel.clone();
            move |e: SchemaError| CompileError::InvalidSchema {
                channel,
                target,
                message: e.message,
            }
        };

        let mut stages = vec![
            validate_params(&self.engine, &spec.parameters_schema)
                .map_err(invalid(ValidationTarget::Params))?,
            validate_headers(&self.engine, &spec.header_schema)
                .map_err(invalid(ValidationTarget::Headers))?,
            validate_body(&self.engine, &spec.payload_schema)
                .map_err(invalid(ValidationTarget::Body))?,
        ];

        let (handler, stub_reason) = if self.options.require_controller {
            let operation_id = spec.operation_id.as_deref().unwrap_or_default();
            let binding = resolver
                .bind(operation_id, spec.controller.as_deref())
                .map_err(|source| CompileError::Resolution {
                    channel: spec.channel.clone(),
                    source,
                })?;

            match binding {
                HandlerBinding::Resolved(handlers) => {
                    stages.extend(handlers);
                    (HandlerStatus::Resolved, None)
                }
                HandlerBinding::Stubbed { stage, reason } => {
                    stages.push(stage);
                    (HandlerStatus::Stubbed, Some(reason.to_string()))
                }
            }
        } else {
            (HandlerStatus::Suppressed, None)
        };

        let route = RegisteredRoute {
            path: route_path(&spec.route),
            pattern: spec.route,
            channel: spec.channel,
            operation_id: spec.operation_id,
            stages: stages.len(),
            handler,
            stub_reason,
        };

        Ok((stages, route))
    }
}
