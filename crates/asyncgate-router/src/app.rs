use std::time::Instant;

use http::StatusCode;
use serde::Serialize;

use asyncgate_pipeline::{Flow, Host, Pipeline, PipelineError, Request, Response, SharedMiddleware};
use asyncgate_telemetry::{log_handler_error, log_request_completed, log_validation_failure};

use crate::pattern::RoutePattern;
use crate::problem::ProblemDetails;

struct Layer {
    pattern: RoutePattern,
    pipeline: Pipeline,
}

/// A mounted layer as reported by [`App::routes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountedRoute {
    pub pattern: String,
    pub stages: usize,
}

/// Layered host: every mount is an independent layer, tried in order.
#[derive(Default)]
pub struct App {
    layers: Vec<Layer>,
    dev_mode: bool,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include violation and handler error details in problem responses.
    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn routes(&self) -> Vec<MountedRoute> {
        self.layers
            .iter()
            .map(|layer| MountedRoute {
                pattern: layer.pattern.as_str().to_string(),
                stages: layer.pipeline.len(),
            })
            .collect()
    }

    /// Run a request through every matching layer.
    ///
    /// `req.params` is replaced with each layer's captures before its
    /// pipeline runs. A request that matched but was never answered gets
    /// `202 Accepted` with the request context as body.
    pub async fn dispatch(&self, req: &mut Request) -> Response {
        let start = Instant::now();
        let response = self.dispatch_layers(req).await;

        log_request_completed!(
            method = %req.method,
            path = %req.path,
            status = response.status.as_u16(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        );
        response
    }

    pub async fn handle(&self, mut req: Request) -> Response {
        self.dispatch(&mut req).await
    }

    async fn dispatch_layers(&self, req: &mut Request) -> Response {
        let mut matched = false;

        for layer in &self.layers {
            let Some(params) = layer.pattern.matches(&req.path) else {
                continue;
            };
            matched = true;
            req.params = params;

            match layer.pipeline.run(req).await {
                Ok(Flow::Continue) => continue,
                Ok(Flow::Respond(response)) => return response,
                Err(err) => return self.error_response(&layer.pattern, req, err),
            }
        }

        if matched {
            Response::json(StatusCode::ACCEPTED, &req.api)
        } else {
            ProblemDetails::not_found(&req.path).into_response()
        }
    }

    fn error_response(&self, pattern: &RoutePattern, req: &Request, err: PipelineError) -> Response {
        match err {
            PipelineError::Validation(failure) => {
                log_validation_failure!(
                    route = %pattern,
                    path = %req.path,
                    validation_target = failure.target.as_str(),
                    schema_path = %failure.violation.schema_path,
                    message = %failure.message,
                );
                ProblemDetails::validation_failure(&failure, &req.path, self.dev_mode)
                    .into_response()
            }
            PipelineError::Handler(source) => {
                let message = source.to_string();
                log_handler_error!(route = %pattern, path = %req.path, error = %message);
                ProblemDetails::handler_error(&message, &req.path, self.dev_mode).into_response()
            }
        }
    }
}

impl Host for App {
    fn mount(&mut self, pattern: &str, stages: Vec<SharedMiddleware>) {
        self.layers.push(Layer {
            pattern: RoutePattern::parse(pattern),
            pipeline: Pipeline::new(stages),
        });
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.routes())
            .field("dev_mode", &self.dev_mode)
            .finish()
    }
}
