//! HTTP/1.1 front end: converts hyper requests into pipeline requests.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, ALLOW, CONTENT_TYPE};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use asyncgate_compiler::Registration;
use asyncgate_pipeline::{JsonMap, Request, Response};
use asyncgate_router::{App, ProblemDetails};

/// Paths under this prefix never reach the mounted routes.
pub const INTERNAL_PREFIX: &str = "/__asyncgate/";

/// A compiled application plus what was registered on it.
pub struct Gateway {
    app: App,
    registration: Registration,
}

impl Gateway {
    pub fn new(app: App, registration: Registration) -> Self {
        Self { app, registration }
    }

    pub fn routes_count(&self) -> usize {
        self.app.len()
    }

    /// Handle an incoming HTTP request.
    pub async fn handle_request<B>(
        &self,
        req: hyper::Request<B>,
    ) -> Result<hyper::Response<Full<Bytes>>, Infallible>
    where
        B: Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        Ok(into_hyper(self.respond(req).await))
    }

    async fn respond<B>(&self, req: hyper::Request<B>) -> Response
    where
        B: Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();

        if let Some(endpoint) = path.strip_prefix(INTERNAL_PREFIX) {
            return self.internal_endpoint(endpoint, &parts.method, &path);
        }

        let headers = header_map(&parts.headers);

        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return ProblemDetails::bad_request(
                    &format!("failed to read request body: {}", e),
                    &path,
                )
                .into_response()
            }
        };

        let body = match decode_body(&headers, &bytes) {
            Ok(body) => body,
            Err(e) => {
                return ProblemDetails::bad_request(&format!("invalid JSON body: {}", e), &path)
                    .into_response()
            }
        };

        let mut request = Request::new(parts.method, path);
        request.headers = headers;
        request.body = body;

        self.app.handle(request).await
    }

    /// Handle reserved /__asyncgate/* endpoints.
    fn internal_endpoint(&self, endpoint: &str, method: &Method, path: &str) -> Response {
        if *method != Method::GET {
            let mut response = Response::new(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers
                .insert(ALLOW, HeaderValue::from_static("GET"));
            return response;
        }

        match endpoint {
            "health" => Response::json(
                StatusCode::OK,
                &json!({
                    "status": "healthy",
                    "title": self.registration.title,
                    "version": self.registration.version,
                    "routes_count": self.app.len(),
                }),
            ),
            "routes" => Response::json(StatusCode::OK, &self.registration),
            _ => ProblemDetails::not_found(path).into_response(),
        }
    }
}

/// Header values keyed by (lowercase) name. Repeated headers are joined with `", "`.
fn header_map(headers: &HeaderMap) -> JsonMap {
    let mut map = JsonMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let key = name.as_str().to_ascii_lowercase();
        match map.get_mut(&key) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            _ => {
                map.insert(key, Value::String(value.to_string()));
            }
        }
    }
    map
}

/// Decode a request body.
///
/// JSON content types must parse. Without a content type, JSON is tried
/// first. Anything else is kept as text; an empty body is `Null`.
fn decode_body(headers: &JsonMap, bytes: &Bytes) -> Result<Value, serde_json::Error> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }

    let content_type = headers
        .get(CONTENT_TYPE.as_str())
        .and_then(Value::as_str)
        .map(|ct| ct.to_ascii_lowercase());

    match content_type {
        Some(ct) if ct.contains("json") => serde_json::from_slice(bytes),
        Some(_) => Ok(text(bytes)),
        None => Ok(serde_json::from_slice(bytes).unwrap_or_else(|_| text(bytes))),
    }
}

fn text(bytes: &Bytes) -> Value {
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

fn into_hyper(response: Response) -> hyper::Response<Full<Bytes>> {
    let mut out = hyper::Response::new(Full::new(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}

/// Accept connections until the process is stopped.
pub async fn serve(gateway: Arc<Gateway>, listener: TcpListener) {
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };

        let gateway = Arc::clone(&gateway);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let gateway = Arc::clone(&gateway);
                async move { gateway.handle_request(req).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(remote = %remote, error = %e, "connection error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asyncgate_pipeline::{from_sync_fn, Flow, Host};

    fn gateway() -> Gateway {
        let mut app = App::new();
        app.mount(
            "/:streetlightId/measured",
            vec![from_sync_fn(|req| {
                let echoed = json!({
                    "params": req.params.clone(),
                    "headers": req.headers.clone(),
                    "body": req.body.clone(),
                });
                Ok(Flow::Respond(Response::json(StatusCode::OK, &echoed)))
            })],
        );
        let registration = Registration {
            title: "Streetlights".into(),
            version: "1.0.0".into(),
            routes: Vec::new(),
        };
        Gateway::new(app, registration)
    }

    fn request(
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> hyper::Request<Full<Bytes>> {
        let mut builder = hyper::Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        builder
            .header("X-Trace", "a")
            .header("x-trace", "b")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn call(gateway: &Gateway, req: hyper::Request<Full<Bytes>>) -> (StatusCode, Value) {
        let response = gateway.handle_request(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn json_bodies_and_headers_reach_the_pipeline() {
        let gateway = gateway();
        let (status, body) = call(
            &gateway,
            request(Method::POST, "/42/measured", Some("application/json"), r#"{"lumens":3}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["params"]["streetlightId"], "42");
        assert_eq!(body["body"], json!({ "lumens": 3 }));
        assert_eq!(body["headers"]["x-trace"], "a, b");
        assert_eq!(body["headers"]["content-type"], "application/json");
    }

    #[tokio::test]
    async fn non_json_bodies_are_text() {
        let gateway = gateway();
        let (_, body) = call(
            &gateway,
            request(Method::POST, "/1/measured", Some("text/plain"), "{\"not\":\"parsed\"}"),
        )
        .await;
        assert_eq!(body["body"], "{\"not\":\"parsed\"}");

        let (_, body) = call(&gateway, request(Method::POST, "/1/measured", None, "[1,2]")).await;
        assert_eq!(body["body"], json!([1, 2]));

        let (_, body) = call(&gateway, request(Method::POST, "/1/measured", None, "")).await;
        assert_eq!(body["body"], Value::Null);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let gateway = gateway();
        let (status, body) = call(
            &gateway,
            request(Method::POST, "/1/measured", Some("application/json"), "{oops"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "urn:asyncgate:error:bad-request");
    }

    #[tokio::test]
    async fn health_reports_route_count() {
        let gateway = gateway();
        let (status, body) =
            call(&gateway, request(Method::GET, "/__asyncgate/health", None, "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["routes_count"], 1);
        assert_eq!(body["title"], "Streetlights");
    }

    #[tokio::test]
    async fn internal_endpoints_are_get_only() {
        let gateway = gateway();
        let response = gateway
            .handle_request(request(Method::POST, "/__asyncgate/health", None, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["allow"], "GET");

        let (status, _) =
            call(&gateway, request(Method::GET, "/__asyncgate/unknown", None, "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_paths_are_404_problems() {
        let gateway = gateway();
        let (status, body) = call(&gateway, request(Method::POST, "/nowhere", None, "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "urn:asyncgate:error:not-found");
    }
}
