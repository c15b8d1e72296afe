//! Operation handler resolution.
//!
//! Controllers are registered up front in a [`ControllerRegistry`], keyed
//! by module name. An operation binds to `<controllers base>/<controller
//! reference>` and looks its `operationId` up among that controller's
//! exports.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use asyncgate_pipeline::{from_sync_fn, Flow, SharedMiddleware};
use asyncgate_telemetry::log_stub_invoked;

/// Builds a handler on demand. Invoked once per registration.
pub type HandlerFactory = Arc<dyn Fn() -> OperationHandler + Send + Sync>;

/// The shapes a controller export can take.
#[derive(Clone)]
pub enum OperationHandler {
    /// A single stage.
    Direct(SharedMiddleware),
    /// Several stages run in order.
    Sequence(Vec<SharedMiddleware>),
    /// Produces a `Direct` or `Sequence` handler at registration time.
    Factory(HandlerFactory),
}

impl OperationHandler {
    pub fn direct(handler: SharedMiddleware) -> Self {
        OperationHandler::Direct(handler)
    }

    pub fn sequence(handlers: impl IntoIterator<Item = SharedMiddleware>) -> Self {
        OperationHandler::Sequence(handlers.into_iter().collect())
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn() -> OperationHandler + Send + Sync + 'static,
    {
        OperationHandler::Factory(Arc::new(factory))
    }
}

impl std::fmt::Debug for OperationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationHandler::Direct(_) => f.write_str("Direct"),
            OperationHandler::Sequence(stages) => write!(f, "Sequence({})", stages.len()),
            OperationHandler::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// One named export of a controller.
#[derive(Debug, Clone)]
pub enum Export {
    Handler(OperationHandler),
    /// A non-callable export; binding an operation to it is an error.
    Value(Value),
}

/// A set of exports, keyed by operation id.
#[derive(Debug, Clone, Default)]
pub struct Controller {
    exports: BTreeMap<String, Export>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, name: impl Into<String>, handler: OperationHandler) -> Self {
        self.insert(name, Export::Handler(handler));
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, Export::Value(value));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, export: Export) {
        self.exports.insert(name.into(), export);
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.get(name)
    }

    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(|k| k.as_str())
    }
}

/// Controllers available to a compilation, keyed by module path.
#[derive(Debug, Clone, Default)]
pub struct ControllerRegistry {
    modules: BTreeMap<String, Controller>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `controller` under `key` (normalized like [`module_key`]).
    pub fn with_controller(mut self, key: &str, controller: Controller) -> Self {
        self.register(key, controller);
        self
    }

    pub fn register(&mut self, key: &str, controller: Controller) {
        self.modules.insert(module_key("", key), controller);
    }

    pub fn get(&self, key: &str) -> Option<&Controller> {
        self.modules.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.modules.contains_key(key)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Join a base location and a controller reference into a module key.
///
/// Empty and `.` segments are dropped, so `"handlers/"` + `"lights"` and
/// `"./handlers"` + `"/lights"` both give `"handlers/lights"`.
pub fn module_key(base: &str, reference: &str) -> String {
    base.split('/')
        .chain(reference.split('/'))
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Why an operation's handler could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("missing operation id")]
    MissingOperationId,

    #[error("module not loadable: no controller registered as '{module}'")]
    ModuleNotLoadable { module: String },

    #[error("export is not callable: '{operation_id}' in '{module}'")]
    NotCallable {
        operation_id: String,
        module: String,
    },

    #[error("factory for '{operation_id}' produced another factory")]
    NestedFactory { operation_id: String },
}

/// The outcome of resolving one operation.
pub enum HandlerBinding {
    /// The stages to append after validation.
    Resolved(Vec<SharedMiddleware>),
    /// Resolution failed and a stub stands in.
    Stubbed {
        stage: SharedMiddleware,
        reason: ResolveError,
    },
}

/// Resolves operations against a registry for one registration pass.
pub struct OperationResolver<'r> {
    registry: &'r ControllerRegistry,
    base: &'r str,
    stub_on_failure: bool,
}

impl<'r> OperationResolver<'r> {
    pub fn new(registry: &'r ControllerRegistry, base: &'r str, stub_on_failure: bool) -> Self {
        Self {
            registry,
            base,
            stub_on_failure,
        }
    }

    /// Resolve, substituting a stub on failure when stubbing is enabled.
    pub fn bind(
        &self,
        operation_id: &str,
        controller: Option<&str>,
    ) -> Result<HandlerBinding, ResolveError> {
        match self.resolve(operation_id, controller) {
            Ok(stages) => Ok(HandlerBinding::Resolved(stages)),
            Err(reason) if self.stub_on_failure => {
                tracing::warn!(
                    operation_id = %operation_id,
                    reason = %reason,
                    "operation handler unresolved, installing stub"
                );
                Ok(HandlerBinding::Stubbed {
                    stage: stub(operation_id),
                    reason,
                })
            }
            Err(reason) => Err(reason),
        }
    }

    /// Resolve an operation to its handler stages. Factories run here.
    pub fn resolve(
        &self,
        operation_id: &str,
        controller: Option<&str>,
    ) -> Result<Vec<SharedMiddleware>, ResolveError> {
        if operation_id.is_empty() {
            return Err(ResolveError::MissingOperationId);
        }

        let module = module_key(self.base, controller.unwrap_or_default());
        let Some(found) = self.registry.get(&module) else {
            return Err(ResolveError::ModuleNotLoadable { module });
        };

        match found.export(operation_id) {
            Some(Export::Handler(handler)) => flatten(handler, operation_id),
            Some(Export::Value(_)) | None => Err(ResolveError::NotCallable {
                operation_id: operation_id.to_string(),
                module,
            }),
        }
    }
}

fn flatten(
    handler: &OperationHandler,
    operation_id: &str,
) -> Result<Vec<SharedMiddleware>, ResolveError> {
    match handler {
        OperationHandler::Direct(stage) => Ok(vec![stage.clone()]),
        OperationHandler::Sequence(stages) => Ok(stages.clone()),
        OperationHandler::Factory(factory) => match factory() {
            OperationHandler::Direct(stage) => Ok(vec![stage]),
            OperationHandler::Sequence(stages) => Ok(stages),
            OperationHandler::Factory(_) => Err(ResolveError::NestedFactory {
                operation_id: operation_id.to_string(),
            }),
        },
    }
}

/// A pass-through stage that logs the operation and request path.
pub fn stub(operation_id: &str) -> SharedMiddleware {
    let operation_id = operation_id.to_string();
    from_sync_fn(move |req| {
        log_stub_invoked!(
            operation_id = %operation_id,
            path = %req.path,
            "Here should be the handler for operation {} called by {}",
            operation_id,
            req.path
        );
        Ok(Flow::Continue)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use asyncgate_pipeline::{Middleware, Pipeline, Request};
    use http::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn touch() -> SharedMiddleware {
        from_sync_fn(|req| {
            req.api.insert("touched", json!(true));
            Ok(Flow::Continue)
        })
    }

    fn push(result: &'static str) -> SharedMiddleware {
        from_sync_fn(move |req| {
            let mut results = req
                .api
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            results.push(json!(result));
            req.api.insert("results", Value::Array(results));
            Ok(Flow::Continue)
        })
    }

    fn test_controller() -> Controller {
        Controller::new()
            .with_handler("onLightMeasured", OperationHandler::direct(touch()))
            .with_handler(
                "onMultipleMiddlewares",
                OperationHandler::factory(|| OperationHandler::sequence([push("first"), push("second")])),
            )
            .with_value("notAfunction", json!({}))
    }

    fn registry() -> ControllerRegistry {
        ControllerRegistry::new().with_controller("test/utils/testController", test_controller())
    }

    #[test]
    fn module_key_normalizes_segments() {
        assert_eq!(module_key("test/utils/", "testController"), "test/utils/testController");
        assert_eq!(module_key("./handlers", "/lights"), "handlers/lights");
        assert_eq!(module_key("", "lights"), "lights");
        assert_eq!(module_key("handlers", ""), "handlers");
    }

    #[tokio::test]
    async fn resolves_a_direct_handler() {
        let registry = registry();
        let resolver = OperationResolver::new(&registry, "test/utils/", false);

        let stages = resolver
            .resolve("onLightMeasured", Some("testController"))
            .unwrap();
        assert_eq!(stages.len(), 1);

        let mut req = Request::new(Method::POST, "/light.measured");
        Pipeline::new(stages).run(&mut req).await.unwrap();
        assert_eq!(req.api.get("touched"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn factory_returning_a_sequence_yields_ordered_stages() {
        let registry = registry();
        let resolver = OperationResolver::new(&registry, "test/utils/", false);

        let stages = resolver
            .resolve("onMultipleMiddlewares", Some("testController"))
            .unwrap();
        assert_eq!(stages.len(), 2);

        let mut req = Request::new(Method::POST, "/");
        stages[0].call(&mut req).await.unwrap();
        assert_eq!(req.api.get("results"), Some(&json!(["first"])));
        stages[1].call(&mut req).await.unwrap();
        assert_eq!(req.api.get("results"), Some(&json!(["first", "second"])));
    }

    #[test]
    fn factory_runs_once_per_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = ControllerRegistry::new().with_controller(
            "lights",
            Controller::new().with_handler(
                "onLightMeasured",
                OperationHandler::factory(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    OperationHandler::direct(touch())
                }),
            ),
        );
        let resolver = OperationResolver::new(&registry, "", false);

        resolver.resolve("onLightMeasured", Some("lights")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_are_fatal_without_stubbing() {
        let registry = registry();
        let resolver = OperationResolver::new(&registry, "test/utils/", false);

        assert_eq!(
            resolver.resolve("", Some("testController")).err(),
            Some(ResolveError::MissingOperationId)
        );
        assert_eq!(
            resolver.resolve("onLightMeasured", Some("")).err(),
            Some(ResolveError::ModuleNotLoadable {
                module: "test/utils".into()
            })
        );
        assert_eq!(
            resolver.resolve("notAfunction", Some("testController")).err(),
            Some(ResolveError::NotCallable {
                operation_id: "notAfunction".into(),
                module: "test/utils/testController".into()
            })
        );
        assert!(matches!(
            resolver.resolve("missing", Some("testController")),
            Err(ResolveError::NotCallable { .. })
        ));

        let wrong_base = OperationResolver::new(&registry, "test/", false);
        assert!(matches!(
            wrong_base.bind("onLightMeasured", Some("testController")),
            Err(ResolveError::ModuleNotLoadable { .. })
        ));
    }

    #[test]
    fn nested_factory_is_rejected() {
        let registry = ControllerRegistry::new().with_controller(
            "lights",
            Controller::new().with_handler(
                "nested",
                OperationHandler::factory(|| OperationHandler::factory(|| OperationHandler::direct(touch()))),
            ),
        );
        let resolver = OperationResolver::new(&registry, "", false);
        assert_eq!(
            resolver.resolve("nested", Some("lights")).err(),
            Some(ResolveError::NestedFactory {
                operation_id: "nested".into()
            })
        );
    }

    #[tokio::test]
    async fn stub_mode_substitutes_a_pass_through() {
        let registry = registry();
        let resolver = OperationResolver::new(&registry, "test/", true);

        let cases = [
            ("", Some("testController")),
            ("onLightMeasured", Some("")),
            ("onLightMeasured", Some("testController")),
            ("notAfunction", Some("testController")),
        ];
        for (operation_id, controller) in cases {
            match resolver.bind(operation_id, controller).unwrap() {
                HandlerBinding::Stubbed { stage, .. } => {
                    let mut req = Request::new(Method::POST, "routingKey");
                    let flow = stage.call(&mut req).await.unwrap();
                    assert!(matches!(flow, Flow::Continue));
                    assert!(req.api.is_empty());
                }
                HandlerBinding::Resolved(_) => panic!("expected a stub for {:?}", operation_id),
            }
        }
    }

    #[test]
    fn registry_keys_are_normalized() {
        let registry = ControllerRegistry::new().with_controller("./handlers/lights/", Controller::new());
        assert!(registry.contains("handlers/lights"));
        assert_eq!(registry.len(), 1);
    }
}
