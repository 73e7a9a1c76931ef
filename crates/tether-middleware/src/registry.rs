//! Name-based middleware registry.
//!
//! Configuration names middleware by string. A [`MiddlewareRegistry`] maps
//! those names to chain entries and turns [`RunnerSettings`] and
//! [`RouteSettings`] into runner configuration. Unknown names and list items
//! that are not names become non-callable entries, which the runtime skips
//! with a diagnostic instead of failing the request.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxedMiddleware, ChainEntry, Middleware, MiddlewareResult};
use crate::runner::{ChainOverrides, ChainRunner, MiddlewareFactory, RunnerConfig};
use crate::sentinel::ResponseWriter;
use crate::stages::{CheckMethodMiddleware, HandleErrorMiddleware};
use crate::types::SharedRequest;
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tether_config::{ChainItem, ConfigError, RouteSettings, RunnerSettings, TetherConfig};
use tether_core::EndpointMetadata;

/// Registry of named middleware.
///
/// # Example
///
/// ```
/// use tether_config::ChainItem;
/// use tether_middleware::MiddlewareRegistry;
///
/// let mut registry = MiddlewareRegistry::<()>::new();
/// registry.register_fn("auth", |_request, _response, _ctx| async { Ok(()) });
///
/// assert!(registry.resolve(&ChainItem::from("auth")).is_callable());
/// assert!(!registry.resolve(&ChainItem::from("cors")).is_callable());
/// ```
pub struct MiddlewareRegistry<O> {
    entries: HashMap<String, ChainEntry<O>>,
}

impl<O> Default for MiddlewareRegistry<O> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<O> fmt::Debug for MiddlewareRegistry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("MiddlewareRegistry")
            .field("names", &names)
            .finish()
    }
}

impl<O: Send + Sync + 'static> MiddlewareRegistry<O> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `name`, replacing any earlier registration.
    pub fn register(&mut self, name: impl Into<String>, entry: ChainEntry<O>) -> &mut Self {
        self.entries.insert(name.into(), entry);
        self
    }

    /// Registers a middleware under its own [`name`](Middleware::name).
    pub fn register_middleware(&mut self, middleware: impl Middleware<O>) -> &mut Self {
        let name = middleware.name();
        self.register(name, ChainEntry::new(middleware))
    }

    /// Registers an async function under `name`.
    pub fn register_fn<F, Fut>(&mut self, name: &'static str, func: F) -> &mut Self
    where
        F: Fn(SharedRequest, ResponseWriter, MiddlewareContext<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        self.register(name, ChainEntry::from_fn(name, func))
    }

    /// Registers the bundled `check-method` and `handle-error` stages,
    /// configured from `config`.
    ///
    /// `log-request` needs a store and is registered by the caller.
    pub fn register_stages(&mut self, config: &TetherConfig) -> Result<&mut Self, ConfigError> {
        let check_method = CheckMethodMiddleware::from_names(&config.methods.disallowed)
            .map_err(|e| ConfigError::invalid_value("methods.disallowed", e.to_string()))?;
        let handle_error = HandleErrorMiddleware::new()
            .expose_internal_errors(config.error_handling.expose_internal_errors);

        self.register_middleware(check_method);
        Ok(self.register_middleware(handle_error))
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Maps one configured item to a chain entry.
    pub fn resolve(&self, item: &ChainItem) -> ChainEntry<O> {
        match item {
            ChainItem::Named(name) => self.entries.get(name).cloned().unwrap_or_else(|| {
                tracing::warn!(middleware = %name, "unregistered middleware in chain");
                ChainEntry::not_callable(format!("unregistered middleware `{name}`"))
            }),
            ChainItem::Invalid(value) => ChainEntry::not_callable(value.to_string()),
        }
    }

    /// Maps a configured chain to chain entries, keeping its order and
    /// length.
    pub fn resolve_all(&self, items: &[ChainItem]) -> Vec<ChainEntry<O>> {
        items.iter().map(|item| self.resolve(item)).collect()
    }

    /// Builds runner configuration from settings.
    pub fn runner_config(&self, settings: &RunnerSettings, options: O) -> RunnerConfig<O> {
        let mut config = RunnerConfig::new(options);
        config.use_chain = self.resolve_all(&settings.use_chain);
        config.use_on_error = self.resolve_all(&settings.use_on_error);
        config.call_done_on_end = settings.call_done_on_end;
        config
    }

    /// Builds runner configuration from a raw JSON object such as
    /// `{"use": ["auth"], "useOnError": ["handle-error"]}`.
    ///
    /// # Errors
    ///
    /// Fails if either chain list is present and not an array.
    pub fn runner_config_from_json(
        &self,
        value: Value,
        options: O,
    ) -> Result<RunnerConfig<O>, ConfigError> {
        let settings = RunnerSettings::from_json(value)?;
        Ok(self.runner_config(&settings, options))
    }

    /// Builds the per-route overrides for the route configured as `name`.
    ///
    /// The route's descriptor defaults to `name`.
    pub fn route_overrides(
        &self,
        name: &str,
        route: &RouteSettings,
    ) -> Result<ChainOverrides<O>, ConfigError> {
        let methods = route
            .methods
            .iter()
            .map(|method| {
                Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
                    ConfigError::invalid_value(
                        format!("routes.{name}.methods"),
                        format!("`{method}` is not an HTTP method"),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let descriptor = route.descriptor.clone().unwrap_or_else(|| name.to_string());

        Ok(ChainOverrides {
            prepend_use: self.resolve_all(&route.prepend_use),
            append_use: self.resolve_all(&route.append_use),
            prepend_use_on_error: self.resolve_all(&route.prepend_use_on_error),
            append_use_on_error: self.resolve_all(&route.append_use_on_error),
            options: None,
            endpoint: Some(EndpointMetadata::new(descriptor).allow_methods(methods)),
            call_done_on_end: route.call_done_on_end,
        })
    }

    /// Creates a factory whose defaults come from `config.runner`.
    pub fn factory(&self, config: &TetherConfig, options: O) -> MiddlewareFactory<O> {
        MiddlewareFactory::new(self.runner_config(&config.runner, options))
    }

    /// Creates the runner for the route configured as `name`.
    ///
    /// A route with no configuration gets the factory defaults and `name`
    /// as its descriptor.
    pub fn route_runner(
        &self,
        factory: &MiddlewareFactory<O>,
        config: &TetherConfig,
        name: &str,
        handler: Option<BoxedMiddleware<O>>,
    ) -> Result<ChainRunner<O>, ConfigError> {
        let overrides = match config.route(name) {
            Some(route) => self.route_overrides(name, route)?,
            None => ChainOverrides {
                endpoint: Some(EndpointMetadata::new(name)),
                ..ChainOverrides::default()
            },
        };
        Ok(factory.create(handler, overrides))
    }
}
