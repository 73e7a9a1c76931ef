//! Main configuration types.
//!
//! This module provides the top-level [`TetherConfig`] struct and its builder.

use serde::{Deserialize, Serialize};

use crate::{
    ConfigError, ErrorHandlingSettings, LoggingSettings, MethodSettings, RouteSettings, Routes,
    RunnerSettings,
};
use tether_telemetry::LogFormat;

/// Complete Tether configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use tether_config::TetherConfig;
///
/// let config = TetherConfig::default();
/// assert!(config.runner.call_done_on_end);
/// assert!(config.runner.use_chain.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// Default chains shared by every route.
    #[serde(default)]
    pub runner: RunnerSettings,

    /// Per-route adjustments, keyed by route name.
    #[serde(default)]
    pub routes: Routes,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Error-handling stage configuration.
    #[serde(default)]
    pub error_handling: ErrorHandlingSettings,

    /// Method-check stage configuration.
    #[serde(default)]
    pub methods: MethodSettings,
}

impl TetherConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> TetherConfigBuilder {
        TetherConfigBuilder::new()
    }

    /// Returns the settings of a route, if configured.
    pub fn route(&self, name: &str) -> Option<&RouteSettings> {
        self.routes.get(name)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The log level is not a valid filter directive
    /// - A disallowed or route method is not a valid HTTP method token
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.enabled {
            tether_telemetry::create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        for method in &self.methods.disallowed {
            validate_method("methods.disallowed", method)?;
        }

        for (name, route) in &self.routes {
            if name.trim().is_empty() {
                return Err(ConfigError::validation_error("route names must not be empty"));
            }
            for method in &route.methods {
                validate_method(&format!("routes.{name}.methods"), method)?;
            }
        }

        Ok(())
    }

    /// Development preset: pretty debug logs, internal error messages sent
    /// to clients.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LoggingSettings {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                span_events: true,
                file_line_info: true,
                ..LoggingSettings::default()
            },
            error_handling: ErrorHandlingSettings {
                expose_internal_errors: true,
            },
            ..Self::default()
        }
    }

    /// Production preset: JSON logs at `info`, internal error messages
    /// hidden.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }
}

fn validate_method(field: &str, method: &str) -> Result<(), ConfigError> {
    let valid = !method.is_empty() && method.bytes().all(|b| b.is_ascii_alphabetic());
    if valid {
        Ok(())
    } else {
        Err(ConfigError::invalid_value(
            field,
            format!("invalid HTTP method: {method:?}"),
        ))
    }
}

/// Builder for [`TetherConfig`].
#[derive(Debug, Default)]
pub struct TetherConfigBuilder {
    config: TetherConfig,
}

impl TetherConfigBuilder {
    /// Create a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default chains.
    #[must_use]
    pub fn runner(mut self, runner: RunnerSettings) -> Self {
        self.config.runner = runner;
        self
    }

    /// Add a route.
    #[must_use]
    pub fn route(mut self, name: impl Into<String>, route: RouteSettings) -> Self {
        self.config.routes.insert(name.into(), route);
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingSettings) -> Self {
        self.config.logging = logging;
        self
    }

    /// Set the error-handling configuration.
    #[must_use]
    pub fn error_handling(mut self, error_handling: ErrorHandlingSettings) -> Self {
        self.config.error_handling = error_handling;
        self
    }

    /// Set the method-check configuration.
    #[must_use]
    pub fn methods(mut self, methods: MethodSettings) -> Self {
        self.config.methods = methods;
        self
    }

    /// Build the configuration without validation.
    #[must_use]
    pub fn build(self) -> TetherConfig {
        self.config
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<TetherConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChainItem;

    #[test]
    fn test_default_is_valid() {
        assert!(TetherConfig::default().validate().is_ok());
        assert!(TetherConfig::development().validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let config = TetherConfig::builder()
            .logging(LoggingSettings {
                level: "tether=notalevel".to_string(),
                ..LoggingSettings::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_invalid_disallowed_method() {
        let result = TetherConfig::builder()
            .methods(MethodSettings {
                disallowed: vec!["PO ST".to_string()],
            })
            .build_validated();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_builder_route() {
        let config = TetherConfig::builder()
            .route(
                "users",
                RouteSettings {
                    methods: vec!["GET".to_string()],
                    prepend_use: vec![ChainItem::from("auth")],
                    ..RouteSettings::default()
                },
            )
            .build_validated()
            .unwrap();

        assert_eq!(config.route("users").unwrap().prepend_use.len(), 1);
        assert!(config.route("missing").is_none());
    }

    #[test]
    fn test_development_preset() {
        let config = TetherConfig::development();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.error_handling.expose_internal_errors);
    }
}
