//! Configuration schema types.
//!
//! Chains are configured by middleware name. The lists are read as raw
//! JSON values first so that a list given as anything but an array fails
//! with a precise message, while individual items that are not names are
//! kept as [`ChainItem::Invalid`] and skipped by the runtime.

use crate::ConfigError;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use tether_telemetry::{LogConfig, LogFormat};

/// One item of a configured chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainItem {
    /// The name of a registered middleware.
    Named(String),
    /// Anything that is not a name.
    Invalid(Value),
}

impl ChainItem {
    /// Classifies a raw list item.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(name) => Self::Named(name),
            other => Self::Invalid(other),
        }
    }

    /// Returns the middleware name, if this item is one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Invalid(_) => None,
        }
    }
}

impl From<&str> for ChainItem {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl Serialize for ChainItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Named(name) => serializer.serialize_str(name),
            Self::Invalid(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ChainItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// Reads a chain list, failing unless `value` is an array.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tether_config::{parse_chain_list, ChainItem};
///
/// let items = parse_chain_list("use", json!(["auth", 5])).unwrap();
/// assert_eq!(items[0], ChainItem::Named("auth".to_string()));
/// assert!(items[1].name().is_none());
///
/// let err = parse_chain_list("use", json!(true)).unwrap_err();
/// assert_eq!(err.to_string(), "`use` parameter must be an array");
/// ```
pub fn parse_chain_list(field: &'static str, value: Value) -> Result<Vec<ChainItem>, ConfigError> {
    match value {
        Value::Array(items) => Ok(items.into_iter().map(ChainItem::from_value).collect()),
        _ => Err(ConfigError::chain_not_array(field)),
    }
}

fn chain_field<'de, D: Deserializer<'de>>(
    field: &'static str,
    deserializer: D,
) -> Result<Vec<ChainItem>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    parse_chain_list(field, value).map_err(de::Error::custom)
}

fn use_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ChainItem>, D::Error> {
    chain_field("use", d)
}

fn use_on_error_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ChainItem>, D::Error> {
    chain_field("useOnError", d)
}

fn prepend_use_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ChainItem>, D::Error> {
    chain_field("prependUse", d)
}

fn append_use_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ChainItem>, D::Error> {
    chain_field("appendUse", d)
}

fn prepend_use_on_error_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ChainItem>, D::Error> {
    chain_field("prependUseOnError", d)
}

fn append_use_on_error_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ChainItem>, D::Error> {
    chain_field("appendUseOnError", d)
}

/// Default chains shared by every route.
///
/// # Example
///
/// ```
/// use tether_config::RunnerSettings;
///
/// let settings: RunnerSettings = serde_json::from_str(
///     r#"{ "use": ["log-request", "check-method"], "useOnError": ["handle-error"] }"#,
/// )
/// .unwrap();
///
/// assert_eq!(settings.use_chain.len(), 2);
/// assert!(settings.call_done_on_end);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunnerSettings {
    /// The primary chain.
    #[serde(rename = "use", default, deserialize_with = "use_list")]
    pub use_chain: Vec<ChainItem>,

    /// The error chain.
    #[serde(default, alias = "useOnError", deserialize_with = "use_on_error_list")]
    pub use_on_error: Vec<ChainItem>,

    /// Abort the active chain when the response ends.
    #[serde(default = "default_true", alias = "callDoneOnEnd")]
    pub call_done_on_end: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            use_chain: Vec::new(),
            use_on_error: Vec::new(),
            call_done_on_end: true,
        }
    }
}

impl RunnerSettings {
    /// Reads settings from a JSON value, as passed when a runner is built
    /// from dynamic input.
    pub fn from_json(value: Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Per-route adjustments to the default chains.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RouteSettings {
    /// Route descriptor; defaults to the route's key.
    #[serde(default)]
    pub descriptor: Option<String>,

    /// HTTP methods the route serves.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Middleware placed before the default primary chain.
    #[serde(default, alias = "prependUse", deserialize_with = "prepend_use_list")]
    pub prepend_use: Vec<ChainItem>,

    /// Middleware placed after the default primary chain.
    #[serde(default, alias = "appendUse", deserialize_with = "append_use_list")]
    pub append_use: Vec<ChainItem>,

    /// Middleware placed before the default error chain.
    #[serde(
        default,
        alias = "prependUseOnError",
        deserialize_with = "prepend_use_on_error_list"
    )]
    pub prepend_use_on_error: Vec<ChainItem>,

    /// Middleware placed after the default error chain.
    #[serde(
        default,
        alias = "appendUseOnError",
        deserialize_with = "append_use_on_error_list"
    )]
    pub append_use_on_error: Vec<ChainItem>,

    /// Overrides the default `call_done_on_end`.
    #[serde(default, alias = "callDoneOnEnd")]
    pub call_done_on_end: Option<bool>,
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Whether logging is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive, e.g. `info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Whether to log span open/close events.
    #[serde(default)]
    pub span_events: bool,

    /// Whether to include file/line info.
    #[serde(default)]
    pub file_line_info: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
            span_events: false,
            file_line_info: false,
        }
    }
}

impl LoggingSettings {
    /// Converts to the telemetry crate's configuration.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            format: self.format,
            span_events: self.span_events,
            file_line_info: self.file_line_info,
            include_target: true,
        }
    }
}

/// Settings of the error-handling stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ErrorHandlingSettings {
    /// Send server-fault messages to clients instead of a generic message.
    #[serde(default)]
    pub expose_internal_errors: bool,
}

/// Settings of the method-check stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MethodSettings {
    /// Methods refused on every route, e.g. to freeze writes.
    #[serde(default)]
    pub disallowed: Vec<String>,
}

/// Route table keyed by route name.
pub type Routes = BTreeMap<String, RouteSettings>;

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_runner_settings_accept_snake_and_camel_case() {
        let camel = RunnerSettings::from_json(json!({
            "use": ["a"],
            "useOnError": ["b"],
            "callDoneOnEnd": false
        }))
        .unwrap();
        let snake = RunnerSettings::from_json(json!({
            "use": ["a"],
            "use_on_error": ["b"],
            "call_done_on_end": false
        }))
        .unwrap();

        assert_eq!(camel, snake);
        assert!(!camel.call_done_on_end);
    }

    #[test]
    fn test_use_must_be_array() {
        let err = RunnerSettings::from_json(json!({ "use": true })).unwrap_err();
        assert!(err.to_string().contains("`use` parameter must be an array"));
    }

    #[test]
    fn test_use_on_error_must_be_array() {
        let err = RunnerSettings::from_json(json!({ "use": [], "useOnError": true })).unwrap_err();
        assert!(err
            .to_string()
            .contains("`useOnError` parameter must be an array"));
    }

    #[test]
    fn test_null_use_on_error_is_rejected() {
        let err = RunnerSettings::from_json(json!({ "use": [], "useOnError": null })).unwrap_err();
        assert!(err
            .to_string()
            .contains("`useOnError` parameter must be an array"));
    }

    #[test]
    fn test_non_string_items_are_kept() {
        let settings = RunnerSettings::from_json(json!({ "use": ["a", 1, null, {}] })).unwrap();
        assert_eq!(settings.use_chain.len(), 4);
        assert_eq!(settings.use_chain[2], ChainItem::Invalid(Value::Null));
    }

    #[test]
    fn test_chain_item_serializes_back() {
        let items = vec![ChainItem::from("a"), ChainItem::Invalid(json!(5))];
        assert_eq!(serde_json::to_value(&items).unwrap(), json!(["a", 5]));
    }

    #[test]
    fn test_route_settings_lists_validated() {
        let err = serde_json::from_value::<RouteSettings>(json!({ "prependUse": "cors" }))
            .unwrap_err();
        assert!(err.to_string().contains("`prependUse` parameter must be an array"));
    }

    #[test]
    fn test_unknown_runner_field_rejected() {
        assert!(RunnerSettings::from_json(json!({ "use": [], "options": 1, "extra": 1 })).is_err());
    }

    #[test]
    fn test_logging_settings_to_log_config() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            ..LoggingSettings::default()
        };
        let config = settings.to_log_config();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
    }
}
