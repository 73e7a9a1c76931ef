//! Endpoint metadata.
//!
//! Every runner is bound to one logical route. The route's metadata is
//! copied into each request before the primary chain starts; middleware that
//! runs before routing-dependent stages may rewrite it (for example a
//! catch-all route renaming its descriptor).

use http::Method;
use serde::{Deserialize, Serialize};

/// Metadata describing the logical route a runner serves.
///
/// # Example
///
/// ```
/// use http::Method;
/// use tether_core::EndpointMetadata;
///
/// let endpoint = EndpointMetadata::new("v1/users/:username")
///     .allow_methods([Method::GET, Method::PATCH]);
///
/// assert!(endpoint.allows(&Method::GET));
/// assert!(!endpoint.allows(&Method::DELETE));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMetadata {
    /// Human-readable route descriptor, e.g. `v1/users/:username`.
    pub descriptor: String,

    /// HTTP methods this endpoint serves.
    #[serde(default, with = "methods")]
    pub allowed_methods: Vec<Method>,
}

impl EndpointMetadata {
    /// Creates metadata with the given descriptor and no allowed methods.
    #[must_use]
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            allowed_methods: Vec::new(),
        }
    }

    /// Sets the allowed methods.
    #[must_use]
    pub fn allow_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allowed_methods = methods.into_iter().collect();
        self
    }

    /// Returns true if `method` is among the allowed methods.
    #[must_use]
    pub fn allows(&self, method: &Method) -> bool {
        self.allowed_methods.iter().any(|m| m == method)
    }

    /// Returns the allowed methods as a comma-separated `Allow` header value.
    #[must_use]
    pub fn allow_header(&self) -> String {
        self.allowed_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

mod methods {
    use http::Method;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(methods: &[Method], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(methods.iter().map(Method::as_str))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Method>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|m| {
                Method::from_bytes(m.to_uppercase().as_bytes()).map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
