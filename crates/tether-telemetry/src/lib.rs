//! # Tether Telemetry
//!
//! Logging setup for services built on the Tether middleware runtime.
//!
//! The runtime itself only emits `tracing` events and `metrics` counters;
//! this crate wires a `tracing-subscriber` stack that renders them as JSON
//! (production) or pretty text (development).
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production())?;
//! ```

#![doc(html_root_url = "https://docs.rs/tether-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
