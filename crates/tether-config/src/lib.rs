//! Typed configuration for Tether.
//!
//! Runners can be described declaratively: default chains by middleware
//! name, per-route additions, and the settings of the bundled stages.
//! Configuration is layered (defaults → file → env) and strict: unknown
//! fields are rejected, and a chain list given as anything but an array
//! fails with ``"`use` parameter must be an array"`` (or the
//! `useOnError` equivalent).
//!
//! # Example
//!
//! ```no_run
//! use tether_config::ConfigLoader;
//!
//! # fn main() -> Result<(), tether_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()
//!     .with_optional_file("tether.toml")?
//!     .with_env_prefix("TETHER")
//!     .load()?;
//!
//! println!("default chain: {:?}", config.runner.use_chain);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [runner]
//! use = ["log-request", "check-method"]
//! use_on_error = ["handle-error"]
//! call_done_on_end = true
//!
//! [routes.users]
//! descriptor = "v1/users/:username"
//! methods = ["GET", "PATCH", "DELETE"]
//! prepend_use = ["authenticate"]
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [error_handling]
//! expose_internal_errors = false
//!
//! [methods]
//! disallowed = ["DELETE"]
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `TETHER__RUNNER__USE=log-request,check-method`
//! - `TETHER__RUNNER__CALL_DONE_ON_END=false`
//! - `TETHER__LOGGING__LEVEL=debug`
//! - `TETHER__METHODS__DISALLOWED=POST,PUT`

#![doc(html_root_url = "https://docs.rs/tether-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{TetherConfig, TetherConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    parse_chain_list, ChainItem, ErrorHandlingSettings, LoggingSettings, MethodSettings,
    RouteSettings, Routes, RunnerSettings,
};
