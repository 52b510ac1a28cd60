//! Application configuration module.
//!
//! Manages the optional TOML file holding the channel selection, the
//! upstream listing coordinates and the fetch window.

#[allow(clippy::module_inception)]
mod config;
mod paths;

#[allow(clippy::module_name_repetitions)]
pub use config::AppConfig;
pub use paths::resolve_config_path;
