//! Configuration plane: descriptor model, environment substitution, pluggable
//! loaders, and the hot validated registry.

pub mod app_config;
pub mod env;
pub mod loader;
pub mod model;
pub mod registry;

pub use app_config::AppConfig;
pub use registry::{ConfigRegistry, Generation, ValidationReport};
