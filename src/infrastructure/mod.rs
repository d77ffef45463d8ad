//! Ambient infrastructure: configuration loading and logging setup.

pub mod config;
pub mod logging;

pub use config::ConfigLoader;
pub use logging::LoggerGuard;
