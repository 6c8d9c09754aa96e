//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{ConfigError, ReconnectSettings, RelayConfig, ServerSettings, UpstreamSettings};
