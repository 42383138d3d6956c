//! Tenantry Server: configuration, tracing setup and the service layer
//! that composes routing, authorization, quotas and auditing.

pub mod app;
pub mod config;
pub mod service;
pub mod telemetry;

pub use app::Tenantry;
pub use config::{ConfigError, ServerConfig};
