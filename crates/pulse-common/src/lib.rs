//! ---
//! pulse_section: "01-core-functionality"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Shared configuration, tracing setup and time helpers."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
//! Shared primitives for the Pulse workspace.
//! This crate exposes configuration loading, tracing initialisation and the
//! timestamp helpers used by response payloads.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{ApiConfig, AppConfig, LoggingConfig};
pub use logging::{build_pipeline, init_tracing, LoggingGuard};

/// Service name reported in logs and payloads.
pub const SERVICE_NAME: &str = "pulse";
/// Version reported by the health and index endpoints.
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
