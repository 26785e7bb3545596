//! ---
//! pulse_section: "02-logging-pipeline"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Trace-correlated logging pipeline: enrichment, renderers and sinks."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
//! Trace-correlated logging pipeline.
//!
//! Events emitted through `tracing` are captured by [`PipelineLayer`],
//! enriched with the active [`TraceContext`] and written to every [`Sink`]
//! whose minimum severity admits them, either as a human-readable line or as
//! a JSON document.

pub mod format;
pub mod instrument;
pub mod layer;
pub mod record;
pub mod rotation;
pub mod trace;

pub use format::RecordFormat;
pub use instrument::{call_instrumented, call_instrumented_async, instrument, CallObserver, TracingObserver};
pub use layer::{PipelineLayer, Sink};
pub use record::{enrich, LogRecord, RawRecord};
pub use rotation::{RotatingFile, RotationPolicy};
pub use trace::{generate_trace_id, TraceContext, TRACE_ID_SENTINEL};
