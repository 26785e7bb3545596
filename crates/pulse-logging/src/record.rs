//! ---
//! pulse_section: "02-logging-pipeline"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Log record model, field extraction and trace enrichment."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
use std::fmt::{self, Write as _};

use chrono::{DateTime, Local};
use tracing::field::{Field, Visit};
use tracing::{Event, Level};

use crate::trace::TraceContext;

/// Field name callers use to pin an explicit trace identifier.
pub const TRACE_ID_FIELD: &str = "trace_id";
/// Field name carrying a request identifier.
pub const REQUEST_ID_FIELD: &str = "request_id";
/// Field name carrying a rendered failure trace.
pub const EXCEPTION_FIELD: &str = "exception";

/// A record captured from an event before trace enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub name: String,
    pub module: String,
    pub line: u32,
    pub message: String,
    pub trace_id: Option<String>,
    pub request_id: Option<String>,
    pub exception: Option<String>,
}

impl RawRecord {
    /// Start a record stamped with the current local time.
    pub fn new(level: Level, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            name: name.into(),
            module: String::new(),
            line: 0,
            message: message.into(),
            trace_id: None,
            request_id: None,
            exception: None,
        }
    }

    pub fn with_location(mut self, module: impl Into<String>, line: u32) -> Self {
        self.module = module.into();
        self.line = line;
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Capture a tracing event, keeping caller supplied correlation fields.
    pub fn from_event(event: &Event<'_>) -> Self {
        let metadata = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        Self {
            timestamp: Local::now(),
            level: *metadata.level(),
            name: metadata.target().to_owned(),
            module: module_name(metadata.module_path(), metadata.file(), metadata.target()),
            line: metadata.line().unwrap_or_default(),
            message: visitor.message_with_extras(),
            trace_id: visitor.trace_id,
            request_id: visitor.request_id,
            exception: visitor.exception,
        }
    }
}

/// A fully enriched record, shared by every sink.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub name: String,
    pub module: String,
    pub line: u32,
    pub trace_id: String,
    pub message: String,
    pub request_id: Option<String>,
    pub exception: Option<String>,
}

/// Attach correlation identifiers to a raw record.
///
/// An explicit non-empty `trace_id` wins; otherwise the active
/// [`TraceContext`] (or its sentinel) is used. The request identifier follows
/// the same rule but may remain absent.
pub fn enrich(raw: RawRecord) -> LogRecord {
    let trace_id = raw
        .trace_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(TraceContext::current);
    let request_id = raw
        .request_id
        .filter(|id| !id.trim().is_empty())
        .or_else(TraceContext::current_request_id);

    LogRecord {
        timestamp: raw.timestamp,
        level: raw.level,
        name: raw.name,
        module: raw.module,
        line: raw.line,
        trace_id,
        message: raw.message,
        request_id,
        exception: raw.exception,
    }
}

fn module_name(module_path: Option<&str>, file: Option<&str>, target: &str) -> String {
    if let Some(path) = module_path {
        if let Some(last) = path.rsplit("::").next() {
            return last.to_owned();
        }
    }
    file.and_then(|file| std::path::Path::new(file).file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| target.to_owned())
}

/// Splits event fields into reserved correlation fields and free-form extras.
#[derive(Debug, Default)]
struct RecordVisitor {
    message: Option<String>,
    trace_id: Option<String>,
    request_id: Option<String>,
    exception: Option<String>,
    extras: Vec<(&'static str, String)>,
}

impl RecordVisitor {
    fn store(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            TRACE_ID_FIELD => self.trace_id = Some(value),
            REQUEST_ID_FIELD => self.request_id = Some(value),
            EXCEPTION_FIELD => self.exception = Some(value),
            name if name.starts_with("log.") => {}
            name => self.extras.push((name, value)),
        }
    }

    fn message_with_extras(&self) -> String {
        let mut message = self.message.clone().unwrap_or_default();
        for (name, value) in &self.extras {
            if !message.is_empty() {
                message.push(' ');
            }
            let _ = write!(message, "{name}={value}");
        }
        message
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.store(field, value.to_owned());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.store(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.store(field, format!("{value:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{DEFAULT_SLOT_LOCK, TRACE_ID_SENTINEL};

    #[test]
    fn explicit_trace_id_is_kept() {
        let raw = RawRecord::new(Level::INFO, "app", "hello").with_trace_id("explicit");
        let record = TraceContext::new("ambient").sync_scope(|| enrich(raw));
        assert_eq!(record.trace_id, "explicit");
    }

    #[test]
    fn active_context_fills_missing_trace_id() {
        let raw = RawRecord::new(Level::INFO, "app", "hello");
        let record = TraceContext::new("ambient")
            .with_request_id("req-7")
            .sync_scope(|| enrich(raw));
        assert_eq!(record.trace_id, "ambient");
        assert_eq!(record.request_id.as_deref(), Some("req-7"));
    }

    #[test]
    fn blank_explicit_trace_id_falls_back_to_context() {
        let raw = RawRecord::new(Level::WARN, "app", "hello").with_trace_id(" ");
        let record = TraceContext::new("ambient").sync_scope(|| enrich(raw));
        assert_eq!(record.trace_id, "ambient");
    }

    #[test]
    fn sentinel_without_context() {
        let _slot = DEFAULT_SLOT_LOCK.lock();
        let record = enrich(RawRecord::new(Level::DEBUG, "app", "hello"));
        assert_eq!(record.trace_id, TRACE_ID_SENTINEL);
        assert!(record.request_id.is_none());
    }

    #[test]
    fn location_and_exception_survive_enrichment() {
        let raw = RawRecord::new(Level::ERROR, "pulse_api::handlers", "Exception in create_data: boom")
            .with_location("handlers", 88)
            .with_exception("boom\n\nCaused by:\n    disk full");
        let record = TraceContext::new("ambient").sync_scope(|| enrich(raw));
        assert_eq!(record.module, "handlers");
        assert_eq!(record.line, 88);
        assert_eq!(record.exception.as_deref(), Some("boom\n\nCaused by:\n    disk full"));
        assert_eq!(record.trace_id, "ambient");
    }

    #[test]
    fn module_name_prefers_module_path() {
        assert_eq!(
            module_name(Some("pulse_api::handlers"), Some("src/handlers.rs"), "t"),
            "handlers"
        );
        assert_eq!(module_name(None, Some("src/server.rs"), "t"), "server");
        assert_eq!(module_name(None, None, "target"), "target");
    }

    #[test]
    fn extras_are_appended_to_message() {
        let visitor = RecordVisitor {
            message: Some("listener running".into()),
            extras: vec![("address", "127.0.0.1:8080".into()), ("workers", "1".into())],
            ..RecordVisitor::default()
        };
        assert_eq!(
            visitor.message_with_extras(),
            "listener running address=127.0.0.1:8080 workers=1"
        );
    }
}
