//! ---
//! pulse_section: "02-logging-pipeline"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Trace context scoping and the process default identifier."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
//! Trace context for log correlation.
//!
//! Each request runs inside its own [`TraceContext::scope`], backed by tokio
//! task-local storage, so concurrently handled requests never observe each
//! other's identifiers. Work running outside any scope falls back to a
//! process-wide default, and finally to [`TRACE_ID_SENTINEL`].

use std::cell::RefCell;
use std::future::Future;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use uuid::Uuid;

/// Identifier reported when no trace context is active.
pub const TRACE_ID_SENTINEL: &str = "N/A";

static PROCESS_DEFAULT: Lazy<RwLock<Option<String>>> = Lazy::new(|| RwLock::new(None));

tokio::task_local! {
    static ACTIVE: RefCell<TraceContext>;
}

/// Serializes tests that read or write the process default.
#[cfg(test)]
pub(crate) static DEFAULT_SLOT_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

/// Correlation identifiers attached to one logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: String,
    request_id: Option<String>,
}

impl TraceContext {
    /// Create a context for an explicit trace identifier.
    ///
    /// An empty identifier is replaced by the sentinel so records never carry a
    /// blank trace field.
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: non_empty_or_sentinel(trace_id.into()),
            request_id: None,
        }
    }

    /// Create a context with a freshly generated trace identifier.
    pub fn generate() -> Self {
        Self::new(generate_trace_id())
    }

    /// Attach a request identifier.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        self.request_id = (!request_id.is_empty()).then_some(request_id);
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Run `future` with this context active for every record it emits.
    pub async fn scope<F>(self, future: F) -> F::Output
    where
        F: Future,
    {
        ACTIVE.scope(RefCell::new(self), future).await
    }

    /// Synchronous counterpart of [`TraceContext::scope`].
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        ACTIVE.sync_scope(RefCell::new(self), f)
    }

    /// Replace the active trace identifier.
    ///
    /// Inside a scope only that scope is affected. Outside any scope the
    /// process default is replaced, last write wins.
    pub fn set(trace_id: impl Into<String>) {
        let trace_id = non_empty_or_sentinel(trace_id.into());
        let replaced = ACTIVE
            .try_with(|slot| match slot.try_borrow_mut() {
                Ok(mut active) => {
                    active.trace_id = trace_id.clone();
                    true
                }
                Err(_) => false,
            })
            .unwrap_or(false);
        if !replaced {
            *PROCESS_DEFAULT.write() = Some(trace_id);
        }
    }

    /// Forget the process default identifier.
    pub fn clear_default() {
        PROCESS_DEFAULT.write().take();
    }

    /// The active trace identifier, the process default, or the sentinel.
    pub fn current() -> String {
        ACTIVE
            .try_with(|slot| slot.try_borrow().ok().map(|active| active.trace_id.clone()))
            .ok()
            .flatten()
            .or_else(|| PROCESS_DEFAULT.read().clone())
            .unwrap_or_else(|| TRACE_ID_SENTINEL.to_owned())
    }

    /// Request identifier of the active scope, if any.
    pub fn current_request_id() -> Option<String> {
        ACTIVE
            .try_with(|slot| {
                slot.try_borrow()
                    .ok()
                    .and_then(|active| active.request_id.clone())
            })
            .ok()
            .flatten()
    }
}

/// Generate a 32 character hexadecimal trace identifier.
pub fn generate_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn non_empty_or_sentinel(value: String) -> String {
    if value.trim().is_empty() {
        TRACE_ID_SENTINEL.to_owned()
    } else {
        value
    }
}
