//! ---
//! pulse_section: "05-networking-external-interfaces"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "HTTP surface, listener lifecycle and signal bridge."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---

use std::fmt;
use std::sync::Arc;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use pulse_common::AppConfig;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod signal;

pub use error::ApiError;
pub use lifecycle::{ApiListener, LifecycleError, ListenerState, StopOutcome};
pub use middleware::{REQUEST_ID_HEADER, TRACE_ID_HEADER};
pub use signal::{termination_signals, SignalBridge, TerminationSignal};

/// Shared API state exposed to handlers.
pub struct ApiState {
    environment: String,
}

impl ApiState {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.environment.clone())
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("environment", &self.environment)
            .finish()
    }
}

/// Routes of the service, wrapped in the request pipeline.
///
/// A known path hit with an unsupported method is answered like an unknown
/// path.
pub fn build_router(state: Arc<ApiState>) -> Router {
    let routes = Router::new()
        .route("/", get(handlers::index).fallback(handlers::not_found))
        .route("/health", get(handlers::health).fallback(handlers::not_found))
        .route(
            "/api/v1/data",
            get(handlers::list_data)
                .post(handlers::create)
                .fallback(handlers::not_found),
        )
        .fallback(handlers::not_found)
        .with_state(state);
    with_request_pipeline(routes)
}

/// Wrap arbitrary routes in panic recovery, per-request trace scoping and
/// HTTP spans.
pub fn with_request_pipeline(routes: Router) -> Router {
    routes
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(from_fn(middleware::trace_requests))
        .layer(TraceLayer::new_for_http())
}
