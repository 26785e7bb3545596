//! ---
//! pulse_section: "02-logging-pipeline"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Call-boundary instrumentation logging entry, return and failure."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
//! Uniform logging around operation boundaries.
//!
//! An instrumented call emits one DEBUG record before the operation runs and
//! either one DEBUG record with the returned value or two ERROR records (the
//! failure message, then the full failure trace). The operation's result is
//! handed back untouched.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error};

/// Hooks invoked around an instrumented operation.
pub trait CallObserver: Send + Sync {
    fn on_call(&self, op: &str, args: &dyn Debug);
    fn on_return(&self, op: &str, value: &dyn Debug);
    fn on_error(&self, op: &str, message: &dyn Display, trace: &dyn Debug);
}

impl<O: CallObserver + ?Sized> CallObserver for &O {
    fn on_call(&self, op: &str, args: &dyn Debug) {
        (**self).on_call(op, args)
    }

    fn on_return(&self, op: &str, value: &dyn Debug) {
        (**self).on_return(op, value)
    }

    fn on_error(&self, op: &str, message: &dyn Display, trace: &dyn Debug) {
        (**self).on_error(op, message, trace)
    }
}

impl<O: CallObserver + ?Sized> CallObserver for Arc<O> {
    fn on_call(&self, op: &str, args: &dyn Debug) {
        (**self).on_call(op, args)
    }

    fn on_return(&self, op: &str, value: &dyn Debug) {
        (**self).on_return(op, value)
    }

    fn on_error(&self, op: &str, message: &dyn Display, trace: &dyn Debug) {
        (**self).on_error(op, message, trace)
    }
}

/// Observer that reports through `tracing`, and so through the pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CallObserver for TracingObserver {
    fn on_call(&self, op: &str, args: &dyn Debug) {
        debug!("Calling {op} with args={args:?}");
    }

    fn on_return(&self, op: &str, value: &dyn Debug) {
        debug!("{op} returned {value:?}");
    }

    fn on_error(&self, op: &str, message: &dyn Display, trace: &dyn Debug) {
        error!("Exception in {op}: {message}");
        error!(exception = %format!("{trace:?}"), "{op} failure trace");
    }
}

fn observe<T, E>(observer: &impl CallObserver, op: &str, result: &Result<T, E>)
where
    T: Debug,
    E: Display + Debug,
{
    match result {
        Ok(value) => observer.on_return(op, value),
        Err(err) => observer.on_error(op, err, err),
    }
}

/// Run `op(args)` between the observer's hooks and return its result as is.
pub fn call_instrumented<A, T, E, F>(
    observer: &impl CallObserver,
    name: &str,
    args: A,
    op: F,
) -> Result<T, E>
where
    A: Debug,
    T: Debug,
    E: Display + Debug,
    F: FnOnce(A) -> Result<T, E>,
{
    observer.on_call(name, &args);
    let result = op(args);
    observe(observer, name, &result);
    result
}

/// Async counterpart of [`call_instrumented`]; the future is awaited in place.
pub async fn call_instrumented_async<A, T, E, F, Fut>(
    observer: &impl CallObserver,
    name: &str,
    args: A,
    op: F,
) -> Result<T, E>
where
    A: Debug,
    T: Debug,
    E: Display + Debug,
    F: FnOnce(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    observer.on_call(name, &args);
    let result = op(args).await;
    observe(observer, name, &result);
    result
}

/// Wrap `op` into a function with the same signature that logs every call.
///
/// Operations of several arguments take them as a tuple.
pub fn instrument<A, T, E, O, F>(name: &'static str, observer: O, op: F) -> impl Fn(A) -> Result<T, E>
where
    A: Debug,
    T: Debug,
    E: Display + Debug,
    O: CallObserver,
    F: Fn(A) -> Result<T, E>,
{
    move |args| call_instrumented(&observer, name, args, &op)
}
