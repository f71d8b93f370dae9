// src/exec/panic_trace.rs

//! Stack traces for panics escaping processors and resource hooks.
//!
//! A process-wide panic hook records a backtrace into the [`PanicTrace`] of
//! the job being polled (a Tokio task-local), or of the closure run under
//! [`PanicTrace::sync_scope`]. The previous hook still runs afterwards.

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic;
use std::sync::{Arc, Mutex, Once};

tokio::task_local! {
    static CURRENT: PanicTrace;
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let _ = CURRENT.try_with(|trace| trace.record(Backtrace::force_capture().to_string()));
            previous(info);
        }));
    });
}

/// Slot receiving the backtrace of the last panic inside its scope.
#[derive(Debug, Clone, Default)]
pub struct PanicTrace {
    slot: Arc<Mutex<Option<String>>>,
}

impl PanicTrace {
    pub fn new() -> Self {
        install_hook();
        Self::default()
    }

    /// Trace of the enclosing scope, if any.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }

    pub fn scope<F: Future>(self, fut: F) -> impl Future<Output = F::Output> {
        CURRENT.scope(self, fut)
    }

    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }

    fn record(&self, trace: String) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(trace);
        }
    }

    pub fn take(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }

    /// `panic: <payload>` followed by the recorded stack trace.
    pub fn describe(&self, payload: Box<dyn Any + Send>) -> String {
        let message = panic_message(payload);
        match self.take() {
            Some(trace) => format!("panic: {message}\nstack backtrace:\n{trace}"),
            None => format!("panic: {message}"),
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
