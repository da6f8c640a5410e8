//! Single-shot completion delivery.
//!
//! A [`Completion`] owns the caller's callback for one invocation. The
//! only ways to get rid of it are to finish it (callback runs with the
//! result) or to drop it (callback runs with
//! [`PipelineError::Cancelled`]), so the callback runs exactly once on
//! every path. Stage panics are caught and finished as stage errors;
//! the drop path only covers a job that never ran.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use sepiatone_pipeline::{FilterResult, PipelineError};
use tracing::warn;

use crate::context::{DeliveryHandle, panic_message};

pub(crate) type Callback = Box<dyn FnOnce(FilterResult) + Send + 'static>;

/// Flags shared between a [`FilterHandle`] and its [`Completion`].
#[derive(Debug, Default)]
struct InvocationState {
    cancelled: AtomicBool,
    finished: AtomicBool,
}

/// Caller-side view of one invocation.
///
/// Dropping the handle does not cancel anything.
#[derive(Debug, Clone)]
pub struct FilterHandle {
    id: u64,
    state: Arc<InvocationState>,
}

impl FilterHandle {
    /// Identifier of the invocation, unique per [`Pipeline`](crate::Pipeline).
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation.
    ///
    /// Honored before retrieval, after decoding and on the delivery
    /// context before filtering; the completion then receives
    /// [`PipelineError::Cancelled`]. A no-op once the completion has run.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once the completion callback has been invoked.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::Acquire)
    }
}

/// Owner of the completion callback for one invocation.
pub(crate) struct Completion {
    id: u64,
    callback: Option<Callback>,
    delivery: DeliveryHandle,
    state: Arc<InvocationState>,
}

impl Completion {
    /// Pair a fresh completion with the handle returned to the caller.
    pub(crate) fn new(
        id: u64,
        callback: Callback,
        delivery: DeliveryHandle,
    ) -> (Self, FilterHandle) {
        let state = Arc::new(InvocationState::default());
        let handle = FilterHandle {
            id,
            state: Arc::clone(&state),
        };
        let completion = Self {
            id,
            callback: Some(callback),
            delivery,
            state,
        };
        (completion, handle)
    }

    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Invoke the callback on the current thread.
    pub(crate) fn finish(mut self, result: FilterResult) {
        if let Some(callback) = self.callback.take() {
            self.state.finished.store(true, Ordering::Release);
            callback(result);
        }
    }

    /// Hand `result` to the delivery context and invoke the callback there.
    pub(crate) fn deliver(self, result: FilterResult) {
        let delivery = self.delivery.clone();
        delivery.dispatch(move || self.finish(result));
    }

    /// Run the filter `stage` on the delivery context, then invoke the
    /// callback with its result. Skips `stage` if cancellation was
    /// requested meanwhile; a panicking stage ends in
    /// [`PipelineError::FilterFailure`].
    pub(crate) fn deliver_with(self, stage: impl FnOnce() -> FilterResult + Send + 'static) {
        let delivery = self.delivery.clone();
        delivery.dispatch(move || {
            if self.is_cancelled() {
                self.finish(Err(PipelineError::Cancelled));
                return;
            }
            let result = catch_unwind(AssertUnwindSafe(stage)).unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                warn!(id = self.id, panic = %message, "filter stage panicked");
                Err(PipelineError::FilterFailure(format!("filter panicked: {message}")))
            });
            self.finish(result);
        });
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        warn!(id = self.id, "invocation dropped before completing, delivering cancellation");
        let state = Arc::clone(&self.state);
        self.delivery.dispatch(move || {
            state.finished.store(true, Ordering::Release);
            callback(Err(PipelineError::Cancelled));
        });
    }
}

/// An invocation whose result arrives on a one-message channel.
///
/// Returned by [`Pipeline::submit`](crate::Pipeline::submit).
#[derive(Debug)]
pub struct PendingFilter {
    pub(crate) rx: Receiver<FilterResult>,
    pub(crate) handle: FilterHandle,
}

impl PendingFilter {
    /// The invocation's handle, for cancellation.
    #[must_use]
    pub const fn handle(&self) -> &FilterHandle {
        &self.handle
    }

    /// Block until the result arrives.
    ///
    /// # Errors
    ///
    /// Returns whichever [`PipelineError`] the invocation ended with.
    pub fn wait(self) -> FilterResult {
        self.rx.recv().unwrap_or(Err(PipelineError::Cancelled))
    }

    /// Block for at most `timeout`.
    ///
    /// Returns `None` if the result has not arrived in time; the
    /// invocation keeps running and `self` can be waited on again.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<FilterResult> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(PipelineError::Cancelled)),
        }
    }
}
