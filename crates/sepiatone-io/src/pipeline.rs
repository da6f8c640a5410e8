//! The orchestrator: one location in, exactly one result out.
//!
//! ```text
//! caller thread   validate ──(invalid)──────────────────────────► completion
//!                    │
//! background         └─► fetch ─► decode ──(error)──┐
//!                                   │               │
//! delivery                          └─► filter ─────┴────────────► completion
//! ```
//!
//! Validation failure is the only path where the completion runs on the
//! caller's thread; every other outcome is delivered on the delivery
//! context.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_channel::bounded;
use sepiatone_pipeline::{
    DecodedImage, FilterResult, FilterSpec, PipelineError, TransferError, Url, apply_filter,
    decode_image, parse_location,
};
use tracing::{debug, info, warn};

use crate::completion::{Completion, FilterHandle, PendingFilter};
use crate::config::RuntimeConfig;
use crate::context::{BackgroundPool, DeliveryQueue, SpawnError, panic_message};
use crate::fetch::{Fetch, FileFetcher};

/// Runs the validate -> fetch -> decode -> filter -> deliver sequence.
///
/// Create one and reuse it for all invocations. Invocations are
/// independent: they share no mutable state and complete in any order.
///
/// Completion callbacks run on the single delivery thread, so a callback
/// that blocks delays every other delivery.
///
/// Dropping the pipeline waits for queued invocations to complete.
pub struct Pipeline {
    fetcher: Arc<dyn Fetch>,
    // Field order matters: the pool must shut down (and flush its
    // deliveries) before the delivery queue joins its thread.
    pool: BackgroundPool,
    delivery: DeliveryQueue,
    next_id: AtomicU64,
}

impl Pipeline {
    /// Start a pipeline that reads `file:` URLs with [`FileFetcher`].
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if a context thread cannot be started.
    pub fn new(config: &RuntimeConfig) -> Result<Self, SpawnError> {
        Self::with_fetcher(config, FileFetcher::new(config.max_bytes))
    }

    /// Start a pipeline with a custom retrieval facility.
    ///
    /// `config.max_bytes` is not applied to custom fetchers.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if a context thread cannot be started.
    pub fn with_fetcher(config: &RuntimeConfig, fetcher: impl Fetch) -> Result<Self, SpawnError> {
        let delivery = DeliveryQueue::new()?;
        let pool = BackgroundPool::new(config.worker_count())?;
        Ok(Self {
            fetcher: Arc::new(fetcher),
            pool,
            delivery,
            next_id: AtomicU64::new(0),
        })
    }

    /// Fetch the image at `location`, apply `filter`, and hand the
    /// outcome to `completion`.
    ///
    /// Returns immediately. `completion` is invoked exactly once:
    ///
    /// - with [`PipelineError::InvalidUrl`] before this returns, on the
    ///   caller's thread, if `location` does not parse (no background
    ///   work is scheduled);
    /// - otherwise later, on the delivery thread, with the filtered image
    ///   or the first error encountered ([`PipelineError::TransferFailure`],
    ///   [`PipelineError::InvalidData`], [`PipelineError::FilterFailure`]
    ///   or [`PipelineError::Cancelled`]).
    pub fn apply_filter(
        &self,
        location: &str,
        filter: FilterSpec,
        completion: impl FnOnce(FilterResult) + Send + 'static,
    ) -> FilterHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (completion, handle) =
            Completion::new(id, Box::new(completion), self.delivery.handle());

        let url = match parse_location(location) {
            Ok(url) => url,
            Err(err) => {
                warn!(id, location, "rejected invalid location");
                completion.finish(Err(err));
                return handle;
            }
        };

        info!(id, %url, ?filter, "invocation accepted");
        let fetcher = Arc::clone(&self.fetcher);
        self.pool.spawn(move || {
            let outcome = retrieve_and_decode(&completion, &url, fetcher.as_ref());
            match outcome {
                Ok(decoded) => completion.deliver_with(move || filter_stage(id, &decoded, &filter)),
                Err(err) => {
                    warn!(id, %url, error = %err, "invocation failed before filtering");
                    completion.deliver(Err(err));
                }
            }
        });
        handle
    }

    /// Like [`apply_filter`](Self::apply_filter), but the result arrives
    /// on a one-message channel instead of a callback.
    pub fn submit(&self, location: &str, filter: FilterSpec) -> PendingFilter {
        let (tx, rx) = bounded(1);
        let handle = self.apply_filter(location, filter, move |result| {
            // The receiver may already be gone; nobody is waiting then.
            let _ = tx.send(result);
        });
        PendingFilter { rx, handle }
    }

    /// Number of invocations that reached the background context.
    #[must_use]
    pub fn jobs_submitted(&self) -> u64 {
        self.pool.jobs_submitted()
    }

    /// Identity of the thread every asynchronous completion runs on.
    #[must_use]
    pub const fn delivery_thread_id(&self) -> std::thread::ThreadId {
        self.delivery.thread_id()
    }
}

/// Background half: fetch the bytes and decode them.
///
/// A panicking fetcher is reported as [`TransferError::Panicked`].
fn retrieve_and_decode(
    completion: &Completion,
    url: &Url,
    fetcher: &dyn Fetch,
) -> FilterResult<DecodedImage> {
    let id = completion.id();
    if completion.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let started = Instant::now();
    let bytes = catch_unwind(AssertUnwindSafe(|| fetcher.fetch(url)))
        .unwrap_or_else(|payload| Err(TransferError::Panicked(panic_message(payload.as_ref()))))?;
    debug!(id, bytes = bytes.len(), elapsed = ?started.elapsed(), "retrieved");

    let started = Instant::now();
    let decoded = decode_image(&bytes)?;
    drop(bytes);
    debug!(
        id,
        width = decoded.width(),
        height = decoded.height(),
        elapsed = ?started.elapsed(),
        "decoded"
    );

    if completion.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(decoded)
}

/// Delivery half: apply the filter.
fn filter_stage(id: u64, decoded: &DecodedImage, filter: &FilterSpec) -> FilterResult {
    let started = Instant::now();
    let result = apply_filter(decoded, filter);
    match &result {
        Ok(_) => debug!(id, elapsed = ?started.elapsed(), "filtered"),
        Err(err) => warn!(id, error = %err, "filter failed"),
    }
    result
}
