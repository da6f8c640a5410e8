//! The two execution contexts an invocation runs on.
//!
//! - [`BackgroundPool`]: a fixed set of worker threads for retrieval and
//!   decoding. Jobs from different invocations run in any order.
//! - [`DeliveryQueue`]: one thread that runs delivery jobs strictly in
//!   submission order. Filtering and every completion callback run here.
//!
//! Both are plain named threads draining a crossbeam channel of boxed
//! closures. A job that panics is logged and discarded; the thread keeps
//! serving.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

/// Name of the delivery thread.
pub const DELIVERY_THREAD_NAME: &str = "sepiatone-delivery";

/// Prefix of background worker thread names (`sepiatone-bg-0`, ...).
pub const BACKGROUND_THREAD_PREFIX: &str = "sepiatone-bg";

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A context thread could not be started.
#[derive(Debug, thiserror::Error)]
#[error("failed to spawn thread `{name}`: {source}")]
pub struct SpawnError {
    /// Name of the thread that failed to start.
    pub name: String,
    /// Underlying OS error.
    #[source]
    pub source: std::io::Error,
}

/// Worker threads for potentially slow or blocking stages.
pub struct BackgroundPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    submitted: AtomicU64,
}

impl BackgroundPool {
    /// Spawn `workers` threads (at least one).
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if the OS refuses to create a thread. Any
    /// threads already started exit once the pool is dropped.
    pub fn new(workers: usize) -> Result<Self, SpawnError> {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let count = workers.max(1);
        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let name = format!("{BACKGROUND_THREAD_PREFIX}-{index}");
            handles.push(spawn_context_thread(name, rx.clone())?);
        }
        debug!(workers = count, "background pool started");
        Ok(Self {
            tx: Some(tx),
            workers: handles,
            submitted: AtomicU64::new(0),
        })
    }

    /// Queue `job` for any free worker.
    ///
    /// If the pool is shutting down the job is dropped without running;
    /// owned guards inside it observe that through their `Drop`.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        if let Some(tx) = &self.tx
            && tx.send(Box::new(job)).is_err()
        {
            warn!("background pool closed, job discarded");
        }
    }

    /// Total number of jobs ever handed to [`spawn`](Self::spawn).
    #[must_use]
    pub fn jobs_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

impl Drop for BackgroundPool {
    fn drop(&mut self) {
        // Closing the channel lets each worker finish its queue and exit.
        self.tx.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("background worker exited by panic");
            }
        }
    }
}

/// Cloneable sender into the delivery context.
#[derive(Clone)]
pub struct DeliveryHandle {
    tx: Sender<Job>,
}

impl DeliveryHandle {
    /// Queue `job` on the delivery thread.
    ///
    /// The thread outlives every handle, so the send only fails if the
    /// thread itself died; the job is then dropped and logged.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            warn!("delivery context closed, dropping job");
        }
    }
}

/// A single serialized delivery thread.
pub struct DeliveryQueue {
    handle: DeliveryHandle,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl DeliveryQueue {
    /// Spawn the delivery thread.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if the OS refuses to create the thread.
    pub fn new() -> Result<Self, SpawnError> {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let thread = spawn_context_thread(DELIVERY_THREAD_NAME.to_owned(), rx)?;
        let thread_id = thread.thread().id();
        Ok(Self {
            handle: DeliveryHandle { tx },
            thread: Some(thread),
            thread_id,
        })
    }

    /// A sender for queuing delivery jobs.
    ///
    /// Outstanding handles keep the delivery thread alive, so every job
    /// queued through one runs before the queue shuts down.
    #[must_use]
    pub fn handle(&self) -> DeliveryHandle {
        self.handle.clone()
    }

    /// Identity of the delivery thread.
    #[must_use]
    pub const fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Returns `true` when called from the delivery thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for DeliveryQueue {
    fn drop(&mut self) {
        // Swap our sender for a disconnected one so the thread sees the
        // channel close once every outstanding handle is gone.
        let (closed, _) = crossbeam_channel::bounded(0);
        drop(std::mem::replace(&mut self.handle, DeliveryHandle { tx: closed }));
        // Joining ourselves would deadlock; the thread exits on its own
        // once the last handle goes away.
        if self.is_current() {
            return;
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("delivery thread exited by panic");
        }
    }
}

fn spawn_context_thread(name: String, rx: Receiver<Job>) -> Result<JoinHandle<()>, SpawnError> {
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || run_jobs(&rx))
        .map_err(|source| SpawnError { name, source })
}

fn run_jobs(rx: &Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
            let current = thread::current();
            warn!(
                thread = current.name().unwrap_or("?"),
                panic = %panic_message(payload.as_ref()),
                "context job panicked"
            );
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
