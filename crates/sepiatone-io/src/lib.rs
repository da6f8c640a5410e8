//! sepiatone-io: execution contexts, retrieval and orchestration.
//!
//! [`Pipeline`] takes a location string and a [`FilterSpec`], retrieves
//! and decodes the image on a background worker, filters it on the
//! delivery thread and invokes the caller's completion exactly once.
//!
//! The pure stages live in `sepiatone-pipeline`; this crate adds the
//! threads, the filesystem access and the delivery guarantees.

mod completion;
pub mod config;
pub mod context;
pub mod fetch;
mod pipeline;

pub use completion::{FilterHandle, PendingFilter};
pub use config::RuntimeConfig;
pub use context::{DELIVERY_THREAD_NAME, SpawnError};
pub use fetch::{Fetch, FileFetcher};
pub use pipeline::Pipeline;
pub use sepiatone_pipeline::{
    DecodedImage, Dimensions, FilterKind, FilterResult, FilterSpec, PipelineError, TransferError,
    Url,
};
