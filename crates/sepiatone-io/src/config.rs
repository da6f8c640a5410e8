//! Runtime configuration for [`Pipeline`](crate::Pipeline).

use serde::{Deserialize, Serialize};

/// Sizing and limits for the execution contexts and the default fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of background worker threads. Zero is treated as one.
    pub background_workers: usize,

    /// Largest resource the default fetcher will read, in bytes.
    /// `None` disables the limit.
    pub max_bytes: Option<u64>,
}

impl RuntimeConfig {
    /// Default number of background workers.
    pub const DEFAULT_BACKGROUND_WORKERS: usize = 2;

    /// Default retrieval limit: 64 MiB.
    pub const DEFAULT_MAX_BYTES: Option<u64> = Some(64 * 1024 * 1024);

    /// Worker count actually spawned.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.background_workers.max(1)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            background_workers: Self::DEFAULT_BACKGROUND_WORKERS,
            max_bytes: Self::DEFAULT_MAX_BYTES,
        }
    }
}
