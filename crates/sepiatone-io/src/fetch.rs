//! Byte retrieval.
//!
//! [`Fetch`] is the contract the orchestrator expects from a retrieval
//! facility: a validated URL in, the resource's bytes or a
//! [`TransferError`] out. It runs on a background worker, so blocking is
//! fine.

use std::fs::File;
use std::io::Read;

use sepiatone_pipeline::{TransferError, Url};

/// Retrieves the raw bytes behind a URL.
pub trait Fetch: Send + Sync + 'static {
    /// Fetch every byte of the resource at `location`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] describing why the bytes could not be
    /// retrieved.
    fn fetch(&self, location: &Url) -> Result<Vec<u8>, TransferError>;
}

impl<F> Fetch for F
where
    F: Fn(&Url) -> Result<Vec<u8>, TransferError> + Send + Sync + 'static,
{
    fn fetch(&self, location: &Url) -> Result<Vec<u8>, TransferError> {
        self(location)
    }
}

/// Reads `file:` URLs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher {
    max_bytes: Option<u64>,
}

impl FileFetcher {
    /// A fetcher that refuses resources larger than `max_bytes`.
    #[must_use]
    pub const fn new(max_bytes: Option<u64>) -> Self {
        Self { max_bytes }
    }
}

impl Fetch for FileFetcher {
    fn fetch(&self, location: &Url) -> Result<Vec<u8>, TransferError> {
        if location.scheme() != "file" {
            return Err(TransferError::UnsupportedScheme(location.scheme().to_owned()));
        }
        let path = location
            .to_file_path()
            .map_err(|()| TransferError::NotAFilePath)?;

        let mut file = File::open(&path)?;
        let mut bytes = Vec::new();
        let Some(limit) = self.max_bytes else {
            file.read_to_end(&mut bytes)?;
            return Ok(bytes);
        };

        let size = file.metadata()?.len();
        if size > limit {
            return Err(TransferError::TooLarge { size, limit });
        }

        // The file may grow between `metadata` and the read; cap it there too.
        file.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
        let read = bytes.len() as u64;
        if read > limit {
            return Err(TransferError::TooLarge { size: read, limit });
        }
        Ok(bytes)
    }
}
