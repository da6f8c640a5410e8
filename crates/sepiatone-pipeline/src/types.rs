//! Shared types for the sepiatone pipeline.

use serde::{Serialize, Serializer};

/// Re-export `RgbaImage` so downstream crates can reach the pixel
/// buffer without depending on `image` directly.
pub use image::RgbaImage;

/// The outcome of a pipeline stage or of a whole invocation.
///
/// Every stage function returns this alias, and the completion callback
/// receives exactly one of them per invocation.
pub type FilterResult<T = DecodedImage> = Result<T, PipelineError>;

/// An in-memory RGBA8 bitmap.
///
/// Produced by [`decode_image`](crate::decode::decode_image) and by
/// [`apply_filter`](crate::filter::apply_filter). Owned by whichever
/// stage last produced it; never mutated after handoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage(RgbaImage);

impl DecodedImage {
    /// Wrap an existing RGBA buffer.
    #[must_use]
    pub const fn new(pixels: RgbaImage) -> Self {
        Self(pixels)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Image dimensions in pixels.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// Borrow the underlying pixel buffer.
    #[must_use]
    pub const fn pixels(&self) -> &RgbaImage {
        &self.0
    }

    /// Consumes the image and returns the underlying pixel buffer.
    #[must_use]
    pub fn into_pixels(self) -> RgbaImage {
        self.0
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Why byte retrieval failed.
///
/// Wraps the lower-level cause so callers can inspect it through
/// [`std::error::Error::source`].
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Reading the resource failed (not found, permission denied, ...).
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The location uses a scheme the fetcher cannot retrieve.
    #[error("unsupported scheme `{0}`")]
    UnsupportedScheme(String),

    /// A `file:` location that has no local path equivalent
    /// (e.g. a remote host component).
    #[error("location does not map to a local file path")]
    NotAFilePath,

    /// The resource exceeds the configured byte limit.
    #[error("resource is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Size reported for the resource.
        size: u64,
        /// Configured maximum.
        limit: u64,
    },

    /// The fetcher panicked; carries the panic message.
    #[error("fetcher panicked: {0}")]
    Panicked(String),
}

/// Errors that can occur during a pipeline invocation.
///
/// The set is closed: consumers match every variant.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The location string could not be parsed into a URL.
    #[error("invalid URL: {0:?}")]
    InvalidUrl(String),

    /// Bytes were retrieved but do not decode into an image.
    #[error("retrieved data is not a decodable image: {0}")]
    InvalidData(#[source] image::ImageError),

    /// Retrieving the bytes failed.
    #[error("transfer failed: {0}")]
    TransferFailure(#[from] TransferError),

    /// The filter could not be constructed or applied.
    #[error("filter failed: {0}")]
    FilterFailure(String),

    /// The caller cancelled the invocation before delivery, or the
    /// invocation was discarded at shutdown without running.
    #[error("cancelled")]
    Cancelled,
}

/// Serde-compatible proxy for `PipelineError`.
///
/// The wrapped `image` and `io` errors do not implement serde, so their
/// `Display` strings are serialized instead.
#[derive(Serialize)]
enum PipelineErrorProxy<'a> {
    InvalidUrl(&'a str),
    InvalidData(String),
    TransferFailure(String),
    FilterFailure(&'a str),
    Cancelled,
}

impl Serialize for PipelineError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::InvalidUrl(raw) => PipelineErrorProxy::InvalidUrl(raw),
            Self::InvalidData(e) => PipelineErrorProxy::InvalidData(e.to_string()),
            Self::TransferFailure(e) => PipelineErrorProxy::TransferFailure(e.to_string()),
            Self::FilterFailure(msg) => PipelineErrorProxy::FilterFailure(msg),
            Self::Cancelled => PipelineErrorProxy::Cancelled,
        };
        proxy.serialize(serializer)
    }
}
