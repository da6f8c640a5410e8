//! Image decoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces an RGBA8
//! bitmap. Runs on the background context, after retrieval.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use image::error::{DecodingError, ImageFormatHint};
use image::{DynamicImage, ImageError, ImageResult};

use crate::types::{DecodedImage, FilterResult, PipelineError};

/// Decode raw image bytes into an RGBA8 bitmap.
///
/// The format is sniffed from the data; whatever the `image` crate can
/// decode with the enabled codecs is accepted.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidData`] if `bytes` is empty, the
/// format is unrecognized, or the data is corrupt. A decoder that
/// panics on malformed input is reported the same way.
pub fn decode_image(bytes: &[u8]) -> FilterResult {
    decode_with(|| image::load_from_memory(bytes))
}

fn decode_with(decode: impl FnOnce() -> ImageResult<DynamicImage>) -> FilterResult {
    let img = catch_unwind(AssertUnwindSafe(decode))
        .unwrap_or_else(|payload| Err(decoder_panicked(payload.as_ref())))
        .map_err(PipelineError::InvalidData)?;
    Ok(DecodedImage::new(img.to_rgba8()))
}

fn decoder_panicked(payload: &(dyn Any + Send)) -> ImageError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    ImageError::Decoding(DecodingError::new(
        ImageFormatHint::Unknown,
        format!("decoder panicked: {message}"),
    ))
}
