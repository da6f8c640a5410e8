//! sepiatone-pipeline: pure stage functions (sans-IO).
//!
//! One invocation of the image pipeline runs:
//! validate location -> retrieve bytes -> decode -> filter -> deliver.
//!
//! This crate holds the pure, synchronous stages and the shared error
//! taxonomy. Retrieval, threading and delivery live in `sepiatone-io`.

pub mod decode;
pub mod filter;
pub mod locate;
pub mod math;
pub mod types;

pub use decode::decode_image;
pub use filter::{FilterKind, FilterSpec, apply_filter};
pub use locate::{Url, parse_location};
pub use types::{DecodedImage, Dimensions, FilterResult, PipelineError, RgbaImage, TransferError};

/// Run the decode and filter stages back to back on bytes already in
/// memory.
///
/// Useful when the caller has the bytes at hand and no context switch is
/// wanted; the threaded orchestrator runs the same two stages on
/// separate contexts.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidData`] if the bytes do not decode.
/// Returns [`PipelineError::FilterFailure`] if `spec` is invalid.
pub fn process(image_bytes: &[u8], spec: &FilterSpec) -> FilterResult {
    let decoded = decode_image(image_bytes)?;
    apply_filter(&decoded, spec)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn two_tone_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, _y| {
            if x < width / 2 {
                image::Rgba([0, 90, 200, 255])
            } else {
                image::Rgba([220, 40, 10, 255])
            }
        });
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn process_corrupt_input() {
        let result = process(&[0xFF, 0x00], &FilterSpec::default());
        assert!(matches!(result, Err(PipelineError::InvalidData(_))));
    }

    #[test]
    fn process_rejects_invalid_spec_after_decoding() {
        let png = two_tone_png(4, 4);
        let result = process(&png, &FilterSpec::sepia(2.0));
        assert!(matches!(result, Err(PipelineError::FilterFailure(_))));
    }

    #[test]
    fn process_tones_every_pixel() {
        let png = two_tone_png(10, 6);
        let unfiltered = decode_image(&png).unwrap();
        let filtered = process(&png, &FilterSpec::default()).unwrap();

        assert_eq!(filtered.dimensions(), unfiltered.dimensions());
        for (before, after) in unfiltered.pixels().pixels().zip(filtered.pixels().pixels()) {
            assert_ne!(before, after);
            // Sepia output always has R >= G >= B.
            let [r, g, b, _] = after.0;
            assert!(r >= g && g >= b, "not sepia-ordered: {after:?}");
        }
    }
}
