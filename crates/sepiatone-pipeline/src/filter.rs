//! Filter specification and application.
//!
//! The filter runs on the delivery context, after decoding. Only one
//! transform exists today (sepia tone), but [`FilterSpec`] carries an
//! explicit kind so the wire format does not change when more are added.

use serde::{Deserialize, Serialize};

use crate::types::{DecodedImage, FilterResult, PipelineError, RgbaImage};

/// Sepia tone matrix, rows are output R, G, B.
const SEPIA: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

/// Which transform to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Warm brown monochrome tone.
    #[default]
    Sepia,
}

/// A filter identifier plus its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Which transform to apply.
    pub kind: FilterKind,

    /// Blend factor between the original (0.0) and the fully toned
    /// image (1.0).
    pub intensity: f32,
}

impl FilterSpec {
    /// Default intensity: fully toned.
    pub const DEFAULT_INTENSITY: f32 = 1.0;

    /// A sepia filter at the given intensity.
    #[must_use]
    pub const fn sepia(intensity: f32) -> Self {
        Self {
            kind: FilterKind::Sepia,
            intensity,
        }
    }

    /// Check that the parameters describe a constructible filter.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::FilterFailure`] if `intensity` is not a
    /// finite value in `0.0..=1.0`.
    pub fn validate(&self) -> FilterResult<()> {
        if !(0.0..=1.0).contains(&self.intensity) {
            return Err(PipelineError::FilterFailure(format!(
                "{:?} intensity must be within 0.0..=1.0, got {}",
                self.kind, self.intensity
            )));
        }
        Ok(())
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self::sepia(Self::DEFAULT_INTENSITY)
    }
}

/// Apply `spec` to `image`, producing a new image of the same size.
///
/// Alpha is copied unchanged. An intensity of 0.0 returns an identical
/// copy of the input.
///
/// # Errors
///
/// Returns [`PipelineError::FilterFailure`] if `spec` fails
/// [`FilterSpec::validate`].
pub fn apply_filter(image: &DecodedImage, spec: &FilterSpec) -> FilterResult {
    spec.validate()?;

    let src = image.pixels();
    let out = match spec.kind {
        FilterKind::Sepia => RgbaImage::from_fn(src.width(), src.height(), |x, y| {
            let [r, g, b, a] = src.get_pixel(x, y).0;
            let [r, g, b] = sepia_pixel([r, g, b], spec.intensity);
            image::Rgba([r, g, b, a])
        }),
    };
    Ok(DecodedImage::new(out))
}

/// Tone one RGB triple and blend it with the original by `intensity`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sepia_pixel(rgb: [u8; 3], intensity: f32) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let mut out = [0u8; 3];
    for (channel, (row, original)) in SEPIA.iter().zip([r, g, b]).enumerate() {
        let toned = row[0].mul_add(r, row[1].mul_add(g, row[2] * b)).min(255.0);
        let blended = (toned - original).mul_add(intensity, original);
        // Clamped to the u8 range above, so the cast cannot wrap.
        out[channel] = blended.round().clamp(0.0, 255.0) as u8;
    }
    out
}
