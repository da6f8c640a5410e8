//! Location validation.
//!
//! The first stage: a caller-supplied string in, a parsed [`Url`] out.
//! Runs on the caller's thread, so it must stay cheap and pure.

pub use url::Url;

use crate::types::{FilterResult, PipelineError};

/// Parse a location string into an addressable URL.
///
/// Any absolute URL is accepted here, including `file:` locators;
/// whether its scheme can actually be retrieved is decided by the
/// fetcher, not by this stage.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidUrl`] carrying the raw input when
/// `raw` is not an absolute URL.
pub fn parse_location(raw: &str) -> FilterResult<Url> {
    Url::parse(raw).map_err(|_| PipelineError::InvalidUrl(raw.to_owned()))
}
