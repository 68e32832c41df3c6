//! Upscale request validation.
//!
//! Scale lists arrive as loosely-typed form fields; resampling modes fall
//! back to a configured default instead of rejecting the job.

use crate::error::CoreError;
use crate::types::{ResampleMode, Scale};

/// Parse the raw `scales` form field into its individual entries.
///
/// Accepts a JSON list (`["2", "4"]` or `[2, 4]`), a JSON scalar (`2`), or
/// a raw string that is not valid JSON (`2`). Entries are stringified but
/// not yet validated.
pub fn parse_scale_entries(raw: &str) -> Vec<String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items.iter().map(value_to_entry).collect(),
        Ok(other) => vec![value_to_entry(&other)],
        Err(_) => vec![raw.trim().to_string()],
    }
}

fn value_to_entry(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Keep only the entries naming a supported scale, preserving order and
/// duplicates. An empty result rejects the request.
pub fn validate_scales<S: AsRef<str>>(entries: &[S]) -> Result<Vec<Scale>, CoreError> {
    let scales: Vec<Scale> = entries
        .iter()
        .filter_map(|entry| entry.as_ref().trim().parse().ok())
        .collect();

    if scales.is_empty() {
        return Err(CoreError::Validation(format!(
            "No valid scales provided. Must be {:?}",
            Scale::ALL.map(Scale::factor)
        )));
    }
    Ok(scales)
}

/// Convenience: [`parse_scale_entries`] followed by [`validate_scales`].
pub fn parse_scales(raw: &str) -> Result<Vec<Scale>, CoreError> {
    validate_scales(&parse_scale_entries(raw))
}

/// Default ceiling on the pixel count of a job's final output (8192 x 8192).
pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 8192 * 8192;

/// Final output dimensions of `width` x `height` magnified by every scale
/// in turn, rejected when the pixel count exceeds `max_pixels`.
pub fn check_output_size(
    width: u32,
    height: u32,
    scales: &[Scale],
    max_pixels: u64,
) -> Result<(u64, u64), CoreError> {
    let factor: u64 = scales.iter().map(|s| u64::from(s.factor())).product();
    let too_large = || {
        CoreError::Validation(format!(
            "Output of {width}x{height} magnified x{factor} exceeds the limit of {max_pixels} pixels"
        ))
    };

    let out_w = u64::from(width).checked_mul(factor).ok_or_else(too_large)?;
    let out_h = u64::from(height).checked_mul(factor).ok_or_else(too_large)?;
    match out_w.checked_mul(out_h) {
        Some(pixels) if pixels <= max_pixels => Ok((out_w, out_h)),
        _ => Err(too_large()),
    }
}

/// Resolve a requested resampling mode, substituting `default` for anything
/// unrecognised. Never fails.
pub fn resolve_resample_mode(raw: Option<&str>, default: ResampleMode) -> ResampleMode {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return default;
    };
    match raw.parse() {
        Ok(mode) => mode,
        Err(_) => {
            tracing::warn!(
                requested = raw,
                fallback = %default,
                "Invalid resample mode, falling back to default",
            );
            default
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
