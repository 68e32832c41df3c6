//! Output filename convention for upscaled images.
//!
//! Generates `"{stem} {mode} ({x2 x4}).{ext}"`, folding the new factors into
//! an existing trailing factor group so repeated upscales stay readable.

use crate::types::{ResampleMode, Scale};

/// Extension used when the original filename has none.
const DEFAULT_EXTENSION: &str = "png";

/// Build the result filename for an upscale of `original` by `scales`.
///
/// # Examples
///
/// ```
/// use upscaler_core::naming::output_filename;
/// use upscaler_core::types::{ResampleMode, Scale};
///
/// assert_eq!(
///     output_filename("photo.png", &[Scale::X2, Scale::X4], ResampleMode::Bicubic),
///     "photo bicubic (x2 x4).png"
/// );
/// assert_eq!(
///     output_filename("photo bicubic (x2).png", &[Scale::X4], ResampleMode::Bilinear),
///     "photo bicubic bilinear (x2 x4).png"
/// );
/// ```
pub fn output_filename(original: &str, scales: &[Scale], mode: ResampleMode) -> String {
    let (stem, ext) = match original.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, ext),
        _ => (original, DEFAULT_EXTENSION),
    };

    let factors = scales
        .iter()
        .map(|s| format!("x{}", s.factor()))
        .collect::<Vec<_>>()
        .join(" ");

    if let Some((before, existing)) = trailing_factor_group(stem) {
        let before = before.trim_end();
        let sep = if before.is_empty() { "" } else { " " };
        return format!("{before}{sep}{mode} ({existing} {factors}).{ext}");
    }

    format!("{stem} {mode} ({factors}).{ext}")
}

/// Split `"name (x2 x4)"` into `("name ", "x2 x4")` when the stem ends with
/// a parenthesised group made only of `x<digits>` tokens.
fn trailing_factor_group(stem: &str) -> Option<(&str, &str)> {
    let inner_end = stem.strip_suffix(')')?;
    let open = inner_end.rfind('(')?;
    let content = &inner_end[open + 1..];

    let is_factor_list = !content.trim().is_empty()
        && content.split_whitespace().all(|part| {
            part.strip_prefix('x')
                .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        });

    is_factor_list.then_some((&stem[..open], content))
}
