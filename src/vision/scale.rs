//! Drawing scale hints.

/// Ratio used when a scale is missing or unreadable
pub const DEFAULT_SCALE_RATIO: f64 = 100.0;

/// Parse a printed scale like `"1:100"` into its real-world multiplier.
///
/// `"1:50"` gives 50, `"2:100"` gives 50. Anything without a colon, with a
/// non-numeric side, or yielding a non-positive ratio gives
/// [`DEFAULT_SCALE_RATIO`].
pub fn parse_scale(scale: &str) -> f64 {
    let Some((drawing, real)) = scale.trim().split_once(':') else {
        return DEFAULT_SCALE_RATIO;
    };

    let parsed = drawing
        .trim()
        .parse::<f64>()
        .ok()
        .zip(real.trim().parse::<f64>().ok());

    match parsed {
        Some((drawing, real)) if drawing > 0.0 => {
            let ratio = real / drawing;
            if ratio.is_finite() && ratio > 0.0 {
                ratio
            } else {
                DEFAULT_SCALE_RATIO
            }
        }
        _ => DEFAULT_SCALE_RATIO,
    }
}

/// Normalize a printed scale to the `1:<n>` form the area calculator expects.
/// Enlargements round up to `1:1`.
pub fn normalize_scale_hint(scale: &str) -> String {
    let ratio = parse_scale(scale).round().max(1.0) as u64;
    format!("1:{}", ratio)
}
