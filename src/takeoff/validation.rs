//! Hybrid area validation.
//!
//! Reconciles the primary (engine-derived) area with an optional secondary
//! (vision-derived) area. Pure and deterministic: no state, no I/O.

use super::model::{AreaEstimate, Recommendation, ValidationRecord};

/// Deviation up to which the primary estimate counts as validated
pub const DEFAULT_TOLERANCE_PERCENT: f64 = 15.0;

/// Deviation beyond which the secondary estimate wins outright
pub const DIVERGENCE_PERCENT: f64 = 20.0;

pub const SECONDARY_UNAVAILABLE: &str = "secondary unavailable";

/// Reconcile a primary area with an optional secondary estimate.
///
/// Decision order once a usable secondary exists:
/// 1. deviation within tolerance: keep primary
/// 2. secondary saw a simple rectangle: take secondary
/// 3. deviation above [`DIVERGENCE_PERCENT`]: take secondary
/// 4. otherwise: manual review
///
/// Negative or non-finite primaries clamp to 0. A secondary with a missing,
/// zero or negative area is treated as absent.
pub fn reconcile(
    primary_area: f64,
    secondary: Option<&AreaEstimate>,
    tolerance_percent: f64,
) -> ValidationRecord {
    let primary = sanitize_area(primary_area);
    let tolerance = if tolerance_percent.is_finite() && tolerance_percent >= 0.0 {
        tolerance_percent
    } else {
        DEFAULT_TOLERANCE_PERCENT
    };

    let Some(estimate) = secondary.filter(|e| e.area.is_finite() && e.area > 0.0) else {
        return ValidationRecord::primary_only(primary, SECONDARY_UNAVAILABLE);
    };

    let absolute_delta = (primary - estimate.area).abs();
    let percent = percent_delta(primary, estimate.area);

    let (recommendation, message) = if percent <= tolerance {
        (
            Recommendation::UsePrimary,
            format!("validated: estimates agree within {percent:.1}%"),
        )
    } else if estimate.shape_is_simple_rectangle {
        (
            Recommendation::UseSecondary,
            format!("simple rectangle detected, vision estimate preferred ({percent:.1}% deviation)"),
        )
    } else if percent > DIVERGENCE_PERCENT {
        (
            Recommendation::UseSecondary,
            format!("estimates diverge by {percent:.1}%, vision estimate preferred"),
        )
    } else {
        (
            Recommendation::ManualReview,
            format!("estimates deviate by {percent:.1}%, manual review recommended"),
        )
    };

    ValidationRecord {
        secondary_used: true,
        primary_area: primary,
        secondary_area: Some(estimate.area),
        absolute_delta,
        percent_delta: percent,
        recommendation,
        message,
        shape_label: Some(estimate.shape_label.clone()),
        secondary_confidence: Some(estimate.confidence),
    }
}

/// Deviation of `primary` relative to `secondary`, in percent.
/// A zero secondary yields 0 when both are zero and 100 otherwise.
pub fn percent_delta(primary: f64, secondary: f64) -> f64 {
    if secondary == 0.0 {
        return if primary == 0.0 { 0.0 } else { 100.0 };
    }
    100.0 * (primary - secondary).abs() / secondary
}

fn sanitize_area(area: f64) -> f64 {
    if area.is_finite() && area > 0.0 {
        area
    } else {
        0.0
    }
}
