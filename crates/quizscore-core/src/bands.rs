//! Band resolution: maps a raw scale score to a qualitative band.

use crate::model::{Band, Scale};
use crate::results::ScaleScore;

/// Clamp `raw` into `[scale.min, scale.max]`.
///
/// Never panics, even for an inverted range; the linter reports those.
pub fn clamp_score(scale: &Scale, raw: f64) -> f64 {
    raw.max(scale.min).min(scale.max)
}

/// The first band, in declaration order, containing the clamped score.
///
/// Overlapping bands are allowed; order decides. Returns `None` when no band
/// matches, which is not an error.
pub fn resolve_band(scale: &Scale, raw: f64) -> Option<&Band> {
    let clamped = clamp_score(scale, raw);
    scale.bands.iter().find(|band| band.contains(clamped))
}

/// Build the full [`ScaleScore`] for a scale.
pub fn score_scale(scale: &Scale, raw: f64) -> ScaleScore {
    let band = resolve_band(scale, raw).cloned();
    tracing::debug!(
        scale = %scale.key,
        raw,
        band = band.as_ref().map(|b| b.label.as_str()).unwrap_or("-"),
        "resolved band"
    );
    ScaleScore {
        key: scale.key.clone(),
        name: scale.display_name().to_string(),
        raw,
        clamped: clamp_score(scale, raw),
        band,
    }
}
