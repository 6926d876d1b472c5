// Rise queries: the shared interpolation primitive, direct calculation from
// the scaled reference profile, and the manual-override resolver.

use std::collections::BTreeMap;
use std::fmt;

use crate::profile::ScaledProfile;
use crate::RisePoint;

// Override maps key arc distances as rounded milli-inches so that lookups
// survive binary float drift (0.1 + 0.2 must still find the 0.3 entry).
const ARC_KEY_SCALE: f64 = 1000.0;

fn arc_key(arc: f64) -> i64 {
    (arc * ARC_KEY_SCALE).round() as i64
}

/// Rise values keyed by arc distance, ordered ascending.
///
/// Used both for user-entered manual overrides and for the caller-owned cache
/// of previously calculated values. Arcs are expected to be finite and
/// non-negative; keys collide at milli-inch resolution, far below the 0.5"
/// step the parameter layer works in.
#[derive(Clone, Debug, Default)]
pub struct RiseOverrides {
    entries: BTreeMap<i64, f64>,
}

impl RiseOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut out = Self::new();
        for (arc, rise) in pairs {
            out.insert(arc, rise);
        }
        out
    }

    pub fn insert(&mut self, arc: f64, rise: f64) {
        self.entries.insert(arc_key(arc), rise);
    }

    pub fn get(&self, arc: f64) -> Option<f64> {
        self.entries.get(&arc_key(arc)).copied()
    }

    pub fn remove(&mut self, arc: f64) -> Option<f64> {
        self.entries.remove(&arc_key(arc))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ascending `(arc, rise)` pairs, arcs reconstructed from the fixed-point
    /// keys.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.entries
            .iter()
            .map(|(key, rise)| (*key as f64 / ARC_KEY_SCALE, *rise))
    }
}

/// Interpolated (or extrapolated) rise over an ascending, duplicate-free
/// point sequence.
///
/// Empty input yields 0.0; queries at or below the first point clamp to its
/// rise; queries at or past the last point continue at the rate of the final
/// segment (or clamp, if only one point exists). Exact when the query
/// coincides with an input arc. Never fails; non-finite values propagate
/// through the arithmetic.
pub fn interpolate(query_arc: f64, points: &[RisePoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let first = points[0];
    if query_arc <= first.arc {
        return first.rise;
    }
    let last = points[points.len() - 1];
    if points.len() < 2 {
        return last.rise;
    }
    if query_arc >= last.arc {
        let prev = points[points.len() - 2];
        let rate = (last.rise - prev.rise) / (last.arc - prev.arc);
        return last.rise + rate * (query_arc - last.arc);
    }
    for pair in points.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        if query_arc > upper.arc {
            continue;
        }
        if query_arc == lower.arc {
            return lower.rise;
        }
        if query_arc == upper.arc {
            return upper.rise;
        }
        return lower.rise
            + (query_arc - lower.arc) / (upper.arc - lower.arc) * (upper.rise - lower.rise);
    }
    // Unreachable for finite in-range queries; keep the clamp for anything
    // the comparisons above let through.
    last.rise
}

/// Rise at `query_arc` computed directly from the scaled reference profile.
pub fn calculate_rise_at_distance(
    query_arc: f64,
    total_helical_rise: f64,
    total_arc_distance: f64,
    pitch_block: f64,
) -> f64 {
    ScaledProfile::new(total_helical_rise, total_arc_distance, pitch_block).rise_at(query_arc)
}

fn merge_override_points(
    manual: &RiseOverrides,
    calculated: &RiseOverrides,
    total_arc_distance: f64,
) -> Vec<RisePoint> {
    let cache_limit = total_arc_distance.ceil();
    let mut merged: BTreeMap<i64, f64> = BTreeMap::new();
    for (arc, rise) in calculated.iter() {
        if arc <= cache_limit {
            merged.insert(arc_key(arc), rise);
        }
    }
    // Manual entries win key collisions.
    for (arc, rise) in manual.iter() {
        if arc <= total_arc_distance {
            merged.insert(arc_key(arc), rise);
        }
    }
    merged
        .into_iter()
        .map(|(key, rise)| RisePoint::new(key as f64 / ARC_KEY_SCALE, rise))
        .collect()
}

/// Rise at `query_arc` honoring manual overrides.
///
/// With no manual data this is exactly [`calculate_rise_at_distance`]. With
/// manual data, overrides within the rail span are merged with the supplied
/// calculated cache (manual wins at equal keys) and the merged, sorted
/// sequence is interpolated. An empty merged set, e.g. a negative span, falls
/// back to direct calculation.
pub fn current_rise_at_distance(
    query_arc: f64,
    manual: &RiseOverrides,
    calculated: &RiseOverrides,
    total_arc_distance: f64,
    total_helical_rise: f64,
    pitch_block: f64,
) -> f64 {
    if manual.is_empty() {
        return calculate_rise_at_distance(
            query_arc,
            total_helical_rise,
            total_arc_distance,
            pitch_block,
        );
    }
    let points = merge_override_points(manual, calculated, total_arc_distance);
    if points.is_empty() {
        return calculate_rise_at_distance(
            query_arc,
            total_helical_rise,
            total_arc_distance,
            pitch_block,
        );
    }
    interpolate(query_arc, &points)
}

/// Where a resolved rise value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiseOrigin {
    Manual,
    Interpolated,
    Extrapolated,
}

impl fmt::Display for RiseOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiseOrigin::Manual => "manual",
            RiseOrigin::Interpolated => "interpolated",
            RiseOrigin::Extrapolated => "extrapolated",
        };
        f.write_str(label)
    }
}

/// [`current_rise_at_distance`] plus a tag describing which path produced the
/// value. Report surfaces match on the tag exhaustively.
pub fn classify_rise(
    query_arc: f64,
    manual: &RiseOverrides,
    calculated: &RiseOverrides,
    total_arc_distance: f64,
    total_helical_rise: f64,
    pitch_block: f64,
) -> (f64, RiseOrigin) {
    let rise = current_rise_at_distance(
        query_arc,
        manual,
        calculated,
        total_arc_distance,
        total_helical_rise,
        pitch_block,
    );
    if query_arc <= total_arc_distance && manual.get(query_arc).is_some() {
        return (rise, RiseOrigin::Manual);
    }
    let merged_end = if manual.is_empty() {
        None
    } else {
        merge_override_points(manual, calculated, total_arc_distance)
            .last()
            .map(|p| p.arc)
    };
    let end_arc = match merged_end {
        Some(arc) => arc,
        None => {
            ScaledProfile::new(total_helical_rise, total_arc_distance, pitch_block)
                .end()
                .arc
        }
    };
    let origin = if query_arc > end_arc {
        RiseOrigin::Extrapolated
    } else {
        RiseOrigin::Interpolated
    };
    (rise, origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BASE_ARC_DISTANCE, BASE_PITCH_BLOCK, BASE_RISE, REFERENCE_PROFILE};

    const EPS: f64 = 1e-9;

    fn no_overrides() -> RiseOverrides {
        RiseOverrides::new()
    }

    #[test]
    fn test_interpolate_empty_and_singleton() {
        assert_eq!(interpolate(3.0, &[]), 0.0);
        let single = [RisePoint::new(2.0, 5.0)];
        assert_eq!(interpolate(0.0, &single), 5.0);
        assert_eq!(interpolate(2.0, &single), 5.0);
        assert_eq!(interpolate(9.0, &single), 5.0);
    }

    #[test]
    fn test_interpolate_clamps_below_range() {
        let points = [RisePoint::new(1.0, 2.0), RisePoint::new(3.0, 6.0)];
        assert_eq!(interpolate(0.0, &points), 2.0);
        assert_eq!(interpolate(-5.0, &points), 2.0);
    }

    #[test]
    fn test_interpolate_exact_at_points() {
        let points = [
            RisePoint::new(0.1, 1.5),
            RisePoint::new(0.3, 2.25),
            RisePoint::new(0.7, 4.0),
        ];
        for p in &points {
            assert_eq!(interpolate(p.arc, &points), p.rise);
        }
    }

    #[test]
    fn test_interpolate_midpoints() {
        let points = [RisePoint::new(0.0, 1.0), RisePoint::new(10.0, 5.0)];
        assert!((interpolate(5.0, &points) - 3.0).abs() < EPS);
        assert!((interpolate(2.5, &points) - 2.0).abs() < EPS);
    }

    #[test]
    fn test_interpolate_extrapolates_from_last_segment() {
        let points = [
            RisePoint::new(0.0, 0.0),
            RisePoint::new(1.0, 1.0),
            RisePoint::new(2.0, 3.0),
        ];
        // Final segment rate is 2.0 per inch.
        assert!((interpolate(4.0, &points) - 7.0).abs() < EPS);
        assert!((interpolate(2.0, &points) - 3.0).abs() < EPS);
    }

    #[test]
    fn test_interpolate_nan_query_falls_back_to_last() {
        let points = [RisePoint::new(0.0, 1.0), RisePoint::new(2.0, 4.0)];
        let out = interpolate(f64::NAN, &points);
        assert!(out.is_nan() || out == 4.0);
    }

    #[test]
    fn test_reproduces_reference_profile_end() {
        let rise = calculate_rise_at_distance(17.5, 7.375, 17.5, 1.0);
        assert!((rise - 8.375).abs() < EPS);
    }

    #[test]
    fn test_identity_scaling_matches_reference_everywhere() {
        let mut arc = 0.0;
        while arc <= BASE_ARC_DISTANCE {
            let direct = calculate_rise_at_distance(arc, BASE_RISE, BASE_ARC_DISTANCE, BASE_PITCH_BLOCK);
            let reference = interpolate(arc, &REFERENCE_PROFILE);
            assert!(
                (direct - reference).abs() < 1e-12,
                "mismatch at arc {arc}: {direct} vs {reference}"
            );
            arc += 0.125;
        }
    }

    #[test]
    fn test_monotonic_in_query_arc() {
        let (rise_span, arc_span, pitch) = (9.25, 23.0, 1.5);
        let mut prev = f64::NEG_INFINITY;
        let mut arc = 0.0;
        while arc <= 2.0 * arc_span {
            let rise = calculate_rise_at_distance(arc, rise_span, arc_span, pitch);
            assert!(rise >= prev - EPS, "rise decreased near arc {arc}");
            prev = rise;
            arc += 0.05;
        }
    }

    #[test]
    fn test_continuous_across_profile_end() {
        let (rise_span, arc_span, pitch) = (8.0, 20.0, 1.25);
        for eps in [1e-3, 1e-6, 1e-9] {
            let below = calculate_rise_at_distance(arc_span - eps, rise_span, arc_span, pitch);
            let above = calculate_rise_at_distance(arc_span + eps, rise_span, arc_span, pitch);
            assert!((above - below).abs() < eps, "jump at profile end for eps {eps}");
        }
    }

    #[test]
    fn test_scale_invariance_above_pitch_block() {
        let (arc_span, pitch) = (17.5, 1.0);
        let rise_span = 7.375;
        let mut arc = 0.0;
        while arc <= 1.5 * arc_span {
            let single = calculate_rise_at_distance(arc, rise_span, arc_span, pitch);
            let double = calculate_rise_at_distance(arc, 2.0 * rise_span, arc_span, pitch);
            assert!(
                ((double - pitch) - 2.0 * (single - pitch)).abs() < EPS,
                "scale invariance broken at arc {arc}"
            );
            arc += 0.25;
        }
    }

    #[test]
    fn test_override_precedence_exact() {
        let manual = RiseOverrides::from_pairs([(5.0, 99.0)]);
        let rise = current_rise_at_distance(5.0, &manual, &no_overrides(), 17.5, 7.375, 1.0);
        assert_eq!(rise, 99.0);
    }

    #[test]
    fn test_override_midpoint_interpolation() {
        let manual = RiseOverrides::from_pairs([(0.0, 1.0), (10.0, 5.0)]);
        let rise = current_rise_at_distance(5.0, &manual, &no_overrides(), 17.5, 7.375, 1.0);
        assert!((rise - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_overrides_fall_back_to_direct() {
        let cache = RiseOverrides::from_pairs([(3.0, 42.0), (9.0, 77.0)]);
        for arc in [0.0, 4.25, 17.5, 30.0] {
            let current =
                current_rise_at_distance(arc, &no_overrides(), &cache, 17.5, 7.375, 1.0);
            let direct = calculate_rise_at_distance(arc, 7.375, 17.5, 1.0);
            assert_eq!(current, direct);
        }
    }

    #[test]
    fn test_manual_wins_cache_collision() {
        let manual = RiseOverrides::from_pairs([(4.0, 10.0), (8.0, 20.0)]);
        let cache = RiseOverrides::from_pairs([(4.0, -1.0), (6.0, 15.0)]);
        let rise = current_rise_at_distance(4.0, &manual, &cache, 17.5, 7.375, 1.0);
        assert_eq!(rise, 10.0);
        // The cache point at 6.0 still participates between the overrides.
        let mid = current_rise_at_distance(6.0, &manual, &cache, 17.5, 7.375, 1.0);
        assert_eq!(mid, 15.0);
    }

    #[test]
    fn test_overrides_beyond_span_are_ignored() {
        let manual = RiseOverrides::from_pairs([(30.0, 500.0)]);
        let rise = current_rise_at_distance(10.0, &manual, &no_overrides(), 17.5, 7.375, 1.0);
        let direct = calculate_rise_at_distance(10.0, 7.375, 17.5, 1.0);
        assert_eq!(rise, direct);
    }

    #[test]
    fn test_negative_span_degenerates_to_direct() {
        let manual = RiseOverrides::from_pairs([(2.0, 3.0)]);
        let rise = current_rise_at_distance(2.0, &manual, &no_overrides(), -4.0, 7.375, 1.0);
        let direct = calculate_rise_at_distance(2.0, 7.375, -4.0, 1.0);
        assert_eq!(rise, direct);
    }

    #[test]
    fn test_override_key_survives_float_drift() {
        let mut manual = RiseOverrides::new();
        manual.insert(0.1 + 0.2, 4.5);
        assert_eq!(manual.get(0.3), Some(4.5));
        let rise = current_rise_at_distance(0.3, &manual, &no_overrides(), 17.5, 7.375, 1.0);
        assert_eq!(rise, 4.5);
    }

    #[test]
    fn test_end_to_end_default_parameters() {
        let at = |arc| calculate_rise_at_distance(arc, 7.375, 17.5, 1.0);
        assert!((at(0.0) - 1.0).abs() < EPS);
        assert!((at(17.5) - 8.375).abs() < EPS);
        assert!((at(8.75) - 4.375).abs() < EPS);
    }

    #[test]
    fn test_classify_rise_origins() {
        let manual = RiseOverrides::from_pairs([(5.0, 3.0)]);
        let cache = RiseOverrides::from_pairs([(0.0, 1.0), (10.0, 6.0)]);
        let (rise, origin) = classify_rise(5.0, &manual, &cache, 17.5, 7.375, 1.0);
        assert_eq!((rise, origin), (3.0, RiseOrigin::Manual));
        let (_, origin) = classify_rise(7.5, &manual, &cache, 17.5, 7.375, 1.0);
        assert_eq!(origin, RiseOrigin::Interpolated);
        let (_, origin) = classify_rise(12.0, &manual, &cache, 17.5, 7.375, 1.0);
        assert_eq!(origin, RiseOrigin::Extrapolated);
        let (_, origin) = classify_rise(25.0, &no_overrides(), &no_overrides(), 17.5, 7.375, 1.0);
        assert_eq!(origin, RiseOrigin::Extrapolated);
    }
}
