// Reference rise profile and the scaler that maps it onto arbitrary
// handrail dimensions. All other rise math derives from these constants.

use crate::rise::interpolate;
use crate::RisePoint;

/// Arc span of the measured reference rail, in inches.
pub const BASE_ARC_DISTANCE: f64 = 17.5;
/// Rise span of the measured reference rail above its pitch block, in inches.
pub const BASE_RISE: f64 = 7.375;
/// Pitch block height the reference rail was measured on, in inches.
pub const BASE_PITCH_BLOCK: f64 = 1.0;

/// Hand-measured rise profile of the reference rail: one sample at each whole
/// inch of arc distance plus the 17.5" end point, rises read to the nearest
/// sixteenth. Strictly increasing; never mutated.
pub const REFERENCE_PROFILE: [RisePoint; 19] = [
    RisePoint::new(0.0, 1.0),
    RisePoint::new(1.0, 1.125),
    RisePoint::new(2.0, 1.3125),
    RisePoint::new(3.0, 1.5625),
    RisePoint::new(4.0, 1.875),
    RisePoint::new(5.0, 2.3125),
    RisePoint::new(6.0, 2.8125),
    RisePoint::new(7.0, 3.375),
    RisePoint::new(8.0, 4.0),
    RisePoint::new(9.0, 4.5),
    RisePoint::new(10.0, 4.9375),
    RisePoint::new(11.0, 5.4375),
    RisePoint::new(12.0, 5.9375),
    RisePoint::new(13.0, 6.375),
    RisePoint::new(14.0, 6.875),
    RisePoint::new(15.0, 7.3125),
    RisePoint::new(16.0, 7.8125),
    RisePoint::new(17.0, 8.25),
    RisePoint::new(17.5, 8.375),
];

/// Average rise rate of the reference profile above its pitch block, used to
/// continue the curve linearly past the measured end.
pub fn base_extrapolation_rate() -> f64 {
    let end = REFERENCE_PROFILE[REFERENCE_PROFILE.len() - 1];
    (end.rise - BASE_PITCH_BLOCK) / BASE_ARC_DISTANCE
}

/// Reference profile rescaled onto a target rail's dimensions.
///
/// Scaling is deterministic and total for finite inputs. Zero or negative
/// target dimensions are deliberately not rejected here; the resulting
/// degenerate scale factors are the caller's responsibility (the parameter
/// layer constrains inputs to physical ranges).
#[derive(Clone, Debug)]
pub struct ScaledProfile {
    pub points: Vec<RisePoint>,
    pub arc_scale: f64,
    pub rise_scale: f64,
    pub pitch_block_offset: f64,
    pub extrapolation_rate: f64,
}

impl ScaledProfile {
    pub fn new(total_helical_rise: f64, total_arc_distance: f64, pitch_block: f64) -> Self {
        let arc_scale = total_arc_distance / BASE_ARC_DISTANCE;
        let rise_scale = total_helical_rise / BASE_RISE;
        let pitch_block_offset = pitch_block - BASE_PITCH_BLOCK;
        // The base pitch block is re-added before the offset so that pitch
        // block changes shift the whole curve instead of scaling it.
        let points = REFERENCE_PROFILE
            .iter()
            .map(|p| {
                RisePoint::new(
                    p.arc * arc_scale,
                    BASE_PITCH_BLOCK + (p.rise - BASE_PITCH_BLOCK) * rise_scale + pitch_block_offset,
                )
            })
            .collect();
        Self {
            points,
            arc_scale,
            rise_scale,
            pitch_block_offset,
            extrapolation_rate: base_extrapolation_rate() * rise_scale,
        }
    }

    /// Last scaled point; the profile is a fixed-size constant so this always
    /// exists.
    pub fn end(&self) -> RisePoint {
        self.points[self.points.len() - 1]
    }

    /// Rise at an arbitrary arc distance: interpolated within the scaled
    /// points, continued at `extrapolation_rate` beyond the measured end.
    pub fn rise_at(&self, query_arc: f64) -> f64 {
        let end = self.end();
        if query_arc > end.arc {
            end.rise + self.extrapolation_rate * (query_arc - end.arc)
        } else {
            interpolate(query_arc, &self.points)
        }
    }
}
