// Plan-view helix geometry for the curve-construction consumer: maps arc
// positions and engine rise values to 3D centerline points.

use nalgebra::Point3;

use crate::{Params, RailError, RisePoint};

/// Plan-view frame of the spiral: radius derived from the helical arc length,
/// total sweep angle, and total rise, so that walking `arc_length` inches
/// along the rail sweeps `sweep_rad` radians around the newel axis.
#[derive(Clone, Copy, Debug)]
pub struct HelixFrame {
    pub radius: f64,
    pub sweep_rad: f64,
    pub arc_length: f64,
}

impl HelixFrame {
    pub fn for_params(params: &Params) -> Result<Self, RailError> {
        let arc_length = params.total_arc_distance;
        if !arc_length.is_finite() || arc_length <= 0.0 {
            return Err(RailError::InvalidParameter(
                "total_arc_distance must be positive for centerline sampling".into(),
            ));
        }
        let sweep_rad = params.total_degrees.to_radians();
        if !sweep_rad.is_finite() || sweep_rad <= 0.0 {
            return Err(RailError::InvalidParameter(
                "total_degrees must be positive for centerline sampling".into(),
            ));
        }
        // The helical arc is the hypotenuse of the unrolled plan arc and the
        // vertical rise; a rise taller than the arc clamps to a zero radius.
        let rise = params.total_helical_rise;
        let run = (arc_length * arc_length - rise * rise).max(0.0).sqrt();
        Ok(Self {
            radius: run / sweep_rad,
            sweep_rad,
            arc_length,
        })
    }

    /// 3D point for an arc position and the rise the engine computed there.
    pub fn point_at(&self, arc: f64, rise: f64) -> Point3<f64> {
        let angle = self.sweep_rad * (arc / self.arc_length);
        Point3::new(self.radius * angle.cos(), self.radius * angle.sin(), rise)
    }

    /// Centerline points for a sampled rise table.
    pub fn centerline(&self, samples: &[RisePoint]) -> Vec<Point3<f64>> {
        samples
            .iter()
            .map(|p| self.point_at(p.arc, p.rise))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_from_default_parameters() {
        let frame = HelixFrame::for_params(&Params::default()).unwrap();
        let run = (17.5f64 * 17.5 - 7.375 * 7.375).sqrt();
        let expected = run / 220.0f64.to_radians();
        assert!((frame.radius - expected).abs() < 1e-12);
        // A 220-degree rail on a 17.5" arc lands near a 4" plan radius.
        assert!((frame.radius - 4.13).abs() < 0.01);
    }

    #[test]
    fn test_point_at_start_and_end() {
        let frame = HelixFrame::for_params(&Params::default()).unwrap();
        let start = frame.point_at(0.0, 1.0);
        assert!((start.x - frame.radius).abs() < 1e-12);
        assert!(start.y.abs() < 1e-12);
        assert_eq!(start.z, 1.0);

        let end = frame.point_at(frame.arc_length, 8.375);
        let angle = frame.sweep_rad;
        assert!((end.x - frame.radius * angle.cos()).abs() < 1e-12);
        assert!((end.y - frame.radius * angle.sin()).abs() < 1e-12);
        assert_eq!(end.z, 8.375);
    }

    #[test]
    fn test_centerline_stays_on_cylinder() {
        let frame = HelixFrame::for_params(&Params::default()).unwrap();
        let samples = [
            RisePoint::new(0.0, 1.0),
            RisePoint::new(8.75, 4.375),
            RisePoint::new(17.5, 8.375),
        ];
        let points = frame.centerline(&samples);
        assert_eq!(points.len(), samples.len());
        for (point, sample) in points.iter().zip(samples.iter()) {
            let plan = (point.x * point.x + point.y * point.y).sqrt();
            assert!((plan - frame.radius).abs() < 1e-9);
            assert_eq!(point.z, sample.rise);
        }
    }

    #[test]
    fn test_rejects_degenerate_dimensions() {
        let flat = Params {
            total_arc_distance: 0.0,
            ..Params::default()
        };
        assert!(HelixFrame::for_params(&flat).is_err());

        let unswept = Params {
            total_degrees: 0.0,
            ..Params::default()
        };
        assert!(HelixFrame::for_params(&unswept).is_err());

        // Rise taller than the arc clamps the plan radius to zero.
        let steep = Params {
            total_helical_rise: 40.0,
            ..Params::default()
        };
        assert_eq!(HelixFrame::for_params(&steep).unwrap().radius, 0.0);
    }
}
