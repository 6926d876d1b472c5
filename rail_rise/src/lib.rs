//! Core spiral handrail rise profile engine.
//!
//! Maps arc-distance positions along a spiral rail to vertical rise values by
//! scaling a hand-measured reference profile, with linear extrapolation past
//! the measured end and reconciliation of user-entered manual overrides. The
//! rendering and parameter-entry layers sit on top of this crate and consume
//! its sampled tables and centerline points.

use std::fs;
use std::path::Path;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod helix;
pub mod profile;
pub mod rise;

pub use profile::{
    ScaledProfile, BASE_ARC_DISTANCE, BASE_PITCH_BLOCK, BASE_RISE, REFERENCE_PROFILE,
};
pub use rise::{
    calculate_rise_at_distance, classify_rise, current_rise_at_distance, interpolate, RiseOrigin,
    RiseOverrides,
};

#[derive(Error, Debug)]
pub enum RailError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("failed to read {0}")]
    Read(String),
    #[error("failed to parse parameters: {0}")]
    ParamsParse(String),
    #[error("failed to parse overrides: {0}")]
    OverridesParse(String),
}

/// One sample of the rise-vs-arc-distance curve, both values in inches.
///
/// Sequences handed to the interpolation primitive must be ascending by `arc`
/// with no duplicate arcs; duplicates are undefined behavior, not validated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RisePoint {
    pub arc: f64,
    pub rise: f64,
}

impl RisePoint {
    pub const fn new(arc: f64, rise: f64) -> Self {
        Self { arc, rise }
    }
}

/// Handrail parameters relevant to the rise engine, all in inches except the
/// angular span. Read-only inputs to each calculation; the engine keeps no
/// state between calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub total_degrees: f64,
    pub total_helical_rise: f64,
    pub total_arc_distance: f64,
    pub pitch_block: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            total_degrees: 220.0,
            total_helical_rise: BASE_RISE,
            total_arc_distance: BASE_ARC_DISTANCE,
            pitch_block: BASE_PITCH_BLOCK,
        }
    }
}

impl Params {
    /// Direct-mode rise at `arc`.
    pub fn rise_at(&self, arc: f64) -> f64 {
        calculate_rise_at_distance(
            arc,
            self.total_helical_rise,
            self.total_arc_distance,
            self.pitch_block,
        )
    }

    /// Rise at `arc` honoring manual overrides and a calculated cache.
    pub fn rise_with(&self, arc: f64, manual: &RiseOverrides, calculated: &RiseOverrides) -> f64 {
        current_rise_at_distance(
            arc,
            manual,
            calculated,
            self.total_arc_distance,
            self.total_helical_rise,
            self.pitch_block,
        )
    }

    pub fn params_hash_sha256(&self) -> Result<String, RailError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| RailError::InvalidParameter(e.to_string()))?;
        Ok(sha256_hex(&bytes))
    }
}

/// Direct-mode rise at every integer arc from 0 through the rounded-up rail
/// span. This is the calculated fill the table layer caches between manual
/// overrides; empty when the span is not a finite non-negative number.
pub fn integer_rise_points(params: &Params) -> RiseOverrides {
    let mut out = RiseOverrides::new();
    let span = params.total_arc_distance;
    if !span.is_finite() || span < 0.0 {
        return out;
    }
    let last = span.ceil() as u64;
    for arc in 0..=last {
        let arc = arc as f64;
        out.insert(arc, params.rise_at(arc));
    }
    out
}

/// Sample the rise curve over `[0, total_arc_distance]` at `step` inches plus
/// the exact end point.
pub fn sample_rise(
    params: &Params,
    manual: &RiseOverrides,
    calculated: &RiseOverrides,
    step: f64,
) -> Result<Vec<RisePoint>, RailError> {
    if !step.is_finite() || step <= 0.0 {
        return Err(RailError::InvalidParameter(
            "sample step must be a positive number".into(),
        ));
    }
    let span = params.total_arc_distance;
    if !span.is_finite() || span <= 0.0 {
        return Err(RailError::InvalidParameter(
            "total_arc_distance must be positive to sample".into(),
        ));
    }
    let count = (span / step).ceil() as usize;
    let mut points = Vec::with_capacity(count + 1);
    for i in 0..count {
        let arc = i as f64 * step;
        points.push(RisePoint::new(arc, params.rise_with(arc, manual, calculated)));
    }
    points.push(RisePoint::new(span, params.rise_with(span, manual, calculated)));
    points.dedup_by_key(|p| OrderedFloat(p.arc));
    Ok(points)
}

/// Sampled rise table plus the identity of the parameters that produced it.
#[derive(Clone, Debug, Serialize)]
pub struct RiseTable {
    pub params: Params,
    pub params_hash: String,
    pub points: Vec<RisePoint>,
    pub end_rise: f64,
    pub extrapolation_rate: f64,
    pub manual_count: usize,
}

/// Build a rise table for the report and plotting layers. With `fill` set and
/// manual overrides present, the integer-arc calculated points are merged in
/// between the overrides, matching the tabular view's cache.
pub fn build_rise_table(
    params: &Params,
    manual: &RiseOverrides,
    step: f64,
    fill: bool,
) -> Result<RiseTable, RailError> {
    let calculated = if fill && !manual.is_empty() {
        integer_rise_points(params)
    } else {
        RiseOverrides::new()
    };
    let points = sample_rise(params, manual, &calculated, step)?;
    let scaled = ScaledProfile::new(
        params.total_helical_rise,
        params.total_arc_distance,
        params.pitch_block,
    );
    let end_rise = points.last().map(|p| p.rise).unwrap_or(0.0);
    Ok(RiseTable {
        params: params.clone(),
        params_hash: params.params_hash_sha256()?,
        points,
        end_rise,
        extrapolation_rate: scaled.extrapolation_rate,
        manual_count: manual.len(),
    })
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ProfileDiagnostics {
    pub arc_scale: f64,
    pub rise_scale: f64,
    pub pitch_block_offset: f64,
    pub extrapolation_rate: f64,
    pub start_rise: f64,
    pub end_rise: f64,
    pub monotonic: bool,
    pub overrides_used: usize,
    pub overrides_ignored: usize,
    pub warnings: Vec<String>,
}

/// Inspect a parameter set without failing on degenerate values: the engine
/// itself stays total, so out-of-range dimensions surface here as warnings
/// for the parameter layer to act on.
pub fn diagnose_profile(params: &Params, manual: &RiseOverrides) -> ProfileDiagnostics {
    let scaled = ScaledProfile::new(
        params.total_helical_rise,
        params.total_arc_distance,
        params.pitch_block,
    );
    let mut warnings = Vec::new();
    if !(params.total_arc_distance > 0.0) {
        warnings.push(format!(
            "total_arc_distance {} is not positive; arc scaling is degenerate",
            params.total_arc_distance
        ));
    }
    if !(params.total_helical_rise > 0.0) {
        warnings.push(format!(
            "total_helical_rise {} is not positive; rise scaling is degenerate",
            params.total_helical_rise
        ));
    }
    if !(params.pitch_block > 0.0) {
        warnings.push(format!(
            "pitch_block {} is not positive",
            params.pitch_block
        ));
    }

    let span = params.total_arc_distance;
    let overrides_ignored = manual.iter().filter(|(arc, _)| *arc > span).count();
    let overrides_used = manual.len() - overrides_ignored;
    if overrides_ignored > 0 {
        warnings.push(format!(
            "{overrides_ignored} manual override(s) beyond the {span}\" rail span are ignored"
        ));
    }

    let calculated = if manual.is_empty() {
        RiseOverrides::new()
    } else {
        integer_rise_points(params)
    };
    let mut monotonic = true;
    if span.is_finite() && span > 0.0 {
        let sweep = span * 1.25;
        let steps = 256;
        let mut prev = f64::NEG_INFINITY;
        for i in 0..=steps {
            let arc = sweep * i as f64 / steps as f64;
            let rise = params.rise_with(arc, manual, &calculated);
            if rise + 1e-9 < prev {
                monotonic = false;
                warnings.push(format!("rise decreases near arc {arc:.3}\""));
                break;
            }
            prev = rise;
        }
    }

    ProfileDiagnostics {
        arc_scale: scaled.arc_scale,
        rise_scale: scaled.rise_scale,
        pitch_block_offset: scaled.pitch_block_offset,
        extrapolation_rate: scaled.extrapolation_rate,
        start_rise: params.rise_with(0.0, manual, &calculated),
        end_rise: params.rise_with(span, manual, &calculated),
        monotonic,
        overrides_used,
        overrides_ignored,
        warnings,
    }
}

/// Load handrail parameters from a JSON file; missing fields default.
pub fn load_params(path: &Path) -> Result<Params, RailError> {
    let text =
        fs::read_to_string(path).map_err(|_| RailError::Read(path.display().to_string()))?;
    parse_params_json(&text)
}

pub fn parse_params_json(text: &str) -> Result<Params, RailError> {
    serde_json::from_str(text).map_err(|e| RailError::ParamsParse(e.to_string()))
}

/// Load manual rise overrides from a JSON file.
///
/// Accepted shapes: a top-level array, an object carrying an `"overrides"`
/// (or `"points"`) array, or a plain `{ "arc": rise }` map. Array entries are
/// `[arc, rise]` pairs or `{arc|distance, rise}` objects. Entries with
/// negative or non-finite arcs are skipped.
pub fn load_overrides(path: &Path) -> Result<RiseOverrides, RailError> {
    let text =
        fs::read_to_string(path).map_err(|_| RailError::Read(path.display().to_string()))?;
    parse_overrides_json(&text)
}

pub fn parse_overrides_json(text: &str) -> Result<RiseOverrides, RailError> {
    let json: JsonValue =
        serde_json::from_str(text).map_err(|e| RailError::OverridesParse(e.to_string()))?;
    let mut out = RiseOverrides::new();
    match &json {
        JsonValue::Array(_) => collect_override_array(&json, &mut out),
        JsonValue::Object(map) => {
            if let Some(items) = map.get("overrides").or_else(|| map.get("points")) {
                collect_override_array(items, &mut out);
            } else {
                for (key, value) in map {
                    if let (Ok(arc), Some(rise)) = (key.trim().parse::<f64>(), value.as_f64()) {
                        push_override(&mut out, arc, rise);
                    }
                }
            }
        }
        _ => {
            return Err(RailError::OverridesParse(
                "expected a JSON array or object".into(),
            ))
        }
    }
    Ok(out)
}

fn collect_override_array(value: &JsonValue, out: &mut RiseOverrides) {
    let JsonValue::Array(items) = value else {
        return;
    };
    for item in items {
        match item {
            JsonValue::Array(pair) if pair.len() >= 2 => {
                if let (Some(arc), Some(rise)) = (pair[0].as_f64(), pair[1].as_f64()) {
                    push_override(out, arc, rise);
                }
            }
            JsonValue::Object(obj) => {
                let arc = obj
                    .get("arc")
                    .or_else(|| obj.get("distance"))
                    .and_then(|v| v.as_f64());
                let rise = obj.get("rise").and_then(|v| v.as_f64());
                if let (Some(arc), Some(rise)) = (arc, rise) {
                    push_override(out, arc, rise);
                }
            }
            _ => {}
        }
    }
}

fn push_override(out: &mut RiseOverrides, arc: f64, rise: f64) {
    if arc.is_finite() && arc >= 0.0 && rise.is_finite() {
        out.insert(arc, rise);
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
