//! Protocol range mapping.
//!
//! A field may carry points `(input, output)`. A protocol input is clamped to
//! the covered input range, the two points around it are found, and their
//! outputs are blended:
//!
//! - numbers interpolate linearly; an integer pair rounds the result
//! - maps and equal-length arrays blend member by member
//! - anything else switches from the lower to the upper output at alpha 0.5

use rc_core::{RcError, Result, Value};
use tracing::warn;

use crate::types::RangePoint;

/// Map `input` through `points`.
pub fn interpolate(points: &[RangePoint], input: f64) -> Result<Value> {
    if !input.is_finite() {
        return Err(RcError::invalid_request(format!("protocol input {input} is not finite")));
    }
    let mut sorted: Vec<&RangePoint> = points.iter().collect();
    sorted.sort_by(|a, b| a.input.total_cmp(&b.input));

    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(RcError::invalid_request("field has no range mapping")),
    };
    let x = input.clamp(first.input, last.input);

    let upper_idx = sorted.iter().position(|p| p.input >= x).unwrap_or(sorted.len() - 1);
    let upper = sorted[upper_idx];
    let lower = if upper_idx == 0 { upper } else { sorted[upper_idx - 1] };

    let span = upper.input - lower.input;
    if span == 0.0 {
        return Ok(upper.output.clone());
    }
    let alpha = (x - lower.input) / span;
    Ok(blend(&lower.output, &upper.output, alpha))
}

/// Validate points before they are stored.
pub fn validate(points: &[RangePoint]) -> Result<()> {
    if let Some(bad) = points.iter().find(|p| !p.input.is_finite()) {
        return Err(RcError::invalid_request(format!(
            "range input {} is not finite",
            bad.input
        )));
    }
    let mut inputs: Vec<f64> = points.iter().map(|p| p.input).collect();
    inputs.sort_by(f64::total_cmp);
    if inputs.windows(2).any(|w| w[0] == w[1]) {
        warn!("range mapping has duplicate inputs, the first one wins");
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn blend(a: &Value, b: &Value, alpha: f64) -> Value {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            Value::Int((*x as f64 + (*y - *x) as f64 * alpha).round() as i64)
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            Value::Float(x + (y - x) * alpha)
        }
        (Value::Map(x), Value::Map(y)) => Value::Map(
            x.iter()
                .map(|(key, xv)| {
                    let blended = y.get(key).map_or_else(|| xv.clone(), |yv| blend(xv, yv, alpha));
                    (key.clone(), blended)
                })
                .collect(),
        ),
        (Value::Array(x), Value::Array(y)) if x.len() == y.len() => {
            Value::Array(x.iter().zip(y).map(|(xv, yv)| blend(xv, yv, alpha)).collect())
        }
        _ if alpha >= 0.5 => b.clone(),
        _ => a.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn floats(points: &[(f64, f64)]) -> Vec<RangePoint> {
        points.iter().map(|(i, o)| RangePoint::new(*i, Value::Float(*o))).collect()
    }

    #[test]
    fn linear_between_two_points() {
        let points = floats(&[(0.0, 0.0), (1.0, 5000.0)]);
        assert_eq!(interpolate(&points, 0.25).unwrap(), Value::Float(1250.0));
    }

    #[test]
    fn clamps_to_range() {
        let points = floats(&[(0.0, 10.0), (1.0, 20.0)]);
        assert_eq!(interpolate(&points, -3.0).unwrap(), Value::Float(10.0));
        assert_eq!(interpolate(&points, 7.0).unwrap(), Value::Float(20.0));
    }

    #[test]
    fn picks_bracketing_segment() {
        let points = floats(&[(1.0, 100.0), (0.0, 0.0), (2.0, 0.0)]);
        assert_eq!(interpolate(&points, 1.5).unwrap(), Value::Float(50.0));
        assert_eq!(interpolate(&points, 0.5).unwrap(), Value::Float(50.0));
    }

    #[test]
    fn integers_round() {
        let points = vec![RangePoint::new(0.0, Value::Int(0)), RangePoint::new(1.0, Value::Int(10))];
        assert_eq!(interpolate(&points, 0.26).unwrap(), Value::Int(3));
    }

    #[test]
    fn struct_members_blend() {
        let lo = Value::map([("R", Value::Float(0.0)), ("Name", Value::from("dark"))]);
        let hi = Value::map([("R", Value::Float(1.0)), ("Name", Value::from("bright"))]);
        let points = vec![RangePoint::new(0.0, lo), RangePoint::new(10.0, hi)];

        let v = interpolate(&points, 2.0).unwrap();
        assert_eq!(v.get("R"), Some(&Value::Float(0.2)));
        assert_eq!(v.get("Name"), Some(&Value::from("dark")));

        let v = interpolate(&points, 6.0).unwrap();
        assert_eq!(v.get("Name"), Some(&Value::from("bright")));
    }

    #[test]
    fn bool_switches_at_half() {
        let points = vec![RangePoint::new(0.0, false), RangePoint::new(1.0, true)];
        assert_eq!(interpolate(&points, 0.49).unwrap(), Value::Bool(false));
        assert_eq!(interpolate(&points, 0.5).unwrap(), Value::Bool(true));
    }

    #[test]
    fn duplicate_inputs_first_wins() {
        let points = floats(&[(0.0, 1.0), (1.0, 2.0), (1.0, 3.0)]);
        assert_eq!(interpolate(&points, 1.0).unwrap(), Value::Float(2.0));
        assert!(validate(&points).is_ok());
    }

    #[test]
    fn single_point() {
        let points = floats(&[(0.5, 42.0)]);
        assert_eq!(interpolate(&points, 9.0).unwrap(), Value::Float(42.0));
    }

    #[test]
    fn empty_and_non_finite_rejected() {
        assert_matches!(interpolate(&[], 0.0), Err(RcError::InvalidRequest { .. }));
        let points = floats(&[(0.0, 0.0), (1.0, 1.0)]);
        assert_matches!(interpolate(&points, f64::NAN), Err(RcError::InvalidRequest { .. }));
        assert!(validate(&floats(&[(f64::INFINITY, 0.0)])).is_err());
    }
}
