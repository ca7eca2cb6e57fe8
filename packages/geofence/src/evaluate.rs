//! Point-in-boundary evaluation.
//!
//! [`Evaluation`] is the tagged outcome used inside the workspace. The
//! numeric decision value, with its ±999 saturation, exists only through
//! [`Evaluation::decision_value`] and [`EvaluationResult`] for callers
//! that threshold on a single number (`<= 0` means alert).

use geo::{Contains, Distance, Euclidean, Point};

use crate::{
    Boundary, DEEP_INSIDE_DECISION, DEEP_OUTSIDE_DECISION, METERS_PER_DEGREE, NEAR_BOUNDARY_M,
};

/// Errors raised while evaluating a point.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    /// Latitude or longitude is NaN or infinite.
    #[error("Coordinate ({lat}, {lon}) is not finite")]
    NonFiniteCoordinate {
        /// Latitude as given.
        lat: f64,
        /// Longitude as given.
        lon: f64,
    },

    /// The computed boundary distance is not a finite number.
    #[error("Distance to geofence boundary could not be computed")]
    NonFiniteDistance,
}

/// Where a point sits relative to the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// Inside and more than [`NEAR_BOUNDARY_M`] from the outline.
    Inside {
        /// Distance to the outline in meters.
        distance_m: f64,
    },
    /// Inside, within [`NEAR_BOUNDARY_M`] of the outline.
    NearBoundaryInside {
        /// Distance to the outline in meters.
        distance_m: f64,
    },
    /// Outside, within [`NEAR_BOUNDARY_M`] of the outline.
    NearBoundaryOutside {
        /// Distance to the outline in meters.
        distance_m: f64,
    },
    /// Outside and more than [`NEAR_BOUNDARY_M`] from the outline.
    Outside {
        /// Distance to the outline in meters.
        distance_m: f64,
    },
    /// The point could not be evaluated or the boundary was unusable.
    /// Treated as outside.
    Unevaluated,
}

impl Evaluation {
    /// Classifies a point from its containment and distance.
    #[must_use]
    pub fn classify(inside: bool, distance_m: f64) -> Self {
        match (inside, distance_m > NEAR_BOUNDARY_M) {
            (true, true) => Self::Inside { distance_m },
            (true, false) => Self::NearBoundaryInside { distance_m },
            (false, false) => Self::NearBoundaryOutside { distance_m },
            (false, true) => Self::Outside { distance_m },
        }
    }

    /// Whether the point is inside the boundary.
    #[must_use]
    pub const fn is_inside(&self) -> bool {
        matches!(self, Self::Inside { .. } | Self::NearBoundaryInside { .. })
    }

    /// Distance to the outline in meters, if the point was evaluated.
    #[must_use]
    pub const fn distance_m(&self) -> Option<f64> {
        match self {
            Self::Inside { distance_m }
            | Self::NearBoundaryInside { distance_m }
            | Self::NearBoundaryOutside { distance_m }
            | Self::Outside { distance_m } => Some(*distance_m),
            Self::Unevaluated => None,
        }
    }

    /// The signed decision value.
    ///
    /// | Case | Value |
    /// |---|---|
    /// | inside, > 50 m | `-999` |
    /// | inside, ≤ 50 m | `-distance` |
    /// | outside, ≤ 50 m | `distance` |
    /// | outside, > 50 m | `999` |
    /// | unevaluated | `999` |
    #[must_use]
    pub fn decision_value(&self) -> f64 {
        match self {
            Self::Inside { .. } => DEEP_INSIDE_DECISION,
            Self::NearBoundaryInside { distance_m } => -distance_m,
            Self::NearBoundaryOutside { distance_m } => *distance_m,
            Self::Outside { .. } | Self::Unevaluated => DEEP_OUTSIDE_DECISION,
        }
    }

    /// Whether this evaluation warrants an alert (`decision <= 0`).
    #[must_use]
    pub fn should_alert(&self) -> bool {
        self.decision_value() <= 0.0
    }
}

/// Flat view of an [`Evaluation`] for callers that expect plain numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationResult {
    /// Whether the point is inside the boundary.
    pub inside: bool,
    /// Distance to the outline in meters. Infinite when unevaluated.
    pub distance_to_boundary_m: f64,
    /// See [`Evaluation::decision_value`].
    pub signed_decision_value: f64,
}

impl From<Evaluation> for EvaluationResult {
    fn from(evaluation: Evaluation) -> Self {
        Self {
            inside: evaluation.is_inside(),
            distance_to_boundary_m: evaluation.distance_m().unwrap_or(f64::INFINITY),
            signed_decision_value: evaluation.decision_value(),
        }
    }
}

/// Evaluates `(lat, lon)` against `boundary`.
///
/// # Errors
///
/// Returns [`EvaluationError`] if the coordinate or the resulting distance
/// is not finite.
pub fn try_evaluate(
    lat: f64,
    lon: f64,
    boundary: &Boundary,
) -> Result<Evaluation, EvaluationError> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(EvaluationError::NonFiniteCoordinate { lat, lon });
    }

    let point = Point::new(lon, lat);
    let inside = boundary.polygon().contains(&point);
    let distance_m = Euclidean.distance(&point, boundary.ring()) * METERS_PER_DEGREE;

    if !distance_m.is_finite() {
        return Err(EvaluationError::NonFiniteDistance);
    }

    Ok(Evaluation::classify(inside, distance_m))
}

/// Evaluates `(lat, lon)` against `boundary`, logging any failure and
/// falling back to [`Evaluation::Unevaluated`].
#[must_use]
pub fn evaluate(lat: f64, lon: f64, boundary: &Boundary) -> Evaluation {
    log::info!("Checking point: lat={lat}, lon={lon}");
    try_evaluate(lat, lon, boundary).unwrap_or_else(|e| {
        log::error!("Geofence error: {e}");
        Evaluation::Unevaluated
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Boundary {
        Boundary::from_vertices(&[
            (5.869, 36.527),
            (5.870, 36.527),
            (5.870, 36.528),
            (5.869, 36.528),
        ])
        .unwrap()
    }

    #[test]
    fn deep_inside_is_saturated() {
        let evaluation = try_evaluate(36.5275, 5.8695, &square()).unwrap();
        assert!(evaluation.is_inside());
        assert!((evaluation.distance_m().unwrap() - 55.5).abs() < 1e-6);
        assert!((evaluation.decision_value() - DEEP_INSIDE_DECISION).abs() < f64::EPSILON);
        assert!(evaluation.should_alert());
    }

    #[test]
    fn near_inside_is_negative_distance() {
        let evaluation = try_evaluate(36.5272, 5.8695, &square()).unwrap();
        assert!(matches!(evaluation, Evaluation::NearBoundaryInside { .. }));
        assert!((evaluation.decision_value() - -22.2).abs() < 1e-6);
        assert!(evaluation.should_alert());
    }

    #[test]
    fn near_outside_is_positive_distance() {
        let evaluation = try_evaluate(36.5268, 5.8695, &square()).unwrap();
        assert!(matches!(evaluation, Evaluation::NearBoundaryOutside { .. }));
        assert!((evaluation.decision_value() - 22.2).abs() < 1e-6);
        assert!(!evaluation.should_alert());
    }

    #[test]
    fn deep_outside_is_saturated() {
        let evaluation = try_evaluate(36.6, 5.8695, &square()).unwrap();
        assert!(!evaluation.is_inside());
        assert!((evaluation.decision_value() - DEEP_OUTSIDE_DECISION).abs() < f64::EPSILON);
    }

    #[test]
    fn default_test_coordinate_alerts() {
        let evaluation = try_evaluate(36.5273, 5.86945, &square()).unwrap();
        assert!(matches!(evaluation, Evaluation::NearBoundaryInside { .. }));
        assert!((evaluation.decision_value() - -33.3).abs() < 1e-6);
    }

    #[test]
    fn decision_is_continuous_across_the_edge() {
        let boundary = square();
        let inside = try_evaluate(36.527_000_1, 5.8695, &boundary).unwrap();
        let outside = try_evaluate(36.526_999_9, 5.8695, &boundary).unwrap();

        assert!(inside.is_inside());
        assert!(!outside.is_inside());
        assert!(inside.decision_value() <= 0.0);
        assert!(outside.decision_value() > 0.0);
        assert!(inside.decision_value().abs() < 0.02);
        assert!(outside.decision_value().abs() < 0.02);
    }

    #[test]
    fn point_on_edge_is_outside_at_zero_distance() {
        let evaluation = try_evaluate(36.527, 5.8695, &square()).unwrap();
        assert!(!evaluation.is_inside());
        assert!(evaluation.decision_value().abs() < 1e-6);
    }

    #[test]
    fn non_finite_coordinate_falls_back_to_outside() {
        assert!(matches!(
            try_evaluate(f64::NAN, 5.8695, &square()),
            Err(EvaluationError::NonFiniteCoordinate { .. })
        ));

        let evaluation = evaluate(f64::NAN, 5.8695, &square());
        assert_eq!(evaluation, Evaluation::Unevaluated);
        assert!((evaluation.decision_value() - DEEP_OUTSIDE_DECISION).abs() < f64::EPSILON);
        assert!(!evaluation.should_alert());
    }

    #[test]
    fn flat_result_mirrors_evaluation() {
        let result = EvaluationResult::from(try_evaluate(36.5275, 5.8695, &square()).unwrap());
        assert!(result.inside);
        assert!(result.distance_to_boundary_m > NEAR_BOUNDARY_M);
        assert!((result.signed_decision_value - DEEP_INSIDE_DECISION).abs() < f64::EPSILON);

        let result = EvaluationResult::from(Evaluation::Unevaluated);
        assert!(!result.inside);
        assert!(result.distance_to_boundary_m.is_infinite());
    }
}
