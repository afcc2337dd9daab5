//! Final check of a run against a known optimum.

use bo_types::QueryVector;
use serde::{Deserialize, Serialize};

use crate::state::RunState;

/// Known optimum and the tolerances a run must meet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceCriteria {
    pub optimum_value: f64,
    /// Every location attaining the optimum. Empty skips the location check.
    pub optimum_locations: Vec<QueryVector>,
    pub value_tolerance: f64,
    /// Maximum per-component distance to the nearest optimum location.
    pub location_tolerance: f64,
}

impl ConvergenceCriteria {
    pub fn new(optimum_value: f64, optimum_location: impl Into<QueryVector>) -> Self {
        Self {
            optimum_value,
            optimum_locations: vec![optimum_location.into()],
            value_tolerance: 1e-3,
            location_tolerance: 1e-3,
        }
    }

    pub fn with_location(mut self, location: impl Into<QueryVector>) -> Self {
        self.optimum_locations.push(location.into());
        self
    }

    pub fn with_tolerances(mut self, value_tolerance: f64, location_tolerance: f64) -> Self {
        self.value_tolerance = value_tolerance;
        self.location_tolerance = location_tolerance;
        self
    }

    /// Check the best observation in `state`.
    pub fn verify(&self, state: &RunState) -> Result<ConvergenceReport, ConvergenceError> {
        let best = state.best().ok_or(ConvergenceError::NoObservations)?;

        let value_error = (best.value() - self.optimum_value).abs();
        // Negated comparisons so a NaN error fails.
        if !(value_error <= self.value_tolerance) {
            return Err(ConvergenceError::ValueOutOfTolerance {
                expected: self.optimum_value,
                actual: best.value(),
                tolerance: self.value_tolerance,
            });
        }

        let location_error = match self.nearest_location(best.query())? {
            None => None,
            Some((nearest, distance)) => {
                if !(distance <= self.location_tolerance) {
                    return Err(ConvergenceError::LocationOutOfTolerance {
                        nearest: nearest.clone(),
                        actual: best.query().clone(),
                        distance,
                        tolerance: self.location_tolerance,
                    });
                }
                Some(distance)
            }
        };

        Ok(ConvergenceReport {
            best_value: best.value(),
            best_query: best.query().clone(),
            found_at_iteration: best.iteration(),
            iterations: state.iteration(),
            value_error,
            location_error,
        })
    }

    fn nearest_location<'a>(
        &'a self,
        query: &QueryVector,
    ) -> Result<Option<(&'a QueryVector, f64)>, ConvergenceError> {
        if self.optimum_locations.is_empty() {
            return Ok(None);
        }
        let nearest = self
            .optimum_locations
            .iter()
            .filter_map(|loc| loc.chebyshev_distance(query).map(|d| (loc, d)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some(found) => Ok(Some(found)),
            None => Err(ConvergenceError::DimensionMismatch {
                expected: self.optimum_locations[0].dim(),
                actual: query.dim(),
            }),
        }
    }
}

/// Summary of a run that met its criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub best_value: f64,
    pub best_query: QueryVector,
    pub found_at_iteration: usize,
    pub iterations: usize,
    pub value_error: f64,
    pub location_error: Option<f64>,
}

/// Ways a run can miss its criteria.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvergenceError {
    #[error("run recorded no observations")]
    NoObservations,

    #[error("best value {actual:.6} differs from optimum {expected:.6} by more than {tolerance}")]
    ValueOutOfTolerance {
        expected: f64,
        actual: f64,
        tolerance: f64,
    },

    #[error("best location {actual} is {distance:.6} from nearest optimum {nearest}, tolerance {tolerance}")]
    LocationOutOfTolerance {
        nearest: QueryVector,
        actual: QueryVector,
        distance: f64,
        tolerance: f64,
    },

    #[error("best location has {actual} components, optimum has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}
