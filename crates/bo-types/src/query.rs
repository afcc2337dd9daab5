//! Query vectors and recorded observations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

use crate::format::format_vector;

/// Decimal digits used when a query vector is displayed.
pub const DISPLAY_PRECISION: usize = 3;

/// A proposed point in the search space.
///
/// Serialized transparently as a JSON array of numbers. Bounds are the
/// service's concern; the only checks offered here are dimensionality and
/// finiteness.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryVector(Vec<f64>);

impl QueryVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Number of components.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Largest absolute per-component difference to `other`, or `None` when
    /// the dimensions differ.
    pub fn chebyshev_distance(&self, other: &QueryVector) -> Option<f64> {
        if self.dim() != other.dim() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }
}

impl Deref for QueryVector {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<f64>> for QueryVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl From<&[f64]> for QueryVector {
    fn from(values: &[f64]) -> Self {
        Self(values.to_vec())
    }
}

impl fmt::Display for QueryVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_vector(&self.0, DISPLAY_PRECISION))
    }
}

/// One evaluation result: the query evaluated and the value obtained.
///
/// Fields are private so a recorded observation cannot be altered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    iteration: usize,
    query: QueryVector,
    value: f64,
}

impl Observation {
    pub fn new(iteration: usize, query: QueryVector, value: f64) -> Self {
        Self {
            iteration,
            query,
            value,
        }
    }

    /// 1-based iteration at which the observation was made.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn query(&self) -> &QueryVector {
        &self.query
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}
