//! Benchmark objectives with known optima.

use bo_types::{ConfigError, QueryVector};
use std::f64::consts::PI;
use std::fmt;

use crate::convergence::ConvergenceCriteria;
use crate::objective::{branin, forrester, Objective};

/// A benchmark objective together with its search box and known optimum.
#[derive(Clone)]
pub struct Benchmark {
    name: &'static str,
    function: fn(&[f64]) -> f64,
    bounds: Vec<(f64, f64)>,
    optimum_value: f64,
    optimum_locations: Vec<QueryVector>,
}

impl Benchmark {
    /// Names accepted by [`Benchmark::by_name`].
    pub const NAMES: &'static [&'static str] = &["forrester", "branin"];

    /// Negated Forrester on `[0, 1]`, maximum 6.02074 at x = 0.757249.
    pub fn forrester() -> Self {
        Self {
            name: "forrester",
            function: forrester,
            bounds: vec![(0.0, 1.0)],
            optimum_value: 6.020_740_055_767,
            optimum_locations: vec![QueryVector::new(vec![0.757_248_757])],
        }
    }

    /// Negated Branin-Hoo on `[-5, 10] x [0, 15]`, maximum -0.397887 at three
    /// locations.
    pub fn branin() -> Self {
        Self {
            name: "branin",
            function: branin,
            bounds: vec![(-5.0, 10.0), (0.0, 15.0)],
            optimum_value: -0.397_887_357_730,
            optimum_locations: vec![
                QueryVector::new(vec![-PI, 12.275]),
                QueryVector::new(vec![PI, 2.275]),
                QueryVector::new(vec![9.424_78, 2.475]),
            ],
        }
    }

    pub fn by_name(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "forrester" => Ok(Self::forrester()),
            "branin" => Ok(Self::branin()),
            _ => Err(ConfigError::UnknownBenchmark {
                name: name.to_string(),
            }),
        }
    }

    pub fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    pub fn optimum_value(&self) -> f64 {
        self.optimum_value
    }

    pub fn optimum_locations(&self) -> &[QueryVector] {
        &self.optimum_locations
    }

    /// Convergence criteria for this benchmark's optimum.
    pub fn criteria(&self, value_tolerance: f64, location_tolerance: f64) -> ConvergenceCriteria {
        ConvergenceCriteria {
            optimum_value: self.optimum_value,
            optimum_locations: self.optimum_locations.clone(),
            value_tolerance,
            location_tolerance,
        }
    }
}

impl fmt::Debug for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Benchmark")
            .field("name", &self.name)
            .field("bounds", &self.bounds)
            .field("optimum_value", &self.optimum_value)
            .finish_non_exhaustive()
    }
}

impl Objective for Benchmark {
    fn name(&self) -> &str {
        self.name
    }

    fn dim(&self) -> usize {
        self.bounds.len()
    }

    fn evaluate(&self, x: &[f64]) -> f64 {
        (self.function)(x)
    }
}
