//! Per-run bookkeeping.

use bo_types::{ConfigError, Observation, QueryVector};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Whether the objective is maximized or minimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl Default for ObjectiveDirection {
    fn default() -> Self {
        Self::Maximize
    }
}

impl ObjectiveDirection {
    /// True when `candidate` strictly improves on `incumbent`.
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }
}

impl FromStr for ObjectiveDirection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "maximize" | "max" => Ok(Self::Maximize),
            "minimize" | "min" => Ok(Self::Minimize),
            other => Err(ConfigError::invalid(
                "direction",
                format!("expected maximize or minimize, got {other:?}"),
            )),
        }
    }
}

/// Running state of one optimization run.
///
/// The best observation is always the best (per [`ObjectiveDirection`]) of
/// every observation recorded so far; ties keep the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    direction: ObjectiveDirection,
    iteration: usize,
    current_query: Option<QueryVector>,
    best: Option<Observation>,
}

impl RunState {
    pub fn new(direction: ObjectiveDirection) -> Self {
        Self {
            direction,
            iteration: 0,
            current_query: None,
            best: None,
        }
    }

    /// Move to the next iteration with `query` as the point under
    /// evaluation. Returns the new 1-based iteration index.
    pub fn start_iteration(&mut self, query: QueryVector) -> usize {
        self.iteration += 1;
        self.current_query = Some(query);
        self.iteration
    }

    /// Fold `observation` into the best-so-far. Returns true when it became
    /// the new best.
    pub fn record(&mut self, observation: &Observation) -> bool {
        let improved = match &self.best {
            None => true,
            Some(best) => self.direction.improves(observation.value(), best.value()),
        };
        if improved {
            self.best = Some(observation.clone());
        }
        improved
    }

    pub fn direction(&self) -> ObjectiveDirection {
        self.direction
    }

    /// Number of iterations started.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn current_query(&self) -> Option<&QueryVector> {
        self.current_query.as_ref()
    }

    pub fn best(&self) -> Option<&Observation> {
        self.best.as_ref()
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best.as_ref().map(Observation::value)
    }

    pub fn best_query(&self) -> Option<&QueryVector> {
        self.best.as_ref().map(Observation::query)
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(ObjectiveDirection::default())
    }
}
