//! Harness configuration from a JSON file or the environment.

use bo_service::ServiceEndpoint;
use bo_types::{BoResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::benchmark::Benchmark;
use crate::convergence::ConvergenceCriteria;
use crate::harness::LoopOptions;
use crate::state::ObjectiveDirection;

/// Top-level configuration for one client process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub service: ServiceEndpoint,

    /// Benchmark to evaluate, see [`Benchmark::NAMES`].
    pub benchmark: String,

    pub direction: ObjectiveDirection,

    /// Value sent with the kickoff call, for services that require one.
    pub kickoff_sentinel: Option<f64>,

    /// Client-side cap on evaluations. `None` leaves termination to the
    /// service.
    pub max_iterations: Option<usize>,

    pub log_precision: usize,

    pub value_tolerance: f64,
    pub location_tolerance: f64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            service: ServiceEndpoint::default(),
            benchmark: "forrester".to_string(),
            direction: ObjectiveDirection::Maximize,
            kickoff_sentinel: None,
            max_iterations: None,
            log_precision: 3,
            value_tolerance: 1e-3,
            location_tolerance: 1e-3,
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
}

impl HarnessConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> BoResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from `BO_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("BO_SERVICE_ADDR") {
            config.service.address = addr;
        }
        if let Some(raw) = lookup("BO_CONNECT_TIMEOUT_MS") {
            config.service.connect_timeout_ms = Some(parse_var("BO_CONNECT_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = lookup("BO_POLL_INTERVAL_MS") {
            config.service.poll_interval_ms = parse_var("BO_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(name) = lookup("BO_BENCHMARK") {
            config.benchmark = name;
        }
        if let Some(raw) = lookup("BO_DIRECTION") {
            config.direction = raw.parse()?;
        }
        if let Some(raw) = lookup("BO_KICKOFF_SENTINEL") {
            config.kickoff_sentinel = Some(parse_var("BO_KICKOFF_SENTINEL", &raw)?);
        }
        if let Some(raw) = lookup("BO_MAX_ITERATIONS") {
            config.max_iterations = Some(parse_var("BO_MAX_ITERATIONS", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.address.trim().is_empty() {
            return Err(ConfigError::invalid("service.address", "must not be empty"));
        }
        if self.service.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("service.poll_interval_ms", "must be positive"));
        }
        if self.max_iterations == Some(0) {
            return Err(ConfigError::invalid("max_iterations", "must be positive when set"));
        }
        if let Some(sentinel) = self.kickoff_sentinel {
            if !sentinel.is_finite() {
                return Err(ConfigError::invalid("kickoff_sentinel", "must be finite"));
            }
        }
        for (key, tolerance) in [
            ("value_tolerance", self.value_tolerance),
            ("location_tolerance", self.location_tolerance),
        ] {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(ConfigError::invalid(key, "must be finite and non-negative"));
            }
        }
        Benchmark::by_name(&self.benchmark)?;
        Ok(())
    }

    pub fn benchmark(&self) -> Result<Benchmark, ConfigError> {
        Benchmark::by_name(&self.benchmark)
    }

    pub fn criteria(&self) -> Result<ConvergenceCriteria, ConfigError> {
        Ok(self
            .benchmark()?
            .criteria(self.value_tolerance, self.location_tolerance))
    }

    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            direction: self.direction,
            kickoff_sentinel: self.kickoff_sentinel,
            max_iterations: self.max_iterations,
            log_precision: self.log_precision,
        }
    }

    pub fn with_service(mut self, service: ServiceEndpoint) -> Self {
        self.service = service;
        self
    }

    pub fn with_benchmark(mut self, name: &str) -> Self {
        self.benchmark = name.to_string();
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::Objective;
    use bo_types::BoError;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.benchmark, "forrester");
        assert_eq!(config.loop_options(), LoopOptions::default());
    }

    #[test]
    fn environment_overrides() {
        let config = HarnessConfig::from_lookup(lookup(&[
            ("BO_SERVICE_ADDR", "10.1.2.3:7000"),
            ("BO_CONNECT_TIMEOUT_MS", "2500"),
            ("BO_BENCHMARK", "branin"),
            ("BO_DIRECTION", "maximize"),
            ("BO_KICKOFF_SENTINEL", "0.0"),
            ("BO_MAX_ITERATIONS", "40"),
        ]))
        .unwrap();

        assert_eq!(config.service.address, "10.1.2.3:7000");
        assert_eq!(config.service.connect_timeout_ms, Some(2500));
        assert_eq!(config.benchmark().unwrap().dim(), 2);
        assert_eq!(config.kickoff_sentinel, Some(0.0));
        assert_eq!(config.loop_options().max_iterations, Some(40));
    }

    #[test]
    fn bad_environment_values_are_reported_by_key() {
        let err = HarnessConfig::from_lookup(lookup(&[("BO_MAX_ITERATIONS", "lots")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "BO_MAX_ITERATIONS"),
            other => panic!("unexpected {other:?}"),
        }

        let err = HarnessConfig::from_lookup(lookup(&[("BO_BENCHMARK", "ackley")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBenchmark { .. }));
    }

    #[test]
    fn validation_rejects_nonsense() {
        assert!(HarnessConfig::default().with_max_iterations(0).validate().is_err());

        let mut config = HarnessConfig::default();
        config.value_tolerance = -1.0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.service.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.kickoff_sentinel = Some(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_partial_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"service": {{"address": "127.0.0.1:6000", "connect_timeout_ms": 500}}, "max_iterations": 25}}"#
        )
        .unwrap();

        let config = HarnessConfig::from_file(file.path()).unwrap();
        assert_eq!(config.service.address, "127.0.0.1:6000");
        assert_eq!(config.service.connect_timeout_ms, Some(500));
        assert_eq!(config.service.poll_interval_ms, 200);
        assert_eq!(config.max_iterations, Some(25));
        assert_eq!(config.benchmark, "forrester");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = HarnessConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, BoError::Config(ConfigError::Unreadable { .. })));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = HarnessConfig::default().with_benchmark("branin");
        let json = serde_json::to_string(&config).unwrap();
        let back: HarnessConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
