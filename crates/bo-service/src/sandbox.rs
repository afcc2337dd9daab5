//! Sandbox optimizer and line server.
//!
//! [`GridRefinementService`] answers the protocol locally with a deterministic
//! grid search that narrows its box around the best observation after every
//! sweep. It has no external dependencies and exists so the client can be
//! exercised end to end without the real optimizer.

use async_trait::async_trait;
use bo_types::{BoResult, ConfigError, QueryVector};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::protocol;
use crate::service::{CallError, CallResult, ObservationRequest, OptimizationService, ServiceResponse};

/// Configuration for the sandbox optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRefinementConfig {
    /// `(low, high)` per dimension.
    pub bounds: Vec<(f64, f64)>,
    /// Grid points per dimension in each sweep. Odd counts keep the previous
    /// best on the next grid.
    pub points_per_axis: usize,
    /// Number of sweeps before the service reports exhaustion.
    pub stages: usize,
    pub maximize: bool,
}

impl Default for GridRefinementConfig {
    fn default() -> Self {
        Self {
            bounds: vec![(0.0, 1.0)],
            points_per_axis: 11,
            stages: 6,
            maximize: true,
        }
    }
}

impl GridRefinementConfig {
    pub fn new(bounds: Vec<(f64, f64)>) -> Self {
        Self {
            bounds,
            ..Default::default()
        }
    }

    pub fn with_points_per_axis(mut self, n: usize) -> Self {
        self.points_per_axis = n;
        self
    }

    pub fn with_stages(mut self, n: usize) -> Self {
        self.stages = n;
        self
    }

    pub fn with_maximize(mut self, maximize: bool) -> Self {
        self.maximize = maximize;
        self
    }

    /// Total number of queries the service will propose.
    pub fn budget(&self) -> usize {
        self.points_per_axis
            .checked_pow(self.bounds.len() as u32)
            .and_then(|per_stage| per_stage.checked_mul(self.stages))
            .unwrap_or(usize::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bounds.is_empty() {
            return Err(ConfigError::invalid("bounds", "at least one dimension required"));
        }
        for (i, (low, high)) in self.bounds.iter().enumerate() {
            if !low.is_finite() || !high.is_finite() || low >= high {
                return Err(ConfigError::invalid(
                    format!("bounds[{i}]"),
                    format!("expected finite low < high, got ({low}, {high})"),
                ));
            }
        }
        if self.points_per_axis < 2 {
            return Err(ConfigError::invalid("points_per_axis", "must be at least 2"));
        }
        if self.stages == 0 {
            return Err(ConfigError::invalid("stages", "must be at least 1"));
        }
        Ok(())
    }
}

/// Deterministic grid-refinement stand-in for the optimizer.
#[derive(Debug, Clone)]
pub struct GridRefinementService {
    config: GridRefinementConfig,
    region: Vec<(f64, f64)>,
    queue: VecDeque<QueryVector>,
    pending: Option<QueryVector>,
    best: Option<(QueryVector, f64)>,
    stage: usize,
    proposed: usize,
}

impl GridRefinementService {
    pub fn new(config: GridRefinementConfig) -> BoResult<Self> {
        config.validate()?;
        let region = config.bounds.clone();
        let queue = build_grid(&region, config.points_per_axis);
        Ok(Self {
            config,
            region,
            queue,
            pending: None,
            best: None,
            stage: 0,
            proposed: 0,
        })
    }

    /// Best observation reported so far.
    pub fn best(&self) -> Option<(&QueryVector, f64)> {
        self.best.as_ref().map(|(q, v)| (q, *v))
    }

    /// Zero-based index of the current sweep.
    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Current search box.
    pub fn region(&self) -> &[(f64, f64)] {
        &self.region
    }

    fn record(&mut self, query: QueryVector, value: f64) {
        let improves = match &self.best {
            None => true,
            Some((_, best)) if self.config.maximize => value > *best,
            Some((_, best)) => value < *best,
        };
        if improves {
            self.best = Some((query, value));
        }
    }

    /// Shrink the box to one grid step around the best point, clamped to the
    /// original bounds.
    fn refine(&mut self) {
        let Some((best, _)) = &self.best else {
            return;
        };
        let steps = (self.config.points_per_axis - 1) as f64;
        self.region = self
            .region
            .iter()
            .zip(self.config.bounds.iter())
            .zip(best.iter())
            .map(|(((low, high), (min, max)), centre)| {
                let step = (high - low) / steps;
                ((centre - step).max(*min), (centre + step).min(*max))
            })
            .collect();
    }
}

fn axis(low: f64, high: f64, points: usize) -> Vec<f64> {
    let steps = (points - 1) as f64;
    (0..points)
        .map(|i| low + (high - low) * i as f64 / steps)
        .collect()
}

/// Cartesian product of evenly spaced points on every axis of `region`.
fn build_grid(region: &[(f64, f64)], points: usize) -> VecDeque<QueryVector> {
    let mut grid: Vec<Vec<f64>> = vec![Vec::new()];
    for (low, high) in region {
        let values = axis(*low, *high, points);
        let mut next = Vec::with_capacity(grid.len() * values.len());
        for existing in &grid {
            for v in &values {
                let mut point = existing.clone();
                point.push(*v);
                next.push(point);
            }
        }
        grid = next;
    }
    grid.into_iter().map(QueryVector::new).collect()
}

#[async_trait]
impl OptimizationService for GridRefinementService {
    async fn call(&mut self, request: ObservationRequest) -> CallResult<ServiceResponse> {
        match (self.pending.take(), request.value) {
            (Some(query), Some(value)) => self.record(query, value),
            (Some(query), None) => {
                self.pending = Some(query);
                return Err(CallError::Unexpected {
                    message: "report without a value while a query is pending".into(),
                });
            }
            // Kickoff: any sentinel value is ignored.
            (None, _) => {}
        }

        if self.queue.is_empty() {
            if self.stage + 1 >= self.config.stages {
                debug!(proposed = self.proposed, "sandbox budget exhausted");
                return Err(CallError::Exhausted {
                    budget: self.proposed,
                });
            }
            self.refine();
            self.stage += 1;
            self.queue = build_grid(&self.region, self.config.points_per_axis);
            debug!(stage = self.stage, region = ?self.region, "sandbox refined search box");
        }

        match self.queue.pop_front() {
            Some(next) => {
                self.proposed += 1;
                self.pending = Some(next.clone());
                Ok(ServiceResponse { next })
            }
            None => Err(CallError::Exhausted {
                budget: self.proposed,
            }),
        }
    }
}

/// Serve `service` over one connection until the peer closes it.
///
/// Returns the number of requests answered. Failed calls are answered with an
/// error line and the connection stays open, as the client decides when to
/// stop.
pub async fn serve_connection<S: OptimizationService>(
    stream: TcpStream,
    service: &mut S,
) -> std::io::Result<usize> {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match protocol::decode_request(&line) {
            Ok(request) => service.call(request).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &reply {
            warn!(peer = %peer, error = %e, "call failed");
        }
        let encoded = protocol::encode_reply(&reply)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        write.write_all(encoded.as_bytes()).await?;
        write.flush().await?;
        handled += 1;
    }

    let _ = write.shutdown().await;
    info!(peer = %peer, handled, "client disconnected");
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forrester(x: f64) -> f64 {
        -(6.0 * x - 2.0).powi(2) * (12.0 * x - 4.0).sin()
    }

    #[test]
    fn config_validation() {
        assert!(GridRefinementConfig::default().validate().is_ok());
        assert!(GridRefinementConfig::new(vec![]).validate().is_err());
        assert!(GridRefinementConfig::new(vec![(1.0, 0.0)]).validate().is_err());
        assert!(GridRefinementConfig::default()
            .with_points_per_axis(1)
            .validate()
            .is_err());
        assert!(GridRefinementConfig::default().with_stages(0).validate().is_err());
    }

    #[test]
    fn budget_counts_every_sweep() {
        let config = GridRefinementConfig::new(vec![(0.0, 1.0), (0.0, 1.0)])
            .with_points_per_axis(3)
            .with_stages(4);
        assert_eq!(config.budget(), 36);
    }

    #[test]
    fn grid_is_cartesian_product() {
        let grid = build_grid(&[(0.0, 1.0), (10.0, 20.0)], 3);
        assert_eq!(grid.len(), 9);
        assert_eq!(grid[0].as_slice(), &[0.0, 10.0]);
        assert_eq!(grid[4].as_slice(), &[0.5, 15.0]);
        assert_eq!(grid[8].as_slice(), &[1.0, 20.0]);
    }

    #[tokio::test]
    async fn first_sweep_walks_the_grid() {
        let mut service = GridRefinementService::new(
            GridRefinementConfig::default().with_points_per_axis(5),
        )
        .unwrap();

        let first = service.call(ObservationRequest::kickoff()).await.unwrap();
        assert_eq!(first.next.as_slice(), &[0.0]);
        let second = service.call(ObservationRequest::observed(1.0)).await.unwrap();
        assert_eq!(second.next.as_slice(), &[0.25]);
    }

    #[tokio::test]
    async fn report_without_value_is_rejected() {
        let mut service = GridRefinementService::new(GridRefinementConfig::default()).unwrap();
        service.call(ObservationRequest::kickoff()).await.unwrap();

        let err = service.call(ObservationRequest::kickoff()).await.unwrap_err();
        assert!(matches!(err, CallError::Unexpected { .. }));

        // The pending query is kept, so a proper report still works.
        assert!(service.call(ObservationRequest::observed(0.5)).await.is_ok());
    }

    #[tokio::test]
    async fn refines_towards_forrester_maximum_then_exhausts() {
        let config = GridRefinementConfig::default();
        let budget = config.budget();
        let mut service = GridRefinementService::new(config).unwrap();

        let mut request = ObservationRequest::kickoff_with(Some(0.0));
        let mut proposed = 0;
        loop {
            match service.call(request).await {
                Ok(response) => {
                    proposed += 1;
                    request = ObservationRequest::observed(forrester(response.next[0]));
                }
                Err(CallError::Exhausted { budget: reported }) => {
                    assert_eq!(reported, budget);
                    break;
                }
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }

        assert_eq!(proposed, budget);
        let (best_x, best_y) = service.best().unwrap();
        assert!((best_x[0] - 0.757).abs() < 1e-3, "best x = {}", best_x[0]);
        assert!((best_y - 6.021).abs() < 1e-3, "best y = {best_y}");
        assert_eq!(service.stage(), 5);

        // Stays exhausted.
        assert!(service.call(ObservationRequest::observed(0.0)).await.is_err());
    }

    #[tokio::test]
    async fn minimizing_tracks_lowest_value() {
        let mut service = GridRefinementService::new(
            GridRefinementConfig::default()
                .with_points_per_axis(3)
                .with_stages(1)
                .with_maximize(false),
        )
        .unwrap();

        let mut request = ObservationRequest::kickoff();
        while let Ok(response) = service.call(request).await {
            let x = response.next[0];
            request = ObservationRequest::observed((x - 0.5).powi(2));
        }
        let (best_x, best_y) = service.best().unwrap();
        assert_eq!(best_x.as_slice(), &[0.5]);
        assert_eq!(best_y, 0.0);
    }
}
