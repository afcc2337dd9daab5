//! The observe/propose loop against an optimization service.
//!
//! One run goes through
//! `AwaitingFirstQuery -> Evaluating -> Reporting -> AwaitingNextQuery ->
//! Evaluating -> ... -> Terminated`. Each service call is awaited before
//! anything else happens, and any failed call ends the run: the service is
//! expected to fail only once it has used up its budget.

use bo_service::{ObservationRequest, OptimizationService};
use bo_types::{format_scalar, format_vector, Observation, QueryVector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::convergence::{ConvergenceCriteria, ConvergenceError, ConvergenceReport};
use crate::objective::Objective;
use crate::state::{ObjectiveDirection, RunState};

/// Decimal digits for observed and best values in log lines.
const VALUE_PRECISION: usize = 2;

/// Unique run identifier.
pub type RunId = Uuid;

/// Knobs for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopOptions {
    pub direction: ObjectiveDirection,

    /// Value sent on the kickoff call for services that expect one. `None`
    /// sends a kickoff with no value.
    pub kickoff_sentinel: Option<f64>,

    /// Stop after this many evaluations even if the service would continue.
    pub max_iterations: Option<usize>,

    /// Decimal digits used when logging query vectors.
    pub log_precision: usize,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            direction: ObjectiveDirection::Maximize,
            kickoff_sentinel: None,
            max_iterations: None,
            log_precision: 3,
        }
    }
}

impl LoopOptions {
    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_kickoff_sentinel(mut self, sentinel: f64) -> Self {
        self.kickoff_sentinel = Some(sentinel);
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_log_precision(mut self, precision: usize) -> Self {
        self.log_precision = precision;
        self
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarnessPhase {
    AwaitingFirstQuery,
    Evaluating,
    Reporting,
    AwaitingNextQuery,
    Terminated,
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    /// The kickoff call failed; nothing was evaluated.
    KickoffFailed { reason: String },
    /// A report call failed. This is how a healthy service signals that it
    /// has finished.
    ServiceFinished { call: usize, reason: String },
    /// The service proposed a query the objective cannot evaluate.
    InvalidQuery { call: usize, reason: String },
    /// The client-side iteration cap was reached.
    IterationCap { cap: usize },
}

/// Events recorded during a run, mirroring the log lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HarnessEvent {
    IterationStarted {
        iteration: usize,
        query: QueryVector,
        /// The query as logged, at [`LoopOptions::log_precision`].
        x_new: String,
    },
    ObservationRecorded {
        observation: Observation,
        best_value: f64,
        improved: bool,
    },
    Terminated {
        termination: Termination,
    },
}

/// Everything known about a run once it has terminated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub state: RunState,
    /// Every observation in the order it was made.
    pub history: Vec<Observation>,
    pub termination: Termination,
    /// Service calls issued, including the kickoff and the failed call.
    pub calls: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn evaluations(&self) -> usize {
        self.history.len()
    }

    pub fn verify(
        &self,
        criteria: &ConvergenceCriteria,
    ) -> Result<ConvergenceReport, ConvergenceError> {
        criteria.verify(&self.state)
    }
}

/// Drives one objective through runs against an [`OptimizationService`].
pub struct OptimizationLoop<O: Objective> {
    objective: O,
    options: LoopOptions,
    phase: HarnessPhase,
    events: Vec<HarnessEvent>,
}

impl<O: Objective> OptimizationLoop<O> {
    pub fn new(objective: O, options: LoopOptions) -> Self {
        Self {
            objective,
            options,
            phase: HarnessPhase::AwaitingFirstQuery,
            events: Vec::new(),
        }
    }

    /// Run until the service stops proposing queries.
    ///
    /// Service failures are not errors here: they end the run and are
    /// recorded in [`RunOutcome::termination`]. Events left over from a
    /// previous run are discarded.
    pub async fn run<S: OptimizationService>(&mut self, service: &mut S) -> RunOutcome {
        self.events.clear();
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut state = RunState::new(self.options.direction);
        let mut history = Vec::new();
        let mut calls = 0;

        info!(
            run = %run_id,
            objective = %self.objective.name(),
            dim = self.objective.dim(),
            "optimization run started"
        );

        self.phase = HarnessPhase::AwaitingFirstQuery;
        calls += 1;
        let kickoff = ObservationRequest::kickoff_with(self.options.kickoff_sentinel);
        let mut query = match service.call(kickoff).await {
            Ok(response) => response.next,
            Err(e) => {
                warn!(run = %run_id, error = %e, "kickoff call failed");
                let termination = Termination::KickoffFailed {
                    reason: e.to_string(),
                };
                return self.finish(run_id, state, history, termination, calls, started_at);
            }
        };

        let termination = loop {
            if let Some(reason) = self.reject_reason(&query) {
                warn!(run = %run_id, call = calls, reason = %reason, "invalid query from service");
                break Termination::InvalidQuery {
                    call: calls,
                    reason,
                };
            }
            if let Some(cap) = self.options.max_iterations {
                if state.iteration() >= cap {
                    info!(run = %run_id, cap, "iteration cap reached");
                    break Termination::IterationCap { cap };
                }
            }

            self.phase = HarnessPhase::Evaluating;
            let iteration = state.start_iteration(query.clone());
            let x_new = format_vector(&query, self.options.log_precision);
            info!(iteration, x_new = %x_new, "evaluating query");
            self.events.push(HarnessEvent::IterationStarted {
                iteration,
                query: query.clone(),
                x_new,
            });

            let value = self.objective.evaluate(&query);
            let observation = Observation::new(iteration, query, value);
            let improved = state.record(&observation);
            let best_value = state.best_value().unwrap_or(value);
            info!(
                iteration,
                y_new = %format_scalar(value, VALUE_PRECISION),
                y_best = %format_scalar(best_value, VALUE_PRECISION),
                improved,
                "observation recorded"
            );
            self.events.push(HarnessEvent::ObservationRecorded {
                observation: observation.clone(),
                best_value,
                improved,
            });
            history.push(observation);

            self.phase = HarnessPhase::Reporting;
            calls += 1;
            match service.call(ObservationRequest::observed(value)).await {
                Ok(response) => {
                    self.phase = HarnessPhase::AwaitingNextQuery;
                    query = response.next;
                }
                Err(e) => {
                    warn!(run = %run_id, call = calls, error = %e, "invalid response, shutting down");
                    break Termination::ServiceFinished {
                        call: calls,
                        reason: e.to_string(),
                    };
                }
            }
        };

        self.finish(run_id, state, history, termination, calls, started_at)
    }

    fn reject_reason(&self, query: &QueryVector) -> Option<String> {
        if query.dim() != self.objective.dim() {
            return Some(format!(
                "expected {} components, got {}",
                self.objective.dim(),
                query.dim()
            ));
        }
        if !query.is_finite() {
            return Some(format!("non-finite component in {query}"));
        }
        None
    }

    fn finish(
        &mut self,
        run_id: RunId,
        state: RunState,
        history: Vec<Observation>,
        termination: Termination,
        calls: usize,
        started_at: DateTime<Utc>,
    ) -> RunOutcome {
        self.phase = HarnessPhase::Terminated;
        self.events.push(HarnessEvent::Terminated {
            termination: termination.clone(),
        });
        info!(
            run = %run_id,
            evaluations = history.len(),
            calls,
            best = ?state.best_value(),
            termination = ?termination,
            "optimization run terminated"
        );
        RunOutcome {
            run_id,
            state,
            history,
            termination,
            calls,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> HarnessPhase {
        self.phase
    }

    pub fn objective(&self) -> &O {
        &self.objective
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    /// Drain all recorded events (consuming them).
    pub fn drain_events(&mut self) -> Vec<HarnessEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::Benchmark;
    use crate::objective::{forrester, FnObjective};
    use bo_service::{CallError, GridRefinementConfig, GridRefinementService, ScriptedService};

    fn forrester_loop(options: LoopOptions) -> OptimizationLoop<Benchmark> {
        OptimizationLoop::new(Benchmark::forrester(), options)
    }

    #[tokio::test]
    async fn kickoff_carries_no_value_by_default() {
        let mut service = ScriptedService::from_queries([vec![0.5]]);
        let mut harness = forrester_loop(LoopOptions::default());
        harness.run(&mut service).await;

        assert!(service.received()[0].is_kickoff());
        assert_eq!(service.received()[1].value, Some(forrester(&[0.5])));
    }

    #[tokio::test]
    async fn kickoff_sentinel_is_sent_when_configured() {
        let mut service = ScriptedService::from_queries([vec![0.5]]);
        let mut harness = forrester_loop(LoopOptions::default().with_kickoff_sentinel(0.0));
        harness.run(&mut service).await;

        assert_eq!(service.received()[0].value, Some(0.0));
    }

    #[tokio::test]
    async fn failure_on_call_k_stops_after_k_minus_one_evaluations() {
        let queries = [vec![0.1], vec![0.2], vec![0.757], vec![0.9]];
        let mut service = ScriptedService::from_queries(queries.clone()).then_fail(CallError::Rejected {
            message: "max iterations reached".into(),
        });
        // Call 5 fails, so exactly four observations are evaluated.
        let mut harness = forrester_loop(LoopOptions::default());
        let outcome = harness.run(&mut service).await;

        assert_eq!(outcome.evaluations(), 4);
        assert_eq!(outcome.calls, 5);
        assert_eq!(service.calls(), 5);
        assert_eq!(outcome.state.iteration(), 4);
        match &outcome.termination {
            Termination::ServiceFinished { call, reason } => {
                assert_eq!(*call, 5);
                assert!(reason.contains("max iterations"));
            }
            other => panic!("unexpected termination {other:?}"),
        }

        // The state at that point still feeds the convergence check.
        let best = outcome.state.best().unwrap();
        assert_eq!(best.query().as_slice(), &[0.757]);
        assert_eq!(best.iteration(), 3);
        assert!(outcome.verify(&Benchmark::forrester().criteria(1e-3, 1e-3)).is_ok());
        assert_eq!(harness.phase(), HarnessPhase::Terminated);
    }

    #[tokio::test]
    async fn failed_kickoff_ends_run_without_evaluations() {
        let mut service = ScriptedService::new().then_fail(CallError::Closed);
        let mut harness = forrester_loop(LoopOptions::default());
        let outcome = harness.run(&mut service).await;

        assert_eq!(outcome.evaluations(), 0);
        assert_eq!(outcome.calls, 1);
        assert!(matches!(outcome.termination, Termination::KickoffFailed { .. }));
        assert_eq!(
            outcome.verify(&Benchmark::forrester().criteria(1e-3, 1e-3)),
            Err(ConvergenceError::NoObservations)
        );
    }

    #[tokio::test]
    async fn wrong_dimension_query_is_never_evaluated() {
        let mut service = ScriptedService::from_queries([vec![0.3], vec![0.3, 0.4], vec![0.5]]);
        let mut harness = forrester_loop(LoopOptions::default());
        let outcome = harness.run(&mut service).await;

        assert_eq!(outcome.evaluations(), 1);
        assert_eq!(service.calls(), 2);
        assert!(matches!(
            outcome.termination,
            Termination::InvalidQuery { call: 2, .. }
        ));
    }

    #[tokio::test]
    async fn non_finite_query_is_rejected() {
        let mut service = ScriptedService::from_queries([vec![f64::NAN]]);
        let mut harness = forrester_loop(LoopOptions::default());
        let outcome = harness.run(&mut service).await;

        assert_eq!(outcome.evaluations(), 0);
        assert!(matches!(outcome.termination, Termination::InvalidQuery { call: 1, .. }));
    }

    #[tokio::test]
    async fn iteration_cap_stops_healthy_service() {
        let mut service = GridRefinementService::new(GridRefinementConfig::default()).unwrap();
        let mut harness = forrester_loop(LoopOptions::default().with_max_iterations(7));
        let outcome = harness.run(&mut service).await;

        assert_eq!(outcome.evaluations(), 7);
        assert_eq!(outcome.termination, Termination::IterationCap { cap: 7 });
    }

    #[tokio::test]
    async fn events_mirror_each_iteration() {
        let mut service = ScriptedService::from_queries([vec![0.9], vec![0.757], vec![0.1]]);
        let mut harness = forrester_loop(LoopOptions::default());
        let outcome = harness.run(&mut service).await;
        let events = harness.drain_events();

        // Two events per iteration plus the terminal one.
        assert_eq!(events.len(), 3 * 2 + 1);
        let improvements: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                HarnessEvent::ObservationRecorded { improved, .. } => Some(*improved),
                _ => None,
            })
            .collect();
        assert_eq!(improvements, vec![true, true, false]);
        assert!(matches!(
            events.last(),
            Some(HarnessEvent::Terminated { termination }) if *termination == outcome.termination
        ));
        assert!(harness.drain_events().is_empty());

        let started: Vec<(usize, Vec<f64>, String)> = events
            .iter()
            .filter_map(|e| match e {
                HarnessEvent::IterationStarted {
                    iteration,
                    query,
                    x_new,
                } => Some((*iteration, query.to_vec(), x_new.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            started,
            vec![
                (1, vec![0.9], "[0.900]".to_string()),
                (2, vec![0.757], "[0.757]".to_string()),
                (3, vec![0.1], "[0.100]".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn logged_query_follows_log_precision() {
        let mut service = ScriptedService::from_queries([vec![0.123456]]);
        let mut harness = forrester_loop(LoopOptions::default().with_log_precision(1));
        harness.run(&mut service).await;

        assert!(matches!(
            harness.drain_events().first(),
            Some(HarnessEvent::IterationStarted { x_new, .. }) if x_new == "[0.1]"
        ));
    }

    #[tokio::test]
    async fn rerunning_a_loop_starts_with_fresh_events() {
        let mut harness = forrester_loop(LoopOptions::default());

        let mut first = ScriptedService::from_queries([vec![0.2], vec![0.4]]);
        harness.run(&mut first).await;
        let mut second = ScriptedService::from_queries([vec![0.6]]);
        let outcome = harness.run(&mut second).await;

        let events = harness.drain_events();
        assert_eq!(events.len(), 2 + 1);
        assert!(matches!(
            events.first(),
            Some(HarnessEvent::IterationStarted { iteration: 1, query, .. }) if query.as_slice() == [0.6]
        ));
        assert!(matches!(
            events.last(),
            Some(HarnessEvent::Terminated { termination }) if *termination == outcome.termination
        ));
    }

    #[tokio::test]
    async fn best_never_decreases_over_a_run() {
        let mut service = GridRefinementService::new(GridRefinementConfig::default()).unwrap();
        let mut harness = forrester_loop(LoopOptions::default());
        harness.run(&mut service).await;

        let bests: Vec<f64> = harness
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                HarnessEvent::ObservationRecorded { best_value, .. } => Some(best_value),
                _ => None,
            })
            .collect();
        assert!(bests.windows(2).all(|w| w[1] >= w[0]));
    }

    #[tokio::test]
    async fn forrester_converges_against_sandbox_service() {
        let config = GridRefinementConfig::default();
        let budget = config.budget();
        let mut service = GridRefinementService::new(config).unwrap();
        let mut harness = forrester_loop(LoopOptions::default());
        let outcome = harness.run(&mut service).await;

        assert_eq!(outcome.evaluations(), budget);
        assert!(matches!(outcome.termination, Termination::ServiceFinished { .. }));

        let best_value = outcome.state.best_value().unwrap();
        let best_x = outcome.state.best_query().unwrap()[0];
        assert!((best_value - 6.021).abs() < 1e-3, "best value {best_value}");
        assert!((best_x - 0.757).abs() < 1e-3, "best x {best_x}");
        assert!(outcome
            .verify(&Benchmark::forrester().criteria(1e-3, 1e-3))
            .is_ok());
    }

    #[tokio::test]
    async fn minimizing_a_custom_objective() {
        let objective = FnObjective::new("bowl", 1, |x: &[f64]| (x[0] - 0.25).powi(2));
        let mut service = GridRefinementService::new(
            GridRefinementConfig::default().with_maximize(false),
        )
        .unwrap();
        let mut harness = OptimizationLoop::new(
            objective,
            LoopOptions::default().with_direction(ObjectiveDirection::Minimize),
        );
        let outcome = harness.run(&mut service).await;

        let criteria = ConvergenceCriteria::new(0.0, vec![0.25]).with_tolerances(1e-6, 1e-3);
        let report = outcome.verify(&criteria).unwrap();
        assert!(report.best_value < 1e-6);
    }
}
