//! Scripted service for tests.

use async_trait::async_trait;
use bo_types::QueryVector;
use std::collections::VecDeque;

use crate::service::{CallError, CallResult, ObservationRequest, OptimizationService, ServiceResponse};

/// One scripted answer.
#[derive(Debug)]
pub enum ScriptStep {
    Next(QueryVector),
    Fail(CallError),
}

/// Answers calls from a fixed script, one step per call, and records every
/// request it receives. Once the script runs out every call answers
/// [`CallError::Exhausted`].
#[derive(Debug, Default)]
pub struct ScriptedService {
    steps: VecDeque<ScriptStep>,
    received: Vec<ObservationRequest>,
    served: usize,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A script that proposes each of `queries` in turn.
    pub fn from_queries<I, Q>(queries: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<QueryVector>,
    {
        Self {
            steps: queries
                .into_iter()
                .map(|q| ScriptStep::Next(q.into()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn then_query(mut self, query: impl Into<QueryVector>) -> Self {
        self.steps.push_back(ScriptStep::Next(query.into()));
        self
    }

    pub fn then_fail(mut self, error: CallError) -> Self {
        self.steps.push_back(ScriptStep::Fail(error));
        self
    }

    /// Requests received so far, in order.
    pub fn received(&self) -> &[ObservationRequest] {
        &self.received
    }

    pub fn calls(&self) -> usize {
        self.received.len()
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl OptimizationService for ScriptedService {
    async fn call(&mut self, request: ObservationRequest) -> CallResult<ServiceResponse> {
        self.received.push(request);
        match self.steps.pop_front() {
            Some(ScriptStep::Next(next)) => {
                self.served += 1;
                Ok(ServiceResponse { next })
            }
            Some(ScriptStep::Fail(error)) => Err(error),
            None => Err(CallError::Exhausted {
                budget: self.served,
            }),
        }
    }
}
