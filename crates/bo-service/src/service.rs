//! Service abstraction for the optimization loop.

use async_trait::async_trait;
use bo_types::QueryVector;
use serde::{Deserialize, Serialize};

/// Observation report sent to the service.
///
/// `value` is absent on the kickoff call, when no query has been issued yet.
/// Services that predate the optional field can be fed a sentinel through
/// [`ObservationRequest::kickoff_with`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl ObservationRequest {
    /// Content-free request that asks for the first query.
    pub fn kickoff() -> Self {
        Self { value: None }
    }

    /// Kickoff request carrying `sentinel` in place of an observation.
    pub fn kickoff_with(sentinel: Option<f64>) -> Self {
        Self { value: sentinel }
    }

    /// Report the value observed for the previously issued query.
    pub fn observed(value: f64) -> Self {
        Self { value: Some(value) }
    }

    pub fn is_kickoff(&self) -> bool {
        self.value.is_none()
    }
}

/// A successful service reply: the next query to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub next: QueryVector,
}

impl ServiceResponse {
    pub fn new(next: impl Into<QueryVector>) -> Self {
        Self { next: next.into() }
    }
}

/// Errors surfaced by a single service call. Every variant ends the run.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("service rejected the request: {message}")]
    Rejected { message: String },
    #[error("service budget of {budget} queries exhausted")]
    Exhausted { budget: usize },
    #[error("connection closed by the service")]
    Closed,
    #[error("malformed message: {message}")]
    Malformed { message: String },
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected request: {message}")]
    Unexpected { message: String },
}

/// Result alias for service calls.
pub type CallResult<T> = Result<T, CallError>;

/// Core service interface.
///
/// A call reports one observation and yields the next query. Implementations
/// may talk to a remote optimizer (see [`crate::TcpServiceClient`]) or answer
/// from a script or a local sandbox. `&mut self` keeps at most one call in
/// flight.
#[async_trait]
pub trait OptimizationService: Send {
    async fn call(&mut self, request: ObservationRequest) -> CallResult<ServiceResponse>;
}
