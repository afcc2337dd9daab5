//! # bo-service
//!
//! The request/response seam between the test client and the optimization
//! service.
//!
//! Provides the [`OptimizationService`] trait, the newline-delimited JSON wire
//! protocol, a TCP-backed client with a scoped [`ServiceSession`], a
//! [`ScriptedService`] fake for unit tests, and a deterministic
//! [`GridRefinementService`] sandbox that stands in for the real optimizer.

pub mod protocol;
mod sandbox;
mod scripted;
mod service;
mod session;
mod tcp;

pub use sandbox::{serve_connection, GridRefinementConfig, GridRefinementService};
pub use scripted::{ScriptStep, ScriptedService};
pub use service::{CallError, CallResult, ObservationRequest, OptimizationService, ServiceResponse};
pub use session::{ServiceEndpoint, ServiceSession};
pub use tcp::TcpServiceClient;
