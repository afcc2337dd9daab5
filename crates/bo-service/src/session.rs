//! Scoped connection to the optimization service.

use bo_types::{BoResult, ServiceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::tcp::TcpServiceClient;

/// Where the service lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoint {
    /// `host:port` of the optimization service.
    pub address: String,

    /// Give up waiting for the service after this long. `None` waits forever.
    pub connect_timeout_ms: Option<u64>,

    /// Delay between connection attempts while the service is down.
    pub poll_interval_ms: u64,
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5555".to_string(),
            connect_timeout_ms: None,
            poll_interval_ms: 200,
        }
    }
}

impl ServiceEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// A live connection to the service, acquired once per process.
///
/// The harness only sees the [`TcpServiceClient`] through
/// [`ServiceSession::service`], so it stays independent of how the
/// connection was established.
#[derive(Debug)]
pub struct ServiceSession {
    client: TcpServiceClient,
    opened_at: DateTime<Utc>,
    attempts: usize,
}

impl ServiceSession {
    /// Wait until the service accepts a connection.
    ///
    /// Polls every `poll_interval_ms`. Fails with
    /// [`ServiceError::Unavailable`] once `connect_timeout_ms` has elapsed,
    /// or never when no timeout is configured.
    pub async fn open(endpoint: &ServiceEndpoint) -> BoResult<Self> {
        let started = Instant::now();
        let timeout = endpoint.connect_timeout();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let attempt = match timeout {
                // A single attempt may not outlive the remaining budget.
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    match tokio::time::timeout(remaining, TcpStream::connect(&endpoint.address)).await {
                        Ok(result) => result,
                        Err(_) => Err(io::Error::new(ErrorKind::TimedOut, "connect attempt timed out")),
                    }
                }
                None => TcpStream::connect(&endpoint.address).await,
            };
            match attempt {
                Ok(stream) => {
                    info!(
                        address = %endpoint.address,
                        attempts,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "connected to optimization service"
                    );
                    return Ok(Self {
                        client: TcpServiceClient::from_stream(stream, endpoint.address.clone()),
                        opened_at: Utc::now(),
                        attempts,
                    });
                }
                Err(e) if e.kind() == ErrorKind::InvalidInput => {
                    return Err(ServiceError::InvalidAddress {
                        address: endpoint.address.clone(),
                        message: e.to_string(),
                    }
                    .into());
                }
                Err(e) => {
                    let waited = started.elapsed();
                    let mut delay = endpoint.poll_interval();
                    if let Some(limit) = timeout {
                        if waited >= limit {
                            warn!(address = %endpoint.address, attempts, "optimization service unavailable");
                            return Err(ServiceError::Unavailable {
                                address: endpoint.address.clone(),
                                waited_ms: waited.as_millis() as u64,
                            }
                            .into());
                        }
                        delay = delay.min(limit - waited);
                    }
                    debug!(address = %endpoint.address, attempt = attempts, error = %e, "service not reachable yet");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// The connected client, for handing to the harness.
    pub fn service(&mut self) -> &mut TcpServiceClient {
        &mut self.client
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Connection attempts made before the service answered.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Release the connection.
    pub async fn close(mut self) -> BoResult<()> {
        let calls = self.client.calls();
        self.client
            .shutdown()
            .await
            .map_err(|e| ServiceError::Shutdown {
                message: e.to_string(),
            })?;
        info!(
            address = %self.client.address(),
            calls,
            opened_at = %self.opened_at,
            open_ms = (Utc::now() - self.opened_at).num_milliseconds(),
            "session closed"
        );
        Ok(())
    }
}
