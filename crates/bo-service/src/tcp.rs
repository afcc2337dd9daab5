//! TCP-backed service client.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol;
use crate::service::{CallError, CallResult, ObservationRequest, OptimizationService, ServiceResponse};

/// Talks to a remote optimizer over one TCP connection, one line per message.
#[derive(Debug)]
pub struct TcpServiceClient {
    address: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: String,
    calls: usize,
}

impl TcpServiceClient {
    /// Connect once, without waiting for the service to come up. See
    /// [`crate::ServiceSession::open`] for the waiting variant.
    pub async fn connect(address: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        Ok(Self::from_stream(stream, address))
    }

    pub fn from_stream(stream: TcpStream, address: impl Into<String>) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            address: address.into(),
            reader: BufReader::new(read),
            writer,
            line: String::new(),
            calls: 0,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of calls issued on this connection.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Close the write side so the service sees end of stream.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }
}

#[async_trait]
impl OptimizationService for TcpServiceClient {
    async fn call(&mut self, request: ObservationRequest) -> CallResult<ServiceResponse> {
        self.calls += 1;
        let payload = protocol::encode_request(&request)?;
        self.writer.write_all(payload.as_bytes()).await?;
        self.writer.flush().await?;

        self.line.clear();
        let read = self.reader.read_line(&mut self.line).await?;
        if read == 0 {
            return Err(CallError::Closed);
        }
        debug!(address = %self.address, call = self.calls, reply = %self.line.trim(), "service replied");
        protocol::decode_reply(&self.line)
    }
}
