use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::codec;
use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 4242;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

const RECV_CHUNK: usize = 4096;

/// One-shot TCP transport to a NeoHub.
///
/// Every exchange opens a fresh connection: connect, send, receive, close.
/// The hub protocol is strictly one command / one reply per connection, and
/// a stuck socket from one exchange can never poison the next. The stream is
/// dropped on every exit path, so an abandoned caller leaks nothing.
#[derive(Debug, Clone)]
pub struct Transport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Transport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Liveness probe: connect, then close immediately.
    pub async fn probe(&self) -> bool {
        self.connect().await.is_ok()
    }

    /// One full command/reply exchange on a fresh connection.
    pub async fn exchange(&self, command: &Value) -> Result<Value> {
        let mut stream = self.connect().await?;
        trace!(host = %self.host, port = self.port, %command, "sending command");

        stream
            .write_all(&codec::encode(command))
            .await
            .map_err(|e| Error::Unreachable(format!("send failed: {e}")))?;

        let buf = self.receive(&mut stream).await?;
        codec::decode(&buf)
    }

    async fn connect(&self) -> Result<TcpStream> {
        let addr = (self.host.as_str(), self.port);
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(Error::Unreachable(e.to_string())),
            Err(_) => Err(Error::Unreachable(format!(
                "connect timed out after {:?}",
                self.connect_timeout
            ))),
        }
    }

    /// Receive until the codec sees a complete frame, the hub closes the
    /// connection, or a read times out with data already in hand. A timeout
    /// with zero bytes received is a hard `NoResponse`.
    async fn receive(&self, stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; RECV_CHUNK];

        loop {
            match timeout(self.read_timeout, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if codec::frame_complete(&buf) {
                        break;
                    }
                }
                Ok(Err(e)) => return Err(Error::Unreachable(format!("receive failed: {e}"))),
                Err(_) if buf.is_empty() => return Err(Error::NoResponse),
                Err(_) => {
                    // Some firmware never sends a terminator; treat what we
                    // have as the full reply.
                    debug!(bytes = buf.len(), "read timed out with partial data, taking buffer as reply");
                    break;
                }
            }
        }

        if buf.is_empty() {
            return Err(Error::NoResponse);
        }
        Ok(buf)
    }
}
