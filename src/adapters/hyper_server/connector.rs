use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::{Result, TunnelError};

/// Dials the raw TCP side of a tunnel
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    pub const TIMEOUT_DURATION: Duration = Duration::from_secs(10);

    pub fn new() -> Self {
        Self::with_timeout(Self::TIMEOUT_DURATION)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Connects to `target` (`host:port`), resolving the host name if needed.
    pub async fn connect(&self, target: &str) -> Result<TcpStream> {
        let dial_failed = |reason: String| TunnelError::DialFailed {
            target: target.to_string(),
            reason,
        };

        match timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Unable to disable Nagle on connection to {}: {}", target, e);
                }
                Ok(stream)
            }
            Ok(Err(e)) => Err(dial_failed(e.to_string())),
            Err(_) => Err(dial_failed(format!("timed out after {:?}", self.timeout))),
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}
