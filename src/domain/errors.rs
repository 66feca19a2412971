use hyper::StatusCode;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    MissingPort,
    InvalidPort,
    PortNotAllowed(i64),
    HijackFailed(String),
    DialFailed { target: String, reason: String },
    InvalidConfig(String),
}

impl TunnelError {
    /// Status code written back to the client when the request is rejected before the hijack.
    pub fn status(&self) -> StatusCode {
        match self {
            TunnelError::MissingPort | TunnelError::InvalidPort => StatusCode::BAD_REQUEST,
            TunnelError::PortNotAllowed(_) => StatusCode::FORBIDDEN,
            TunnelError::HijackFailed(_) | TunnelError::DialFailed { .. } => StatusCode::BAD_GATEWAY,
            TunnelError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // CONNECT targets always carry a port, see RFC 2817 section 5.2
            TunnelError::MissingPort => write!(f, "No port field in Request-URI / Host header"),
            TunnelError::InvalidPort => write!(f, "Invalid port"),
            TunnelError::PortNotAllowed(_) => write!(f, "Port not allowed"),
            TunnelError::HijackFailed(msg) => write!(f, "Unable to hijack connection: {}", msg),
            TunnelError::DialFailed { target, reason } => write!(f, "Unable to dial {}: {}", target, reason),
            TunnelError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for TunnelError {}

pub type Result<T> = std::result::Result<T, TunnelError>;
