use std::fmt;

/// How a transport-level failure to reach the upstream API is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Timeout,
    Network,
    Unknown,
}

impl TransportKind {
    /// HTTP status the proxy should answer the agent with.
    pub fn suggested_status(self) -> u16 {
        match self {
            Self::Timeout => 504,
            Self::Network => 502,
            Self::Unknown => 500,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "network"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Shared error type used across all driftguard crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("upstream returned HTTP {status}")]
    Upstream { status: u16, body: String },

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("memory: {0}")]
    Memory(String),

    #[error("drift judge: {0}")]
    Judge(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transport {
            kind: TransportKind::Timeout,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Transport {
            kind: TransportKind::Network,
            message: message.into(),
        }
    }

    /// HTTP status to surface to the agent when this error ends a request.
    pub fn suggested_status(&self) -> u16 {
        match self {
            Self::Transport { kind, .. } => kind.suggested_status(),
            Self::Upstream { status, .. } => *status,
            Self::Protocol(_) => 502,
            Self::Json(_) => 400,
            _ => 500,
        }
    }

    /// The `error.type` string used in agent-facing error bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Transport {
                kind: TransportKind::Timeout,
                ..
            } => "timeout_error",
            Self::Transport { .. } => "api_connection_error",
            Self::Protocol(_) => "api_error",
            Self::Json(_) => "invalid_request_error",
            Self::Auth(_) => "authentication_error",
            _ => "api_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
