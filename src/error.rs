use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("query to {0} timed out")]
    Timeout(SocketAddr),

    #[error("server answered with response code {0}")]
    ErrorResponse(u16),

    #[error("no server could be queried ({} candidates failed)", .0.len())]
    NoServersReached(Vec<DnsError>),

    #[error("resolution loop detected: {question} was already sent to {server}")]
    LoopDetected {
        server: SocketAddr,
        question: String,
    },

    #[error("maximum number of iterative resolution steps reached")]
    MaxStepsReached,

    #[error("invalid DNS name: {0}")]
    InvalidName(String),

    #[error("truncated DNS message")]
    TruncatedMessage,

    #[error("neither an authoritative answer nor usable glue below zone {0}")]
    NotAuthoritativeNorGlue(String),

    #[error("DNSSEC validation failed: {0}")]
    ValidationFailed(String),
}

impl DnsError {
    /// Fatal errors abort the whole resolution instead of moving on to the
    /// next candidate server.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DnsError::LoopDetected { .. }
                | DnsError::MaxStepsReached
                | DnsError::ValidationFailed(_)
        )
    }
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DnsError>;
