use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network link is down")]
    NotConnected,
    #[error("invalid sync url `{0}`")]
    InvalidUrl(String),
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("transport i/o failed: {0}")]
    Io(String),
    #[error("malformed http response: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse runtime config: {0}")]
    Parse(#[from] serde_json::Error),
}
