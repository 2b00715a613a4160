use reqwest::StatusCode;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// The authentication challenge or token response was malformed.
    #[error("registry authentication protocol error: {0}")]
    Protocol(String),

    #[error("registry returned status {status} for {url}")]
    UnexpectedStatus { status: StatusCode, url: String },

    #[error("no Docker-Content-Digest header in response from {url}")]
    MissingDigest { url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to {action}: {source}")]
    Orchestrator {
        action: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid label selector: {0}")]
    InvalidSelector(String),
}

impl Error {
    pub fn orchestrator(action: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Orchestrator {
            action: action.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
