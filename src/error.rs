use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("GitHub authentication failed: {0}")]
    Auth(String),

    #[error("Invalid GitHub API request {url}: {reason}")]
    Request { url: String, reason: String },

    #[error("API call timed out on the following query: {url}")]
    Timeout { url: String },

    #[error("Failed to load schema descriptor {descriptor}: {reason}")]
    Schema { descriptor: String, reason: String },

    #[error("Invalid query: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot {operation} while connector is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn request(url: &str, reason: impl Into<String>) -> Self {
        Error::Request {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors the host should answer by asking for credentials again.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// The URL that triggered the failure, when there is one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::Request { url, .. } | Error::Timeout { url } => Some(url),
            _ => None,
        }
    }
}
