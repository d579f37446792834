use thiserror::Error;

/// Failure of a single fetch cycle.
///
/// Every variant ends up as a `FETCH_ERROR` response; none of them is fatal
/// to the daemon.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("HTTP error {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("iCloud protocol error: {0}")]
    Protocol(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
