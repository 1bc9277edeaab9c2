use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PollinationsError>;

#[derive(Debug, Error)]
pub enum PollinationsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid base URL: {0}")]
    BaseUrl(String),
}
