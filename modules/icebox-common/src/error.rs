use std::time::Duration;

use pollinations_client::PollinationsError;
use supabase_client::SupabaseError;
use thiserror::Error;

/// Failure of any accounting procedure call.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Network(String),

    #[error("Backend error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected backend response: {0}")]
    Schema(String),

    #[error("Backend returned no rows for {0}")]
    EmptyResponse(String),
}

impl From<SupabaseError> for BackendError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Network(msg) => BackendError::Network(msg),
            SupabaseError::Api { status, message } => BackendError::Api { status, message },
            SupabaseError::Parse(msg) => BackendError::Schema(msg),
            SupabaseError::EmptyResponse(procedure) => BackendError::EmptyResponse(procedure),
        }
    }
}

/// Failure of the image provider call. No accounting happens after one of these.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider returned status {status}")]
    Status { status: u16, message: String },

    #[error("Provider did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Provider unreachable: {0}")]
    Network(String),
}

impl From<PollinationsError> for ProviderError {
    fn from(err: PollinationsError) -> Self {
        match err {
            PollinationsError::Api { status, message } => ProviderError::Status { status, message },
            PollinationsError::Timeout(after) => ProviderError::Timeout(after),
            PollinationsError::Network(msg) | PollinationsError::BaseUrl(msg) => {
                ProviderError::Network(msg)
            }
        }
    }
}

/// Every way a generation transition can end without a delivered image.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("No account registered for this chat")]
    IdentityNotFound,

    #[error("Quota denied: {reason}")]
    QuotaDenied { reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Size payload that could not be parsed. Callers recover with the default size.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Malformed size selection: {0:?}")]
    Malformed(String),
}
