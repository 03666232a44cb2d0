use serde::ser::Serializer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("tracker not found: {0}")]
    TrackerNotFound(u64),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Failure of a single remote fetch. Every variant is surfaced on the
/// tracker as an error string and never clears previously fetched data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("bad status: {0}")]
    BadStatus(u16),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(value: reqwest::Error) -> Self {
        match value.status() {
            Some(status) => Self::BadStatus(status.as_u16()),
            None if value.is_decode() => Self::MalformedPayload(value.to_string()),
            None => Self::NetworkFailure(value.to_string()),
        }
    }
}

impl From<simd_json::Error> for FetchError {
    fn from(value: simd_json::Error) -> Self {
        Self::MalformedPayload(value.to_string())
    }
}
