//! Error types for the analysis engine.
//!
//! Two classes share one enum: `Business` covers expected insufficiency
//! conditions (no data, too few points, no overlap) that the orchestrator
//! turns into structured error envelopes, while the remaining variants wrap
//! infrastructure failures from the data source, the dataframe layer and the
//! narrative capability.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Business(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("dataframe error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("narrative request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("narrative payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("narrative capability misconfigured: {0}")]
    Credential(String),

    #[error("narrative reply malformed: {0}")]
    MalformedReply(String),

    #[error("correlation computation failed: {0}")]
    Stats(String),
}

impl Error {
    /// Expected, non-exceptional outcomes returned to the caller as data.
    pub fn is_business(&self) -> bool {
        matches!(self, Error::Business(_))
    }

    /// Data-source unavailability; demoted to a business-style envelope
    /// instead of crashing the request.
    pub fn is_data_source(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Connection(_) | Error::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
