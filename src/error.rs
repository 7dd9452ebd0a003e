use std::time::Duration;

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    /// The lobby directory or the geo database could not answer. Fatal to a
    /// whole collection run.
    #[error("Upstream lobby directory failed: {0}")]
    Upstream(eyre::Report),
    #[error("Snapshot storage failed: {0}")]
    Storage(eyre::Report),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Rejected before any storage access.
    #[error("Invalid request: {0}")]
    Configuration(String),
    #[error("Deadline of {} exceeded", humantime::format_duration(*.0))]
    DeadlineExceeded(Duration),
    /// Another run is still writing the epoch with this timestamp.
    #[error("Epoch {0} is already being written")]
    EpochInProgress(i64),
}

impl TrackerError {
    pub fn upstream(err: impl Into<eyre::Report>) -> Self {
        Self::Upstream(err.into())
    }

    pub fn storage(err: impl Into<eyre::Report>) -> Self {
        Self::Storage(err.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<clickhouse::error::Error> for TrackerError {
    fn from(err: clickhouse::error::Error) -> Self {
        Self::Storage(err.into())
    }
}
