use thiserror::Error;

/// Error surfaced by an upstream data-provider call. Never crosses a factor
/// computer boundary directly — computers catch these and return partial rows.
#[derive(Error, Debug, Clone)]
pub enum UpstreamError {
    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("rate limited")]
    RateLimited,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("no data for requested symbol/date")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no api key available for this provider")]
    NoKeyAvailable,

    #[error("call deadline exceeded")]
    Deadline,
}

/// Error surfaced at the core's public boundary (recommendation engine, factor
/// store, scheduler). Deliberately coarser than `UpstreamError` — callers at
/// this layer react to a handful of cases, not provider internals.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("service unavailable")]
    Unavailable,

    #[error("busy: a computation is already running")]
    Busy,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<UpstreamError> for CoreError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotFound => CoreError::NotFound,
            UpstreamError::InvalidArgument(msg) => CoreError::InvalidArgument(msg),
            UpstreamError::Transient(msg) => CoreError::Internal(msg),
            UpstreamError::RateLimited | UpstreamError::Unavailable(_) | UpstreamError::NoKeyAvailable => {
                CoreError::Unavailable
            }
            UpstreamError::Deadline => CoreError::Internal("deadline exceeded".to_string()),
        }
    }
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;
pub type CoreResult<T> = Result<T, CoreError>;
