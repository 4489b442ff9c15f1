use thiserror::Error;

/// Every failure the relay, the store, or the server can report.
///
/// Upstream classification failures (`JobNotFound`, `EmptyResult`, `JobFailed`,
/// `JobCancelled`, `JobTimedOut`, `PollingTimeout`, `UpstreamUnreachable`) are
/// never returned to a stream consumer as an `Err`; they become the single
/// terminal `error` frame via [`DocpackError::reason`] and [`DocpackError::detail`].
#[derive(Debug, Error)]
pub enum DocpackError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Server configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    UpstreamUnreachable(String),

    #[error("Job not found")]
    JobNotFound,

    #[error("No output generated")]
    EmptyResult,

    #[error("{0}")]
    JobFailed(String),

    #[error("Job was cancelled")]
    JobCancelled,

    #[error("Job timed out")]
    JobTimedOut,

    #[error("Polling timeout")]
    PollingTimeout,

    #[error("stored job state is unreadable: {0}")]
    StorageCorrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DocpackError {
    /// Short reason carried in the `error` field of a terminal frame.
    pub fn reason(&self) -> String {
        match self {
            DocpackError::UpstreamUnreachable(_) => "Failed to fetch job status".to_string(),
            other => other.to_string(),
        }
    }

    /// Human-readable explanation carried in the `message` field of a terminal frame.
    pub fn detail(&self) -> String {
        match self {
            DocpackError::Unauthorized => "Please log in with GitHub".to_string(),
            DocpackError::Configuration(what) => what.clone(),
            DocpackError::UpstreamUnreachable(cause) => cause.clone(),
            DocpackError::JobNotFound => {
                "The requested job does not exist or has expired".to_string()
            }
            DocpackError::EmptyResult => {
                "Job completed but produced no output. Check RunPod logs for details.".to_string()
            }
            DocpackError::JobFailed(_) => "Docpack generation failed".to_string(),
            DocpackError::JobCancelled => "Docpack generation was cancelled".to_string(),
            DocpackError::JobTimedOut => "Docpack generation timed out".to_string(),
            DocpackError::PollingTimeout => {
                "Job status polling timed out after 10 minutes".to_string()
            }
            DocpackError::StorageCorrupt(cause) => cause.clone(),
            DocpackError::Io(e) => e.to_string(),
            DocpackError::Json(e) => e.to_string(),
        }
    }
}
