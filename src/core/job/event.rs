use crate::core::error::DocpackError;

/// Where a status update came from. Queue notices and item-level progress
/// travel as different frame types on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOrigin {
    Queue,
    Item,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub origin: StatusOrigin,
    pub state: String,
    pub progress: Option<f64>,
    pub message: Option<String>,
}

impl StatusUpdate {
    pub fn queued() -> Self {
        Self {
            origin: StatusOrigin::Queue,
            state: "queued".to_string(),
            progress: None,
            message: Some("Job is waiting in queue...".to_string()),
        }
    }
}

/// Terminal failure as it appears in an `error` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: String,
    pub detail: String,
}

impl From<&DocpackError> for Failure {
    fn from(err: &DocpackError) -> Self {
        Self {
            reason: err.reason(),
            detail: err.detail(),
        }
    }
}

/// One event produced by a poll cycle, in the order it was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Status(StatusUpdate),
    Log(String),
    DataChunk(String),
    Complete,
    Error(Failure),
}

impl RelayEvent {
    pub fn failure(err: &DocpackError) -> Self {
        RelayEvent::Error(Failure::from(err))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayEvent::Complete | RelayEvent::Error(_))
    }
}
