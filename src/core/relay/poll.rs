use crate::core::error::DocpackError;
use crate::core::job::{RelayEvent, StatusOrigin, StatusUpdate};

use super::upstream::{JobStatusSource, OutputItem, StatusResponse, UpstreamReply, UpstreamStatus};

/// Events produced by one status request and whether the job has finished.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub events: Vec<RelayEvent>,
    pub done: bool,
}

impl PollOutcome {
    fn pending(events: Vec<RelayEvent>) -> Self {
        Self {
            events,
            done: false,
        }
    }

    fn finished(events: Vec<RelayEvent>) -> Self {
        Self { events, done: true }
    }

    fn failed(err: DocpackError) -> Self {
        Self::finished(vec![RelayEvent::failure(&err)])
    }
}

/// Issues one status request and classifies the reply.
///
/// Only transport-level failures surface as `Err` (always `UpstreamUnreachable`);
/// every classified outcome, including upstream-reported failures, comes back
/// as events.
pub async fn poll_once(
    source: &dyn JobStatusSource,
    job_id: &str,
) -> Result<PollOutcome, DocpackError> {
    let reply = source.fetch_status(job_id).await?;
    Ok(classify(&reply))
}

pub fn classify(reply: &UpstreamReply) -> PollOutcome {
    let response = match reply {
        UpstreamReply::NotFound => return PollOutcome::failed(DocpackError::JobNotFound),
        UpstreamReply::Found(response) => response,
    };

    match response.status() {
        UpstreamStatus::InQueue => {
            PollOutcome::pending(vec![RelayEvent::Status(StatusUpdate::queued())])
        }
        UpstreamStatus::InProgress => PollOutcome::pending(item_events(&response.stream_items())),
        UpstreamStatus::Completed => classify_completed(response),
        UpstreamStatus::Failed => {
            let message = response
                .error_text()
                .unwrap_or_else(|| "Job failed without error message".to_string());
            PollOutcome::failed(DocpackError::JobFailed(message))
        }
        UpstreamStatus::Cancelled => PollOutcome::failed(DocpackError::JobCancelled),
        UpstreamStatus::TimedOut => PollOutcome::failed(DocpackError::JobTimedOut),
        // Unknown or missing status: nothing to report yet, keep polling.
        UpstreamStatus::Other(_) => PollOutcome::pending(Vec::new()),
    }
}

fn classify_completed(response: &StatusResponse) -> PollOutcome {
    let items = response.output_items();
    if items.is_empty() {
        return PollOutcome::failed(DocpackError::EmptyResult);
    }
    let mut events = item_events(&items);
    events.push(RelayEvent::Complete);
    PollOutcome::finished(events)
}

/// Per item, in array order: status, then log line, then data chunk.
fn item_events(items: &[OutputItem]) -> Vec<RelayEvent> {
    let mut events = Vec::new();
    for item in items {
        if item.status.is_some() || item.progress.is_some() {
            events.push(RelayEvent::Status(StatusUpdate {
                origin: StatusOrigin::Item,
                state: item
                    .status
                    .clone()
                    .unwrap_or_else(|| "processing".to_string()),
                progress: item.progress,
                message: item.message.clone(),
            }));
        }
        if let Some(message) = &item.message {
            events.push(RelayEvent::Log(message.clone()));
        }
        if let Some(chunk) = &item.data_chunk {
            events.push(RelayEvent::DataChunk(chunk.clone()));
        }
    }
    events
}
