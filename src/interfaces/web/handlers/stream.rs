use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use std::convert::Infallible;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use super::super::AppState;
use crate::core::error::DocpackError;
use crate::core::job::RelayEvent;
use crate::core::relay::encode;

/// `GET /api/docpack/stream/{job_id}`: relays one job's status as SSE frames.
///
/// The relay task writes into a bounded channel that this response drains.
/// When the client goes away the response stream and its receiver are
/// dropped, and the relay stops before its next upstream request.
pub async fn stream_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, DocpackError> {
    let relay = state.relay.ok_or_else(|| {
        DocpackError::Configuration("RunPod credentials not configured".to_string())
    })?;

    info!("Opening docpack stream for job {}", job_id);
    let (rx, _handle) = relay.spawn(job_id);
    let stream = ReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &RelayEvent) -> Event {
    let frame = encode(event);
    Event::default().event(frame.event).data(frame.data)
}
