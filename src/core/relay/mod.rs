//! Stream relay: turns a pull-only job status API into an ordered push stream.
//!
//! A relay owns one polling loop per job. Each iteration runs a poll cycle,
//! forwards the resulting events into a bounded channel, and stops on the first
//! terminal outcome, on the poll cap, or as soon as the receiving side is gone.

pub mod encoder;
pub mod poll;
pub mod upstream;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::core::config::PollingConfig;
use crate::core::error::DocpackError;
use crate::core::job::RelayEvent;

pub use encoder::{FrameDecoder, encode};
use poll::poll_once;
pub use upstream::{JobStatusSource, RunpodClient};

/// Capacity of the channel between a relay and its consumer.
pub const SINK_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: 600,
        }
    }
}

impl From<&PollingConfig> for RelaySettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            poll_interval: config.interval(),
            max_polls: config.max_polls.max(1),
        }
    }
}

/// How a relay run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    Failed(String),
    /// The consumer dropped its receiver before a terminal event was delivered.
    Cancelled,
}

#[derive(Clone)]
pub struct StreamRelay {
    source: Arc<dyn JobStatusSource>,
    settings: RelaySettings,
}

impl StreamRelay {
    pub fn new(source: Arc<dyn JobStatusSource>, settings: RelaySettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> RelaySettings {
        self.settings
    }

    /// Starts a relay task for `job_id` and hands back the receiving end of its sink.
    /// Dropping the receiver cancels the task.
    pub fn spawn(
        &self,
        job_id: impl Into<String>,
    ) -> (mpsc::Receiver<RelayEvent>, JoinHandle<RelayOutcome>) {
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);
        let relay = self.clone();
        let job_id = job_id.into();
        let handle = tokio::spawn(async move { relay.run(&job_id, tx).await });
        (rx, handle)
    }

    /// Drives poll cycles until a terminal outcome, the poll cap, or sink closure.
    /// The sink is dropped on every exit path, which closes the consumer's stream.
    pub async fn run(&self, job_id: &str, sink: mpsc::Sender<RelayEvent>) -> RelayOutcome {
        let span = info_span!("relay", job_id = %job_id);
        self.drive(job_id, sink).instrument(span).await
    }

    async fn drive(&self, job_id: &str, sink: mpsc::Sender<RelayEvent>) -> RelayOutcome {
        info!(
            max_polls = self.settings.max_polls,
            "Relay started (interval {:?})", self.settings.poll_interval
        );
        let mut poll_count: u32 = 0;

        loop {
            if sink.is_closed() {
                info!(poll_count, "Consumer disconnected, stopping relay");
                return RelayOutcome::Cancelled;
            }

            let outcome = match poll_once(self.source.as_ref(), job_id).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!("Error polling RunPod: {}", err);
                    let event = RelayEvent::failure(&err);
                    return finish(&sink, vec![event]).await;
                }
            };
            debug!(
                poll_count,
                events = outcome.events.len(),
                done = outcome.done,
                "Poll cycle finished"
            );

            if outcome.done {
                return finish(&sink, outcome.events).await;
            }
            for event in outcome.events {
                if sink.send(event).await.is_err() {
                    info!(poll_count, "Consumer disconnected, stopping relay");
                    return RelayOutcome::Cancelled;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = sink.closed() => {
                    info!(poll_count, "Consumer disconnected while waiting, stopping relay");
                    return RelayOutcome::Cancelled;
                }
            }

            poll_count += 1;
            if poll_count >= self.settings.max_polls {
                warn!(poll_count, "Polling cap reached before a terminal status");
                let event = RelayEvent::failure(&DocpackError::PollingTimeout);
                return finish(&sink, vec![event]).await;
            }
        }
    }
}

/// Pushes the final batch of a run; its last event decides the outcome.
async fn finish(sink: &mpsc::Sender<RelayEvent>, events: Vec<RelayEvent>) -> RelayOutcome {
    let mut outcome = RelayOutcome::Cancelled;
    for event in events {
        let next = match &event {
            RelayEvent::Complete => Some(RelayOutcome::Completed),
            RelayEvent::Error(failure) => Some(RelayOutcome::Failed(failure.reason.clone())),
            _ => None,
        };
        if sink.send(event).await.is_err() {
            info!("Consumer disconnected before the terminal event");
            return RelayOutcome::Cancelled;
        }
        if let Some(next) = next {
            outcome = next;
        }
    }
    match &outcome {
        RelayOutcome::Completed => info!("Job completed"),
        RelayOutcome::Failed(reason) => warn!("Job ended with error: {}", reason),
        RelayOutcome::Cancelled => {}
    }
    outcome
}
