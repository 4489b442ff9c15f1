use anyhow::{Result, anyhow};
use console::style;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::WatchArgs;
use crate::core::config::DocpackConfig;
use crate::core::error::DocpackError;
use crate::core::job::{JobRecord, JobStatus, RelayEvent};
use crate::core::relay::{RelaySettings, RunpodClient, SINK_CAPACITY, StreamRelay, encode};
use crate::core::store::{CreateOutcome, JobStore, StoreChange};
use crate::core::terminal::{self, print_error, print_info, print_success, print_warn};
use crate::interfaces::cli::StreamClient;

/// Turns successive snapshots of one record into printable lines, showing
/// only what changed since the previous snapshot.
#[derive(Debug)]
pub(crate) struct RecordView {
    job_id: String,
    last: Option<JobRecord>,
}

impl RecordView {
    pub(crate) fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            last: None,
        }
    }

    pub(crate) fn render(&mut self, record: &JobRecord) -> Vec<String> {
        if record.id != self.job_id {
            return Vec::new();
        }
        let mut lines = Vec::new();
        let (seen_logs, seen_chunks, last_status, last_progress) = match &self.last {
            Some(prev) => (prev.logs.len(), prev.data_chunks.len(), Some(prev.status), prev.progress),
            None => (0, 0, None, -1.0),
        };

        let moved = last_status != Some(record.status) || record.progress > last_progress;
        if moved && !record.is_terminal() {
            lines.push(format!(
                "[{:>3.0}%] {}",
                record.progress,
                record.status.as_str()
            ));
        }
        for line in record.logs.iter().skip(seen_logs) {
            lines.push(format!("  | {}", line));
        }
        let new_chunks = record.data_chunks.len().saturating_sub(seen_chunks);
        if new_chunks > 0 {
            lines.push(format!(
                "  + {} data chunk(s), {} total",
                new_chunks,
                record.data_chunks.len()
            ));
        }

        self.last = Some(record.clone());
        lines
    }
}

/// Prints record changes for one job until it turns terminal or the store goes away.
fn spawn_view(
    mut changes: broadcast::Receiver<StoreChange>,
    job_id: String,
    initial: Option<JobRecord>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut view = RecordView::new(&job_id);
        if let Some(record) = initial {
            view.render(&record);
        }
        loop {
            match changes.recv().await {
                Ok(StoreChange::Created(record)) | Ok(StoreChange::Updated(record)) => {
                    for line in view.render(&record) {
                        println!("{}", line);
                    }
                    if record.id == job_id && record.is_terminal() {
                        break;
                    }
                }
                Ok(StoreChange::Removed(id)) if id == job_id => break,
                Ok(StoreChange::Cleared) => break,
                Ok(StoreChange::Removed(_)) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Job view skipped {} change(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Writes one SSE frame and flushes so piped readers see it immediately.
fn write_frame(out: &mut impl Write, event: &RelayEvent) -> std::io::Result<()> {
    write!(out, "{}", encode(event).to_wire())?;
    out.flush()
}

/// Starts the event producer: the in-process relay with `--direct`, otherwise
/// the server stream.
fn spawn_source(
    config: &DocpackConfig,
    args: &WatchArgs,
) -> Result<(mpsc::Receiver<RelayEvent>, JoinHandle<Result<(), DocpackError>>)> {
    if args.direct {
        let credentials = config.upstream_credentials()?;
        let relay = StreamRelay::new(
            Arc::new(RunpodClient::new(credentials)),
            RelaySettings::from(&config.polling),
        );
        let (rx, handle) = relay.spawn(args.job_id.clone());
        let handle = tokio::spawn(async move {
            let outcome = handle.await.map_err(|e| {
                DocpackError::UpstreamUnreachable(format!("relay task failed: {}", e))
            })?;
            debug!("Relay finished: {:?}", outcome);
            Ok(())
        });
        return Ok((rx, handle));
    }

    let api_url = args
        .api_url
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}", config.server.host, config.server.port));
    info!("Streaming job {} from {}", args.job_id, api_url);
    let client = StreamClient::new(api_url, args.token.clone());
    let (tx, rx) = mpsc::channel(SINK_CAPACITY);
    let job_id = args.job_id.clone();
    let handle = tokio::spawn(async move { client.follow(&job_id, tx).await });
    Ok((rx, handle))
}

pub async fn run_watch(config: &DocpackConfig, store: JobStore, args: WatchArgs) -> Result<()> {
    let record = JobRecord::new(&args.job_id, &args.owner, &args.repo, &args.branch);
    let initial = match store.create(record).await? {
        CreateOutcome::Created(_) => {
            print_info(&format!(
                "Tracking job {} for {}/{} ({})",
                args.job_id, args.owner, args.repo, args.branch
            ));
            None
        }
        CreateOutcome::Existing(existing)
            if existing.id != args.job_id || !existing.is_for_repo(&args.owner, &args.repo) =>
        {
            print_warn(&format!(
                "Job {} already tracks {}/{} ({}). Remove it first with 'docpack jobs remove {}'.",
                existing.id,
                existing.repo_owner,
                existing.repo_name,
                existing.status.as_str(),
                existing.id
            ));
            return Ok(());
        }
        CreateOutcome::Existing(existing) if existing.is_terminal() => {
            print_summary(&existing);
            return Ok(());
        }
        CreateOutcome::Existing(existing) => {
            print_info(&format!("Resuming job {}", existing.id));
            Some(existing)
        }
    };

    let view = if args.frames {
        None
    } else {
        Some(spawn_view(store.subscribe(), args.job_id.clone(), initial))
    };
    let (mut rx, producer) = spawn_source(config, &args)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                if args.frames {
                    write_frame(&mut std::io::stdout(), &event)?;
                }
                store.fold(&args.job_id, &event).await?;
            }
            _ = &mut ctrl_c => {
                interrupted = true;
                break;
            }
        }
    }
    // Dropping the receiver cancels an in-process relay before its next poll.
    drop(rx);

    let produced = if interrupted {
        producer.abort();
        Ok(())
    } else {
        producer
            .await
            .map_err(|e| anyhow!("stream task failed: {}", e))?
    };

    let final_record = store.get(&args.job_id).await;
    drop(store);
    if let Some(view) = view {
        let _ = view.await;
    }

    if interrupted {
        print_warn("Stopped watching; run the same command again to resume.");
        return Ok(());
    }
    if let Err(e) = produced {
        warn!("Stream ended early: {}", e);
        print_error(&format!("{}: {}", e.reason(), e.detail()));
    }
    if let Some(record) = final_record {
        print_summary(&record);
    }
    Ok(())
}

fn print_summary(record: &JobRecord) {
    match record.status {
        JobStatus::Completed => {
            print_success(&format!(
                "Docpack for {}/{} completed with {} data chunk(s)",
                record.repo_owner,
                record.repo_name,
                record.data_chunks.len()
            ));
            if let Some(url) = &record.docpack_url {
                terminal::print_link("Docpack", url);
            }
        }
        JobStatus::Failed => print_error(&format!(
            "Docpack for {}/{} failed: {}",
            record.repo_owner,
            record.repo_name,
            record.error_message.as_deref().unwrap_or("unknown error")
        )),
        status => print_info(&format!(
            "Job {} is still {} ({}%)",
            record.id,
            style(status.as_str()).bold(),
            record.progress
        )),
    }
}
