//! Durable job record store.
//!
//! Holds every known [`JobRecord`] in insertion order, serialises all writes
//! through one lock and writes the whole mapping through to a
//! [`RecordSubstrate`] before the in-memory state changes. Views learn about
//! mutations through [`JobStore::subscribe`].

pub mod bus;
pub mod substrate;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

use crate::core::error::DocpackError;
use crate::core::job::{JobRecord, RelayEvent, ResultLocator};

pub use bus::{ChangeBus, StoreChange};
pub use substrate::{FileSubstrate, MemorySubstrate, RecordSubstrate};

/// Well-known substrate key for the whole mapping.
pub const STORE_KEY: &str = "docpacks";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    docpacks: Vec<JobRecord>,
}

impl Snapshot {
    fn position(&self, job_id: &str) -> Option<usize> {
        self.docpacks.iter().position(|r| r.id == job_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(JobRecord),
    /// A record with the same id or for the same repository already exists;
    /// nothing was written.
    Existing(JobRecord),
}

impl CreateOutcome {
    pub fn record(&self) -> &JobRecord {
        match self {
            CreateOutcome::Created(r) | CreateOutcome::Existing(r) => r,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FoldOutcome {
    Applied(JobRecord),
    /// The record is already terminal.
    Ignored,
    Missing,
}

pub struct JobStore {
    state: Mutex<Snapshot>,
    substrate: Arc<dyn RecordSubstrate>,
    bus: ChangeBus,
}

impl JobStore {
    /// Loads the mapping from `substrate`. A missing key starts empty; an
    /// unparseable value is logged and replaced by an empty store.
    pub async fn open(substrate: Arc<dyn RecordSubstrate>) -> Result<Self, DocpackError> {
        let snapshot = match substrate.read(STORE_KEY).await? {
            None => Snapshot::default(),
            Some(raw) => match serde_json::from_str::<Snapshot>(&raw) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    let err = DocpackError::StorageCorrupt(e.to_string());
                    warn!("{}; starting with an empty job store", err);
                    Snapshot::default()
                }
            },
        };
        debug!("Job store opened with {} record(s)", snapshot.docpacks.len());
        Ok(Self {
            state: Mutex::new(snapshot),
            substrate,
            bus: ChangeBus::new(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.bus.subscribe()
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), DocpackError> {
        let raw = serde_json::to_string(snapshot)?;
        self.substrate.write(STORE_KEY, &raw).await
    }

    pub async fn create(&self, record: JobRecord) -> Result<CreateOutcome, DocpackError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.docpacks.iter().find(|r| {
            r.id == record.id || r.is_for_repo(&record.repo_owner, &record.repo_name)
        }) {
            debug!(
                "Job {} ({}/{}) already covers job {} for {}/{}",
                existing.id,
                existing.repo_owner,
                existing.repo_name,
                record.id,
                record.repo_owner,
                record.repo_name
            );
            return Ok(CreateOutcome::Existing(existing.clone()));
        }

        let mut next = state.clone();
        next.docpacks.push(record.clone());
        self.persist(&next).await?;
        *state = next;
        drop(state);

        self.bus.publish(StoreChange::Created(record.clone()));
        Ok(CreateOutcome::Created(record))
    }

    pub async fn fold(&self, job_id: &str, event: &RelayEvent) -> Result<FoldOutcome, DocpackError> {
        let mut state = self.state.lock().await;
        let Some(idx) = state.position(job_id) else {
            return Ok(FoldOutcome::Missing);
        };

        let mut record = state.docpacks[idx].clone();
        if !record.apply(event, Utc::now()) {
            return Ok(FoldOutcome::Ignored);
        }
        self.commit(&mut state, idx, record).await.map(FoldOutcome::Applied)
    }

    /// Records where the finished artifact lives. Returns `Ok(None)` when the
    /// job is unknown or not completed.
    pub async fn attach_result(
        &self,
        job_id: &str,
        locator: ResultLocator,
    ) -> Result<Option<JobRecord>, DocpackError> {
        let mut state = self.state.lock().await;
        let Some(idx) = state.position(job_id) else {
            return Ok(None);
        };

        let mut record = state.docpacks[idx].clone();
        if !record.attach_result(locator) {
            return Ok(None);
        }
        self.commit(&mut state, idx, record).await.map(Some)
    }

    async fn commit(
        &self,
        state: &mut Snapshot,
        idx: usize,
        record: JobRecord,
    ) -> Result<JobRecord, DocpackError> {
        let mut next = state.clone();
        next.docpacks[idx] = record.clone();
        self.persist(&next).await?;
        *state = next;
        self.bus.publish(StoreChange::Updated(record.clone()));
        Ok(record)
    }

    pub async fn get(&self, job_id: &str) -> Option<JobRecord> {
        let state = self.state.lock().await;
        state.docpacks.iter().find(|r| r.id == job_id).cloned()
    }

    pub async fn get_by_repo(&self, owner: &str, repo: &str) -> Option<JobRecord> {
        let state = self.state.lock().await;
        state
            .docpacks
            .iter()
            .find(|r| r.is_for_repo(owner, repo))
            .cloned()
    }

    pub async fn has_repo(&self, owner: &str, repo: &str) -> bool {
        self.get_by_repo(owner, repo).await.is_some()
    }

    pub async fn list(&self) -> Vec<JobRecord> {
        self.state.lock().await.docpacks.clone()
    }

    /// Returns `Ok(false)` when there was nothing to remove.
    pub async fn remove(&self, job_id: &str) -> Result<bool, DocpackError> {
        let mut state = self.state.lock().await;
        let Some(idx) = state.position(job_id) else {
            return Ok(false);
        };

        let mut next = state.clone();
        next.docpacks.remove(idx);
        self.persist(&next).await?;
        *state = next;
        drop(state);

        self.bus.publish(StoreChange::Removed(job_id.to_string()));
        Ok(true)
    }

    pub async fn clear(&self) -> Result<(), DocpackError> {
        let mut state = self.state.lock().await;
        let next = Snapshot::default();
        self.persist(&next).await?;
        *state = next;
        drop(state);

        self.bus.publish(StoreChange::Cleared);
        Ok(())
    }
}
