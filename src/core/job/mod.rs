pub mod event;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use event::{Failure, RelayEvent, StatusOrigin, StatusUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Maps a status label reported by upstream onto a non-terminal state.
    /// Terminal states are only ever reached through `Complete` or `Error` events.
    pub fn from_reported(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "queued" | "in_queue" => JobStatus::Queued,
            _ => JobStatus::Processing,
        }
    }
}

/// Where the finished docpack artifact lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultLocator {
    pub s3_key: Option<String>,
    pub docpack_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub branch: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, rename = "jsonlData")]
    pub data_chunks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docpack_url: Option<String>,
}

impl JobRecord {
    pub fn new(
        id: impl Into<String>,
        repo_owner: impl Into<String>,
        repo_name: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            repo_owner: repo_owner.into(),
            repo_name: repo_name.into(),
            branch: branch.into(),
            status: JobStatus::Queued,
            progress: 0.0,
            created_at: Utc::now(),
            completed_at: None,
            logs: Vec::new(),
            data_chunks: Vec::new(),
            error_message: None,
            s3_key: None,
            docpack_url: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_for_repo(&self, owner: &str, repo: &str) -> bool {
        self.repo_owner == owner && self.repo_name == repo
    }

    /// Folds one relay event into the record. Returns `false` and leaves the
    /// record untouched once a terminal status has been reached.
    pub fn apply(&mut self, event: &RelayEvent, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        match event {
            RelayEvent::Status(update) => {
                self.status = JobStatus::from_reported(&update.state);
                if let Some(progress) = update.progress {
                    // Progress only moves forward; late or replayed updates are ignored.
                    self.progress = self.progress.max(progress.clamp(0.0, 100.0));
                }
            }
            RelayEvent::Log(line) => self.logs.push(line.clone()),
            RelayEvent::DataChunk(chunk) => self.data_chunks.push(chunk.clone()),
            RelayEvent::Complete => {
                self.status = JobStatus::Completed;
                self.progress = 100.0;
                self.completed_at = Some(now);
            }
            RelayEvent::Error(failure) => {
                self.status = JobStatus::Failed;
                self.error_message = Some(failure.reason.clone());
                self.completed_at = Some(now);
            }
        }
        true
    }

    /// Result locators are only meaningful for completed jobs.
    pub fn attach_result(&mut self, locator: ResultLocator) -> bool {
        if self.status != JobStatus::Completed {
            return false;
        }
        if locator.s3_key.is_some() {
            self.s3_key = locator.s3_key;
        }
        if locator.docpack_url.is_some() {
            self.docpack_url = locator.docpack_url;
        }
        true
    }
}
