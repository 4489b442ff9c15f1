use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::config::UpstreamCredentials;
use crate::core::error::DocpackError;

/// Top-level job status reported by the serverless provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    Other(String),
}

impl UpstreamStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "IN_QUEUE" => UpstreamStatus::InQueue,
            "IN_PROGRESS" => UpstreamStatus::InProgress,
            "COMPLETED" => UpstreamStatus::Completed,
            "FAILED" => UpstreamStatus::Failed,
            "CANCELLED" => UpstreamStatus::Cancelled,
            "TIMED_OUT" => UpstreamStatus::TimedOut,
            other => UpstreamStatus::Other(other.to_string()),
        }
    }
}

/// Body of a status query. Everything but the collections' items is kept as
/// raw JSON because upstream does not guarantee field types.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub stream: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl StatusResponse {
    /// A missing or non-string status reads as `Other` and keeps the job pending.
    pub fn status(&self) -> UpstreamStatus {
        match &self.status {
            Some(Value::String(s)) => UpstreamStatus::parse(s),
            Some(other) => UpstreamStatus::Other(other.to_string()),
            None => UpstreamStatus::Other(String::new()),
        }
    }

    /// Upstream failure text; non-string errors are rendered as JSON text.
    pub fn error_text(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn stream_items(&self) -> Vec<OutputItem> {
        items_of(self.stream.as_ref())
    }

    pub fn output_items(&self) -> Vec<OutputItem> {
        items_of(self.output.as_ref())
    }
}

fn items_of(collection: Option<&Value>) -> Vec<OutputItem> {
    match collection {
        Some(Value::Array(items)) => items.iter().filter_map(OutputItem::from_value).collect(),
        _ => Vec::new(),
    }
}

/// One entry of the incremental `stream` or final `output` collection.
/// Empty strings and nulls count as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputItem {
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub data_chunk: Option<String>,
}

impl OutputItem {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let data_chunk = match obj.get("data_chunk") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        Some(Self {
            status: text("status"),
            progress: obj.get("progress").and_then(Value::as_f64),
            message: text("message"),
            data_chunk,
        })
    }
}

#[derive(Debug, Clone)]
pub enum UpstreamReply {
    Found(StatusResponse),
    NotFound,
}

/// Seam between the poll cycle and the provider's status API.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<UpstreamReply, DocpackError>;
}

pub struct RunpodClient {
    client: Client,
    credentials: UpstreamCredentials,
}

impl RunpodClient {
    pub fn new(credentials: UpstreamCredentials) -> Self {
        Self::with_client(Client::new(), credentials)
    }

    pub fn with_client(client: Client, credentials: UpstreamCredentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    fn stream_url(&self, job_id: &str) -> String {
        format!(
            "{}/v2/{}/stream/{}",
            self.credentials.base_url,
            urlencoding::encode(&self.credentials.endpoint_id),
            urlencoding::encode(job_id)
        )
    }
}

#[async_trait]
impl JobStatusSource for RunpodClient {
    async fn fetch_status(&self, job_id: &str) -> Result<UpstreamReply, DocpackError> {
        let res = self
            .client
            .get(self.stream_url(job_id))
            .header(
                "Authorization",
                format!("Bearer {}", self.credentials.api_key),
            )
            .send()
            .await
            .map_err(|e| DocpackError::UpstreamUnreachable(e.to_string()))?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(UpstreamReply::NotFound);
        }
        if !status.is_success() {
            return Err(DocpackError::UpstreamUnreachable(format!(
                "RunPod API error: {}",
                status.as_u16()
            )));
        }

        let body: StatusResponse = res
            .json()
            .await
            .map_err(|e| DocpackError::UpstreamUnreachable(format!("Invalid status payload: {}", e)))?;
        debug!(
            status = body.status.as_ref().and_then(|v| v.as_str()).unwrap_or("<missing>"),
            output_items = body.output_items().len(),
            "RunPod status received"
        );
        Ok(UpstreamReply::Found(body))
    }
}
