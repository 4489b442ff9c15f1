use reqwest::StatusCode;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use super::StreamClient;
use crate::core::error::DocpackError;
use crate::core::job::RelayEvent;
use crate::core::relay::FrameDecoder;

impl StreamClient {
    /// Reads the server's SSE stream for `job_id` and forwards each decoded
    /// event to `tx`. Returns after the terminal event, or early once `tx`
    /// is closed.
    pub async fn follow(
        &self,
        job_id: &str,
        tx: mpsc::Sender<RelayEvent>,
    ) -> Result<(), DocpackError> {
        let mut req = self
            .client
            .get(self.stream_url(job_id))
            .header("Accept", "text/event-stream");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        let res = req
            .send()
            .await
            .map_err(|e| DocpackError::UpstreamUnreachable(e.to_string()))?;

        match res.status() {
            StatusCode::UNAUTHORIZED => return Err(DocpackError::Unauthorized),
            StatusCode::INTERNAL_SERVER_ERROR => {
                return Err(DocpackError::Configuration(
                    "the server has no RunPod credentials".to_string(),
                ));
            }
            status if !status.is_success() => {
                return Err(DocpackError::UpstreamUnreachable(format!(
                    "Stream request failed: {}",
                    status.as_u16()
                )));
            }
            _ => {}
        }

        let stream = res.bytes_stream();
        let mut reader =
            tokio_util::io::StreamReader::new(stream.map(|r| r.map_err(std::io::Error::other)));
        let mut buf_reader = tokio::io::BufReader::new(&mut reader);
        let mut decoder = FrameDecoder::new();
        let mut line_buf = String::new();

        loop {
            line_buf.clear();
            let read = buf_reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| DocpackError::UpstreamUnreachable(e.to_string()))?;
            if read == 0 {
                break; // EOF
            }
            let event = match decoder.push_line(&line_buf) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping malformed frame: {}", e);
                    continue;
                }
            };
            debug!("Received {} frame", crate::core::relay::encode(&event).event);
            let terminal = event.is_terminal();
            if tx.send(event).await.is_err() || terminal {
                return Ok(());
            }
        }

        Err(DocpackError::UpstreamUnreachable(
            "Stream closed before the job finished".to_string(),
        ))
    }
}
