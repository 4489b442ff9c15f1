//! Client for a running docpack server's stream endpoint.

mod stream;

use reqwest::Client;

pub struct StreamClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl StreamClient {
    /// `api_base` is the server origin, e.g. `http://127.0.0.1:17990`.
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn stream_url(&self, job_id: &str) -> String {
        format!(
            "{}/api/docpack/stream/{}",
            self.api_base,
            urlencoding::encode(job_id)
        )
    }
}
