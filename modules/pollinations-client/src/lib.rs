pub mod error;

pub use error::{PollinationsError, Result};

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://gen.pollinations.ai";

/// Raw image returned by the provider plus the wall time it took to fetch.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub elapsed: Duration,
}

pub struct PollinationsClient {
    client: reqwest::Client,
    base_url: Url,
    model: String,
    key: Option<String>,
    timeout: Duration,
}

impl PollinationsClient {
    pub fn new(base_url: &str, model: &str, key: Option<&str>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| PollinationsError::BaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PollinationsError::BaseUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PollinationsError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            model: model.to_string(),
            key: key.filter(|k| !k.is_empty()).map(String::from),
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build `{base}/image/{prompt}?model=..&width=..&height=..&seed=..[&key=..]`.
    /// The prompt is a single percent-encoded path segment.
    pub fn image_url(&self, prompt: &str, width: u32, height: u32, seed: u64) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("image").push(prompt);
        }

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("model", &self.model)
                .append_pair("width", &width.to_string())
                .append_pair("height", &height.to_string())
                .append_pair("seed", &seed.to_string());
            if let Some(ref key) = self.key {
                query.append_pair("key", key);
            }
        }

        url
    }

    /// Single GET against the image endpoint. No retries: anything other than
    /// `200 OK` is returned as `PollinationsError::Api`.
    pub async fn generate(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
        seed: u64,
    ) -> Result<GeneratedImage> {
        let url = self.image_url(prompt, width, height, seed);
        debug!(model = %self.model, width, height, seed, "Pollinations image request");

        let started = Instant::now();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let message = resp.text().await.unwrap_or_default();
            return Err(PollinationsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = resp.bytes().await.map_err(|e| self.classify(e))?.to_vec();

        Ok(GeneratedImage {
            bytes,
            elapsed: started.elapsed(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> PollinationsError {
        if err.is_timeout() {
            PollinationsError::Timeout(self.timeout)
        } else {
            PollinationsError::Network(err.to_string())
        }
    }
}
