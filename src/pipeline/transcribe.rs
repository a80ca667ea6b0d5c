//! Transcription service boundary: one media payload in, plain text out.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, media: &[u8], mime: &str) -> Result<String>;
}

/// HTTP transcription client: posts raw media bytes, expects `{"text": ...}`.
pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl HttpTranscriber {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, media: &[u8], mime: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", mime)
            .body(media.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!(
                "service returned {}: {}",
                status, body
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("unparseable response: {}", e)))?;

        info!("transcribed {} bytes of media", media.len());
        Ok(parsed.text)
    }
}
