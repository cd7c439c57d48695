//! Client for the external lyrics-generation endpoint.
//!
//! Sends the user's topic to `POST {host}/api/generate` and extracts the
//! generated text from the `{ output: { text } }` response shape. One retry
//! on transport failure, nothing fancier.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GenerationConfig;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("lyrics request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("lyrics service returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed lyrics response: {0}")]
    Response(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    user_input: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    output: Option<GenerateOutput>,
}

#[derive(Deserialize)]
struct GenerateOutput {
    text: Option<String>,
}

pub struct LyricsClient {
    config: GenerationConfig,
    client: Client,
}

impl LyricsClient {
    pub fn new(config: GenerationConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { config, client }
    }

    /// Request raw lyrics for a topic. Retries once on transport failure.
    pub async fn generate(&self, topic: &str) -> Result<String, GenerateError> {
        let url = format!("{}/api/generate", self.config.host);
        debug!("Requesting lyrics from {url}");

        let request = GenerateRequest { user_input: topic };

        let resp = match self.client.post(&url).json(&request).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Lyrics request failed ({e}), retrying once");
                self.client.post(&url).json(&request).send().await?
            }
        };

        if !resp.status().is_success() {
            return Err(GenerateError::Status(resp.status()));
        }

        let body = resp.text().await?;
        extract_text(&body)
    }
}

/// Pull `output.text` out of a generation response body.
fn extract_text(body: &str) -> Result<String, GenerateError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| GenerateError::Response(format!("invalid JSON: {e}")))?;

    let text = parsed
        .output
        .and_then(|o| o.text)
        .ok_or_else(|| GenerateError::Response("missing output.text".into()))?;

    let text = text.trim();
    if text.is_empty() {
        return Err(GenerateError::Response("empty output.text".into()));
    }

    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_generated_text() {
        let body = r#"{"output":{"text":"Verse 1:\nI came to win tonight"}}"#;
        assert_eq!(
            extract_text(body).unwrap(),
            "Verse 1:\nI came to win tonight"
        );
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let body = r#"{"output":{"text":"\n  spit fire all night  \n"}}"#;
        assert_eq!(extract_text(body).unwrap(), "spit fire all night");
    }

    #[test]
    fn missing_output_is_a_response_error() {
        let err = extract_text(r#"{"something":"else"}"#).unwrap_err();
        assert!(matches!(err, GenerateError::Response(_)));
    }

    #[test]
    fn missing_text_is_a_response_error() {
        let err = extract_text(r#"{"output":{}}"#).unwrap_err();
        assert!(matches!(err, GenerateError::Response(_)));
    }

    #[test]
    fn empty_text_is_a_response_error() {
        let err = extract_text(r#"{"output":{"text":"   "}}"#).unwrap_err();
        assert!(matches!(err, GenerateError::Response(_)));
    }

    #[test]
    fn invalid_json_is_a_response_error() {
        let err = extract_text("not json at all").unwrap_err();
        assert!(matches!(err, GenerateError::Response(_)));
    }
}
