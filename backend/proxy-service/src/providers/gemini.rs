//! Gemini generative language API integration
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{ProxyError, Result};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Sent as the system instruction so answers come back as a bullet list
pub const BULLET_INSTRUCTION: &str =
    "Answer with exactly three lines. Start every line with \"- \" and write one short fact per line.";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Raw text of the first candidate; empty when the model returned none
    async fn generate_text(&self, prompt: String) -> Result<String>;
}

// ============================================
// Request types
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl<'a> Content<'a> {
    fn text(text: &'a str) -> Self {
        Self {
            parts: vec![Part { text }],
        }
    }
}

// ============================================
// Response types
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CandidatePart {
    text: String,
}

impl GenerateContentResponse {
    fn first_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default()
    }
}

/// Gemini API client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Facts(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, prompt: String) -> Result<String> {
        info!(model = %self.model, prompt_len = prompt.len(), "generating text with Gemini");

        let request = GenerateContentRequest {
            contents: vec![Content::text(&prompt)],
            system_instruction: Content::text(BULLET_INSTRUCTION),
        };
        let url = format!("{}/{}:generateContent", GEMINI_API_URL, self.model);
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| ProxyError::Facts(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_text, "Gemini API request failed");
            return Err(ProxyError::Facts(format!("HTTP {}", status)));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProxyError::Facts(format!("invalid response: {}", e)))?;

        let text = body.first_text();
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            raw = %text,
            "Gemini response received"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = GenerateContentRequest {
            contents: vec![Content::text("Give me 3 facts")],
            system_instruction: Content::text(BULLET_INSTRUCTION),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "Give me 3 facts");
        assert_eq!(
            value["systemInstruction"]["parts"][0]["text"],
            BULLET_INSTRUCTION
        );
    }

    #[test]
    fn test_first_text_of_response() {
        let body: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "- one\n- two"}], "role": "model"}}
            ]
        }))
        .unwrap();
        assert_eq!(body.first_text(), "- one\n- two");

        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.first_text(), "");
    }
}
