//! Client for the useless-facts proxy
//!
//! Facts are generated on demand when a user drafts a post; the returned list
//! is stored verbatim on the post if the user keeps it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::FactsConfig;
use crate::error::{AppError, Result};

/// Prompt sent to the language model for a location and optional place
pub fn build_prompt(location: &str, place: Option<&str>) -> String {
    let place = place
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!(", specifically about the place {}", p))
        .unwrap_or_default();

    format!(
        "Give me 3, useless concise facts about the location {}{}.",
        location.trim(),
        place
    )
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FactsGenerator: Send + Sync {
    async fn generate(&self, location: String, place: Option<String>) -> Result<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct FactsRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct FactsResponse {
    #[serde(default)]
    facts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProxyErrorBody {
    error: String,
}

pub struct FactsClient {
    client: Client,
    proxy_url: String,
    api_key: Option<String>,
}

impl FactsClient {
    pub fn new(config: &FactsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            proxy_url: config.proxy_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl FactsGenerator for FactsClient {
    async fn generate(&self, location: String, place: Option<String>) -> Result<Vec<String>> {
        if location.trim().is_empty() {
            return Err(AppError::ValidationError("location is required".to_string()));
        }
        let prompt = build_prompt(&location, place.as_deref());

        let mut request = self
            .client
            .post(&self.proxy_url)
            .json(&FactsRequest { prompt: &prompt });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "facts proxy unreachable");
            AppError::Upstream(format!("facts proxy unreachable: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ProxyErrorBody>()
                .await
                .map(|b| b.error)
                .unwrap_or_else(|_| status.to_string());
            tracing::warn!(%status, %detail, "facts proxy returned an error");
            return Err(AppError::Upstream(detail));
        }

        let body: FactsResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid facts response: {}", e)))?;

        tracing::info!(%location, facts = body.facts.len(), "generated facts");
        Ok(body.facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt() {
        assert_eq!(
            build_prompt("Kyoto", None),
            "Give me 3, useless concise facts about the location Kyoto."
        );
        assert_eq!(
            build_prompt("Kyoto", Some("Fushimi Inari")),
            "Give me 3, useless concise facts about the location Kyoto, specifically about the place Fushimi Inari."
        );
        assert_eq!(
            build_prompt(" Kyoto ", Some("  ")),
            "Give me 3, useless concise facts about the location Kyoto."
        );
    }

    #[test]
    fn test_response_tolerates_missing_facts() {
        let body: FactsResponse = serde_json::from_str("{}").unwrap();
        assert!(body.facts.is_empty());
    }

    #[tokio::test]
    async fn test_blank_location_is_rejected_locally() {
        let client = FactsClient::new(&FactsConfig {
            // unroutable: the request must never be sent
            proxy_url: "http://127.0.0.1:9/generate-useless-facts".into(),
            api_key: None,
            timeout_secs: 1,
        })
        .unwrap();

        let err = client.generate("  ".into(), None).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
