//! Google Places API integration
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{ProxyError, Result};

const PLACES_API_URL: &str = "https://maps.googleapis.com/maps/api/place";
const DETAILS_FIELDS: &str = "name,photos,geometry,address_components";

/// Autocomplete restricts to cities unless the caller asks otherwise
pub const DEFAULT_AUTOCOMPLETE_TYPES: &str = "(cities)";
pub const DEFAULT_PHOTO_MAX_WIDTH: u32 = 400;

/// Raw photo bytes with the content type reported upstream
#[derive(Debug, Clone)]
pub struct PlacePhoto {
    pub content_type: String,
    pub body: Bytes,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlacesProvider: Send + Sync {
    /// Predictions for a partial place name, returned as sent by the API
    async fn autocomplete(&self, input: String, types: String) -> Result<Value>;

    /// Details for a place id, returned as sent by the API
    async fn details(&self, place_id: String) -> Result<Value>;

    /// Direct photo URL; carries the API key
    fn photo_url(&self, photo_reference: &str, max_width: u32) -> String;

    async fn fetch_photo(&self, photo_reference: String, max_width: u32) -> Result<PlacePhoto>;
}

/// Google Places API client
pub struct GooglePlacesClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GooglePlacesClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Places(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: PLACES_API_URL.to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{}/json", self.base_url, path);
        let start = std::time::Instant::now();

        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ProxyError::Places(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_text, endpoint = path, "Places API request failed");
            return Err(ProxyError::Places(format!("HTTP {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::Places(format!("invalid JSON: {}", e)))?;

        // API-level failures arrive as 200 with a status field and are passed through.
        debug!(
            endpoint = path,
            api_status = ?body.get("status").and_then(|s| s.as_str()),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Places API response"
        );
        Ok(body)
    }
}

#[async_trait]
impl PlacesProvider for GooglePlacesClient {
    async fn autocomplete(&self, input: String, types: String) -> Result<Value> {
        info!(input_len = input.len(), %types, "places autocomplete");
        self.get_json(
            "autocomplete",
            &[("input", input.as_str()), ("types", types.as_str())],
        )
        .await
    }

    async fn details(&self, place_id: String) -> Result<Value> {
        info!(%place_id, "places details");
        self.get_json(
            "details",
            &[("place_id", place_id.as_str()), ("fields", DETAILS_FIELDS)],
        )
        .await
    }

    fn photo_url(&self, photo_reference: &str, max_width: u32) -> String {
        format!(
            "{}/photo?maxwidth={}&photoreference={}&key={}",
            self.base_url,
            max_width,
            urlencoding::encode(photo_reference),
            urlencoding::encode(&self.api_key)
        )
    }

    async fn fetch_photo(&self, photo_reference: String, max_width: u32) -> Result<PlacePhoto> {
        let url = self.photo_url(&photo_reference, max_width);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProxyError::Places(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "Places photo request failed");
            return Err(ProxyError::Places(format!("HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::Places(e.to_string()))?;

        Ok(PlacePhoto { content_type, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_url_encodes_reference() {
        let client =
            GooglePlacesClient::new("secret-key".to_string(), Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.photo_url("Aap_uE/a+b", 400),
            "https://maps.googleapis.com/maps/api/place/photo?maxwidth=400&photoreference=Aap_uE%2Fa%2Bb&key=secret-key"
        );
    }
}
