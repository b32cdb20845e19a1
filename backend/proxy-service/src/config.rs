//! Configuration for proxy-service
use serde::Deserialize;

/// Main configuration struct, loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Google Places API key; the places proxy answers 500 without it
    #[serde(default)]
    pub google_places_api_key: Option<String>,

    /// Gemini API key; the facts proxy answers 500 without it
    #[serde(default)]
    pub gemini_api_key: Option<String>,

    /// Gemini model used for fact generation
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Production web origin; also the fallback CORS origin
    #[serde(default = "default_allowed_origin_prod")]
    pub allowed_origin_prod: String,

    #[serde(default = "default_host")]
    pub proxy_service_host: String,

    #[serde(default = "default_port")]
    pub proxy_service_port: u16,

    /// Timeout for upstream API calls in seconds
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,

    #[serde(default)]
    pub log_json: bool,
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_allowed_origin_prod() -> String {
    "https://nattie.us".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8085
}

fn default_upstream_timeout() -> u64 {
    15
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env::<Config>()
    }
}
