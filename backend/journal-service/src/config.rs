/// Configuration management for journal-service
///
/// Loads configuration from environment variables with sensible defaults.
/// A `.env` file is honoured by the binary before this runs.
use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub cors: CorsConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub uploads: UploadConfig,
    pub facts: FactsConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
    pub log_json: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

/// Which object storage implementation backs uploads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Memory,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// S3-compatible endpoint (Supabase storage, MinIO, ...)
    pub endpoint: Option<String>,
    /// Base used to build public object URLs, e.g.
    /// `https://<project>.supabase.co/storage/v1/object/public`
    pub public_base_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret the identity provider signs access tokens with
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
}

/// How storage keys are derived for uploaded files
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStrategy {
    /// Keep safe names, generate otherwise, then check storage for collisions
    UniqueName,
    /// Name every object after the SHA-256 of its bytes
    ContentHash,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UploadConfig {
    pub key_strategy: KeyStrategy,
    pub key_check_attempts: u32,
    pub key_check_delay_ms: u64,
    pub max_file_bytes: usize,
    pub max_files_per_post: usize,
}

impl UploadConfig {
    pub fn key_check_delay(&self) -> Duration {
        Duration::from_millis(self.key_check_delay_ms)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            key_strategy: KeyStrategy::UniqueName,
            key_check_attempts: 5,
            key_check_delay_ms: 200,
            max_file_bytes: 20 * 1024 * 1024,
            max_files_per_post: 20,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FactsConfig {
    /// Full URL of the useless-facts proxy endpoint
    pub proxy_url: String,
    /// Bearer token forwarded to the proxy (the BaaS anon key)
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let storage_backend = match env_or("STORAGE_BACKEND", "s3").to_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "s3" => StorageBackend::S3,
            other => return Err(format!("Unknown STORAGE_BACKEND: {}", other).into()),
        };

        let key_strategy = match env_or("UPLOAD_KEY_STRATEGY", "unique-name").to_lowercase().as_str() {
            "unique-name" => KeyStrategy::UniqueName,
            "content-hash" => KeyStrategy::ContentHash,
            other => return Err(format!("Unknown UPLOAD_KEY_STRATEGY: {}", other).into()),
        };

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| "JWT_SECRET must be set to validate access tokens")?;

        let upload_defaults = UploadConfig::default();

        Ok(Config {
            app: AppConfig {
                host: env_or("JOURNAL_SERVICE_HOST", "0.0.0.0"),
                port: env_parse("JOURNAL_SERVICE_PORT", 8084),
                env: env_or("APP_ENV", "development"),
                log_json: env_parse("LOG_JSON", false),
            },
            cors: CorsConfig {
                allowed_origins: parse_list(&env_or(
                    "CORS_ALLOWED_ORIGINS",
                    "http://localhost:4200,http://localhost:8100",
                )),
            },
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", "postgresql://localhost/nattie"),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
                run_migrations: env_parse("DATABASE_RUN_MIGRATIONS", true),
            },
            storage: StorageConfig {
                backend: storage_backend,
                bucket: env_or("STORAGE_BUCKET", "microblog-media"),
                region: env_or("AWS_REGION", "us-east-1"),
                access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                public_base_url: env_or(
                    "STORAGE_PUBLIC_BASE_URL",
                    "http://localhost:54321/storage/v1/object/public",
                ),
            },
            auth: AuthConfig {
                jwt_secret,
                jwt_audience: std::env::var("JWT_AUDIENCE").ok(),
            },
            uploads: UploadConfig {
                key_strategy,
                key_check_attempts: env_parse("UPLOAD_KEY_CHECK_ATTEMPTS", upload_defaults.key_check_attempts),
                key_check_delay_ms: env_parse("UPLOAD_KEY_CHECK_DELAY_MS", upload_defaults.key_check_delay_ms),
                max_file_bytes: env_parse("UPLOAD_MAX_FILE_BYTES", upload_defaults.max_file_bytes),
                max_files_per_post: env_parse(
                    "UPLOAD_MAX_FILES_PER_POST",
                    upload_defaults.max_files_per_post,
                ),
            },
            facts: FactsConfig {
                proxy_url: env_or(
                    "FACTS_PROXY_URL",
                    "http://localhost:8085/generate-useless-facts",
                ),
                api_key: std::env::var("FACTS_PROXY_API_KEY").ok(),
                timeout_secs: env_parse("FACTS_PROXY_TIMEOUT_SECS", 30),
            },
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
