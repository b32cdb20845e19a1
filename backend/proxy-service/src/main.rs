use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proxy_service::config::Config;
use proxy_service::cors::{CorsHeaders, CorsPolicy};
use proxy_service::handlers::{self, ProxyState};
use proxy_service::providers::{GeminiClient, GooglePlacesClient, PlacesProvider, TextGenerator};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,proxy_service=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(config.log_json);

    tracing::info!("Starting proxy-service v{}", env!("CARGO_PKG_VERSION"));

    let timeout = Duration::from_secs(config.upstream_timeout_secs);

    let places: Option<Arc<dyn PlacesProvider>> = match config.google_places_api_key.clone() {
        Some(key) if !key.is_empty() => Some(Arc::new(
            GooglePlacesClient::new(key, timeout).context("failed to build places client")?,
        )),
        _ => {
            tracing::warn!("GOOGLE_PLACES_API_KEY not set; places proxy will answer 500");
            None
        }
    };

    let facts: Option<Arc<dyn TextGenerator>> = match config.gemini_api_key.clone() {
        Some(key) if !key.is_empty() => Some(Arc::new(
            GeminiClient::new(key, config.gemini_model.clone(), timeout)
                .context("failed to build gemini client")?,
        )),
        _ => {
            tracing::warn!("GEMINI_API_KEY not set; facts proxy will answer 500");
            None
        }
    };

    let state = web::Data::new(ProxyState { places, facts });
    let cors_policy = Arc::new(CorsPolicy::new(&config.allowed_origin_prod));

    let bind_address = format!("{}:{}", config.proxy_service_host, config.proxy_service_port);
    tracing::info!("Starting HTTP server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(CorsHeaders::new(cors_policy.clone()))
            .wrap(Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server error")?;

    Ok(())
}
