use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use journal_service::config::Config;
use journal_service::db::{CatalogStore, PgStore, PostStore};
use journal_service::handlers::{self, HealthState};
use journal_service::middleware::{JwtAuthMiddleware, SessionVerifier};
use journal_service::services::media;
use journal_service::services::storage;
use journal_service::services::upload::TracingProgress;
use journal_service::services::{FactsClient, FactsGenerator, LocationService, PostService};

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,journal_service=debug,sqlx=warn".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Journal Service
///
/// # Routes
///
/// - `/api/v1/posts/*` - Create, edit, delete and read posts
/// - `/api/v1/locations/*`, `/api/v1/places` - Location catalogue
/// - `/api/v1/facts` - Generated trivia for drafts
/// - `/api/v1/health*` - Health checks (unauthenticated)
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {}", e))?;
    init_tracing(config.app.log_json);

    tracing::info!("Starting journal-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("failed to connect to PostgreSQL")?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("failed to run database migrations")?;
        tracing::info!("database migrations applied");
    }

    let object_storage = storage::from_config(&config.storage)
        .await
        .context("failed to initialize object storage")?;

    let store = PgStore::new(db_pool.clone());
    let post_store: Arc<dyn PostStore> = Arc::new(store.clone());
    let catalog: Arc<dyn CatalogStore> = Arc::new(store);

    let post_service = web::Data::new(PostService::new(
        post_store,
        catalog.clone(),
        object_storage,
        config.uploads.clone(),
        media::default_transcoder(),
        Arc::new(TracingProgress),
    ));
    let location_service = web::Data::new(LocationService::new(catalog));
    let facts: Arc<dyn FactsGenerator> =
        Arc::new(FactsClient::new(&config.facts).context("failed to build facts client")?);
    let facts = web::Data::new(facts);
    let health_state = web::Data::new(HealthState::new(db_pool));
    let verifier = Arc::new(SessionVerifier::new(&config.auth));

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Starting HTTP server on {}", bind_address);

    let allowed_origins = config.cors.allowed_origins.clone();

    HttpServer::new(move || {
        let mut cors = Cors::default();
        for origin in &allowed_origins {
            if origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors.allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .app_data(post_service.clone())
            .app_data(location_service.clone())
            .app_data(facts.clone())
            .app_data(health_state.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .route("/api/v1/health", web::get().to(handlers::health_summary))
            .route("/api/v1/health/ready", web::get().to(handlers::readiness))
            .route("/api/v1/health/live", web::get().to(handlers::liveness))
            .service(
                web::scope("/api/v1")
                    .wrap(JwtAuthMiddleware::new(verifier.clone()))
                    .configure(handlers::configure),
            )
    })
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server error")?;

    Ok(())
}
