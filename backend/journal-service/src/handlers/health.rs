/// Health endpoints
use actix_web::{web, HttpResponse};
use chrono::Utc;
use sqlx::PgPool;
use std::time::Instant;

pub struct HealthState {
    db_pool: PgPool,
}

impl HealthState {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn check_postgres(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.db_pool)
            .await
            .map(|_| ())
    }
}

/// GET /api/v1/health
pub async fn health_summary(state: web::Data<HealthState>) -> HttpResponse {
    match state.check_postgres().await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "journal-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
        Err(e) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "error": format!("PostgreSQL connection failed: {}", e),
            "service": "journal-service"
        })),
    }
}

/// GET /api/v1/health/ready
pub async fn readiness(state: web::Data<HealthState>) -> HttpResponse {
    let start = Instant::now();
    let result = state.check_postgres().await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let body = serde_json::json!({
        "ready": result.is_ok(),
        "checks": {
            "postgres": {
                "status": if result.is_ok() { "healthy" } else { "unhealthy" },
                "latency_ms": latency_ms,
            }
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    match result {
        Ok(_) => HttpResponse::Ok().json(body),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            HttpResponse::ServiceUnavailable().json(body)
        }
    }
}

/// GET /api/v1/health/live
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"alive": true}))
}
