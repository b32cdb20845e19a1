/// HTTP handlers for proxy-service
pub mod facts;
pub mod places;

use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::providers::{PlacesProvider, TextGenerator};

pub use facts::generate_useless_facts;
pub use places::{places_proxy_get, places_proxy_post};

/// Upstream clients; `None` when the matching API key is not configured
pub struct ProxyState {
    pub places: Option<Arc<dyn PlacesProvider>>,
    pub facts: Option<Arc<dyn TextGenerator>>,
}

async fn liveness_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"alive": true}))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/places-proxy")
            .route(web::post().to(places_proxy_post))
            .route(web::get().to(places_proxy_get)),
    )
    .route(
        "/generate-useless-facts",
        web::post().to(generate_useless_facts),
    )
    .route("/health/live", web::get().to(liveness_check));
}
