/// HTTP handlers for journal-service
///
/// This module contains handlers for:
/// - Posts: create, edit, delete and read posts with attached media
/// - Locations and places: the shared catalogue posts are filed under
/// - Media: single file uploads for inline editor images
/// - Facts: generated trivia for a post draft
pub mod facts;
pub mod health;
pub mod locations;
pub mod media;
pub mod posts;

use actix_web::web;

pub use facts::generate_facts;
pub use health::{health_summary, liveness, readiness, HealthState};
pub use locations::{
    create_location, create_location_from_place, create_place, list_locations, list_places,
};
pub use media::upload_media;
pub use posts::{create_post, delete_post, get_post, list_posts, update_post};

/// Authenticated API routes, mounted under `/api/v1`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/posts")
            .service(
                web::resource("")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(get_post))
                    .route(web::put().to(update_post))
                    .route(web::delete().to(delete_post)),
            ),
    )
    .service(
        web::scope("/locations")
            .service(
                web::resource("")
                    .route(web::get().to(list_locations))
                    .route(web::post().to(create_location)),
            )
            .route("/from-place", web::post().to(create_location_from_place)),
    )
    .service(
        web::resource("/places")
            .route(web::get().to(list_places))
            .route(web::post().to(create_place)),
    )
    .route("/media", web::post().to(upload_media))
    .route("/facts", web::post().to(generate_facts));
}
