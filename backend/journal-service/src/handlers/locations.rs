/// Location and place handlers
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{CreateLocationRequest, CreatePlaceRequest, PlaceListQuery};
use crate::services::locations::{location_from_place_details, Upserted};
use crate::services::LocationService;

#[derive(Debug, Deserialize)]
pub struct LocationFromPlaceRequest {
    /// Body of a places "details" lookup
    pub details: Value,
    pub photo_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpsertResponse<T: Serialize> {
    #[serde(flatten)]
    item: T,
    created: bool,
}

fn upserted<T: Serialize>(result: Upserted<T>) -> HttpResponse {
    let created = result.was_created();
    let body = UpsertResponse {
        item: result.into_inner(),
        created,
    };
    if created {
        HttpResponse::Created().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

/// POST /api/v1/locations
pub async fn create_location(
    service: web::Data<LocationService>,
    req: web::Json<CreateLocationRequest>,
) -> Result<HttpResponse> {
    let result = service.create_location(req.into_inner()).await?;
    Ok(upserted(result))
}

/// POST /api/v1/locations/from-place
///
/// Files a location from the city and country of a selected place.
pub async fn create_location_from_place(
    service: web::Data<LocationService>,
    req: web::Json<LocationFromPlaceRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let resolved = location_from_place_details(&req.details).ok_or_else(|| {
        AppError::ValidationError("place details have no city and country".to_string())
    })?;

    let result = service
        .create_location(CreateLocationRequest {
            city: resolved.city,
            country: resolved.country,
            photo_url: req.photo_url,
        })
        .await?;
    Ok(upserted(result))
}

/// GET /api/v1/locations
pub async fn list_locations(service: web::Data<LocationService>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(service.list_locations().await?))
}

/// POST /api/v1/places
pub async fn create_place(
    service: web::Data<LocationService>,
    req: web::Json<CreatePlaceRequest>,
) -> Result<HttpResponse> {
    let result = service.create_place(req.into_inner()).await?;
    Ok(upserted(result))
}

/// GET /api/v1/places?location_id=
pub async fn list_places(
    service: web::Data<LocationService>,
    query: web::Query<PlaceListQuery>,
) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(service.list_places(query.location_id).await?))
}
