/// Location and place catalogue
///
/// Posts are filed under a (city, country) location and optionally a place
/// within it. Both are shared between users and deduplicated by name,
/// ignoring case.
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::CatalogStore;
use crate::error::{AppError, Result};
use crate::models::{CreateLocationRequest, CreatePlaceRequest, Location, Place};

/// Whether a create call inserted a row or returned an existing one
#[derive(Debug, Clone, PartialEq)]
pub enum Upserted<T> {
    Created(T),
    Existing(T),
}

impl<T> Upserted<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, Upserted::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Upserted::Created(v) | Upserted::Existing(v) => v,
        }
    }
}

/// City and country read from a places "details" payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub city: String,
    pub country: String,
}

/// Pull `locality` and `country` out of `address_components`.
///
/// Accepts either the full details response (`{"result": {...}}`) or the
/// `result` object itself.
pub fn location_from_place_details(details: &Value) -> Option<ResolvedLocation> {
    let result = details.get("result").unwrap_or(details);
    let components = result.get("address_components")?.as_array()?;

    let component = |kind: &str| {
        components.iter().find_map(|c| {
            let has_type = c
                .get("types")?
                .as_array()?
                .iter()
                .any(|t| t.as_str() == Some(kind));
            if has_type {
                c.get("long_name")?.as_str().map(str::to_string)
            } else {
                None
            }
        })
    };

    Some(ResolvedLocation {
        city: component("locality")?,
        country: component("country")?,
    })
}

fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

pub struct LocationService {
    catalog: Arc<dyn CatalogStore>,
}

impl LocationService {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    pub async fn create_location(&self, req: CreateLocationRequest) -> Result<Upserted<Location>> {
        let city = required(&req.city, "city")?;
        let country = required(&req.country, "country")?;

        if let Some(existing) = self
            .catalog
            .find_location(city.clone(), country.clone())
            .await?
        {
            return Ok(Upserted::Existing(existing));
        }

        match self
            .catalog
            .insert_location(city.clone(), country.clone(), req.photo_url)
            .await?
        {
            Some(location) => {
                tracing::info!(location_id = %location.id, %city, %country, "location created");
                Ok(Upserted::Created(location))
            }
            // Lost an insert race against the unique index
            None => self
                .catalog
                .find_location(city, country)
                .await?
                .map(Upserted::Existing)
                .ok_or_else(|| AppError::Internal("location vanished after conflict".into())),
        }
    }

    pub async fn list_locations(&self) -> Result<Vec<Location>> {
        self.catalog.list_locations().await
    }

    pub async fn create_place(&self, req: CreatePlaceRequest) -> Result<Upserted<Place>> {
        let location_id = req.location_id.ok_or_else(|| {
            AppError::ValidationError(
                "A location must be selected before creating a place".to_string(),
            )
        })?;
        let place_name = required(&req.place_name, "place_name")?;

        if self.catalog.get_location(location_id).await?.is_none() {
            return Err(AppError::NotFound("Location not found".to_string()));
        }

        if let Some(existing) = self
            .catalog
            .find_place(location_id, place_name.clone())
            .await?
        {
            return Ok(Upserted::Existing(existing));
        }

        match self
            .catalog
            .insert_place(location_id, place_name.clone(), req.photo_url)
            .await?
        {
            Some(place) => {
                tracing::info!(place_id = %place.id, %location_id, %place_name, "place created");
                Ok(Upserted::Created(place))
            }
            None => self
                .catalog
                .find_place(location_id, place_name)
                .await?
                .map(Upserted::Existing)
                .ok_or_else(|| AppError::Internal("place vanished after conflict".into())),
        }
    }

    pub async fn list_places(&self, location_id: Option<Uuid>) -> Result<Vec<Place>> {
        self.catalog.list_places(location_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockCatalogStore;
    use chrono::Utc;
    use mockall::predicate::eq;
    use serde_json::json;

    fn lisbon() -> Location {
        Location {
            id: Uuid::from_u128(1),
            city: "Lisbon".into(),
            country: "Portugal".into(),
            photo_url: None,
            created_at: Utc::now(),
        }
    }

    fn request(city: &str, country: &str) -> CreateLocationRequest {
        CreateLocationRequest {
            city: city.into(),
            country: country.into(),
            photo_url: None,
        }
    }

    #[test]
    fn test_location_from_place_details() {
        let details = json!({
            "result": {
                "name": "Belem Tower",
                "address_components": [
                    {"long_name": "Lisbon", "types": ["locality", "political"]},
                    {"long_name": "Lisboa", "types": ["administrative_area_level_1"]},
                    {"long_name": "Portugal", "short_name": "PT", "types": ["country", "political"]}
                ]
            }
        });

        assert_eq!(
            location_from_place_details(&details),
            Some(ResolvedLocation {
                city: "Lisbon".into(),
                country: "Portugal".into()
            })
        );
        assert_eq!(
            location_from_place_details(&json!({"result": {"address_components": []}})),
            None
        );
        assert_eq!(location_from_place_details(&json!({})), None);
    }

    #[tokio::test]
    async fn test_create_location_returns_existing_case_insensitively() {
        let mut catalog = MockCatalogStore::new();
        catalog
            .expect_find_location()
            .with(eq("lisbon".to_string()), eq("PORTUGAL".to_string()))
            .returning(|_, _| Ok(Some(lisbon())));
        catalog.expect_insert_location().never();

        let svc = LocationService::new(Arc::new(catalog));
        let result = svc.create_location(request(" lisbon ", "PORTUGAL")).await.unwrap();

        assert!(!result.was_created());
        assert_eq!(result.into_inner().city, "Lisbon");
    }

    #[tokio::test]
    async fn test_create_location_recovers_from_insert_race() {
        let mut catalog = MockCatalogStore::new();
        let mut seq = mockall::Sequence::new();
        catalog
            .expect_find_location()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));
        catalog
            .expect_insert_location()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(None));
        catalog
            .expect_find_location()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Some(lisbon())));

        let svc = LocationService::new(Arc::new(catalog));
        let result = svc.create_location(request("Lisbon", "Portugal")).await.unwrap();
        assert!(matches!(result, Upserted::Existing(ref l) if l.id == Uuid::from_u128(1)));
    }

    #[tokio::test]
    async fn test_create_location_rejects_blank_fields() {
        let svc = LocationService::new(Arc::new(MockCatalogStore::new()));
        let err = svc.create_location(request("  ", "Portugal")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_create_place_requires_location() {
        let svc = LocationService::new(Arc::new(MockCatalogStore::new()));
        let err = svc
            .create_place(CreatePlaceRequest {
                location_id: None,
                place_name: "Alfama".into(),
                photo_url: None,
            })
            .await
            .unwrap_err();

        match err {
            AppError::ValidationError(msg) => {
                assert_eq!(msg, "A location must be selected before creating a place")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_place_inserts_new() {
        let mut catalog = MockCatalogStore::new();
        catalog
            .expect_get_location()
            .returning(|_| Ok(Some(lisbon())));
        catalog.expect_find_place().returning(|_, _| Ok(None));
        catalog
            .expect_insert_place()
            .with(eq(Uuid::from_u128(1)), eq("Alfama".to_string()), eq(None::<String>))
            .returning(|location_id, place_name, photo_url| {
                Ok(Some(Place {
                    id: Uuid::from_u128(5),
                    location_id,
                    place_name,
                    photo_url,
                    created_at: Utc::now(),
                }))
            });

        let svc = LocationService::new(Arc::new(catalog));
        let result = svc
            .create_place(CreatePlaceRequest {
                location_id: Some(Uuid::from_u128(1)),
                place_name: " Alfama ".into(),
                photo_url: None,
            })
            .await
            .unwrap();

        assert!(result.was_created());
        assert_eq!(result.into_inner().place_name, "Alfama");
    }
}
