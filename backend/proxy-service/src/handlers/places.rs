/// Places proxy handler
///
/// `POST` takes a JSON body, `GET` takes the same fields as query parameters.
/// A photo requested over `POST` is answered with a redirect to the upstream
/// URL; over `GET` the image bytes are relayed so `<img src>` can point here.
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::{ProxyError, Result};
use crate::handlers::ProxyState;
use crate::providers::google_places::{DEFAULT_AUTOCOMPLETE_TYPES, DEFAULT_PHOTO_MAX_WIDTH};

pub const IMAGE_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Debug, Default, Deserialize)]
pub struct PlacesRequest {
    pub endpoint: Option<String>,
    pub input: Option<String>,
    pub place_id: Option<String>,
    pub photo_reference: Option<String>,
    pub maxwidth: Option<u32>,
    #[serde(rename = "type")]
    pub place_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhotoMode {
    Redirect,
    Relay,
}

fn required(value: Option<String>, name: &'static str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ProxyError::MissingParameter(name))
}

async fn dispatch(state: &ProxyState, req: PlacesRequest, photo_mode: PhotoMode) -> Result<HttpResponse> {
    let endpoint = req.endpoint.as_deref().unwrap_or_default();
    if !matches!(endpoint, "autocomplete" | "details" | "photo") {
        return Err(ProxyError::InvalidEndpoint);
    }
    let places = state.places.as_ref().ok_or(ProxyError::NotConfigured)?;

    match endpoint {
        "autocomplete" => {
            let input = required(req.input, "input")?;
            let types = req
                .place_type
                .unwrap_or_else(|| DEFAULT_AUTOCOMPLETE_TYPES.to_string());
            Ok(HttpResponse::Ok().json(places.autocomplete(input, types).await?))
        }
        "details" => {
            let place_id = required(req.place_id, "place_id")?;
            Ok(HttpResponse::Ok().json(places.details(place_id).await?))
        }
        _ => {
            let reference = required(req.photo_reference, "photo_reference")?;
            let max_width = req.maxwidth.unwrap_or(DEFAULT_PHOTO_MAX_WIDTH);
            match photo_mode {
                PhotoMode::Redirect => Ok(HttpResponse::Found()
                    .insert_header((header::LOCATION, places.photo_url(&reference, max_width)))
                    .finish()),
                PhotoMode::Relay => {
                    let photo = places.fetch_photo(reference, max_width).await?;
                    Ok(HttpResponse::Ok()
                        .content_type(photo.content_type)
                        .insert_header((header::CACHE_CONTROL, IMAGE_CACHE_CONTROL))
                        .body(photo.body))
                }
            }
        }
    }
}

/// POST /places-proxy
pub async fn places_proxy_post(
    state: web::Data<ProxyState>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    // An unreadable body has no endpoint and is rejected as such.
    let req = serde_json::from_slice::<PlacesRequest>(&body).unwrap_or_default();
    dispatch(&state, req, PhotoMode::Redirect).await
}

/// GET /places-proxy?endpoint=photo&photo_reference=..&maxwidth=..
pub async fn places_proxy_get(
    state: web::Data<ProxyState>,
    query: web::Query<PlacesRequest>,
) -> Result<HttpResponse> {
    dispatch(&state, query.into_inner(), PhotoMode::Relay).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::google_places::{MockPlacesProvider, PlacePhoto};
    use actix_web::{test, App};
    use mockall::predicate::eq;
    use serde_json::json;
    use std::sync::Arc;

    fn state(places: Option<MockPlacesProvider>) -> web::Data<ProxyState> {
        web::Data::new(ProxyState {
            places: places.map(|p| Arc::new(p) as Arc<dyn crate::providers::PlacesProvider>),
            facts: None,
        })
    }

    macro_rules! places_app {
        ($state:expr) => {
            test::init_service(
                App::new().app_data($state).service(
                    web::resource("/places-proxy")
                        .route(web::post().to(places_proxy_post))
                        .route(web::get().to(places_proxy_get)),
                ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_autocomplete_defaults_to_cities() {
        let mut places = MockPlacesProvider::new();
        places
            .expect_autocomplete()
            .with(eq("Lisb".to_string()), eq("(cities)".to_string()))
            .times(1)
            .returning(|_, _| Ok(json!({"predictions": [{"description": "Lisbon, Portugal"}], "status": "OK"})));
        let app = places_app!(state(Some(places)));

        let req = test::TestRequest::post()
            .uri("/places-proxy")
            .set_json(json!({"endpoint": "autocomplete", "input": "Lisb"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["predictions"][0]["description"], "Lisbon, Portugal");
    }

    #[actix_web::test]
    async fn test_details_passes_place_id() {
        let mut places = MockPlacesProvider::new();
        places
            .expect_details()
            .with(eq("ChIJ123".to_string()))
            .returning(|_| Ok(json!({"result": {"name": "Lisbon"}})));
        let app = places_app!(state(Some(places)));

        let req = test::TestRequest::post()
            .uri("/places-proxy")
            .set_json(json!({"endpoint": "details", "place_id": "ChIJ123"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["result"]["name"], "Lisbon");
    }

    #[actix_web::test]
    async fn test_photo_post_redirects() {
        let mut places = MockPlacesProvider::new();
        places
            .expect_photo_url()
            .withf(|reference, width| reference == "ref-1" && *width == 400)
            .returning(|_, _| "https://maps.example/photo?ref=ref-1".to_string());
        let app = places_app!(state(Some(places)));

        let req = test::TestRequest::post()
            .uri("/places-proxy")
            .set_json(json!({"endpoint": "photo", "photo_reference": "ref-1"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 302);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "https://maps.example/photo?ref=ref-1"
        );
    }

    #[actix_web::test]
    async fn test_photo_get_relays_image() {
        let mut places = MockPlacesProvider::new();
        places
            .expect_fetch_photo()
            .with(eq("ref-2".to_string()), eq(800))
            .returning(|_, _| {
                Ok(PlacePhoto {
                    content_type: "image/png".to_string(),
                    body: bytes::Bytes::from_static(b"png-bytes"),
                })
            });
        let app = places_app!(state(Some(places)));

        let req = test::TestRequest::get()
            .uri("/places-proxy?endpoint=photo&photo_reference=ref-2&maxwidth=800")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
        assert_eq!(
            resp.headers().get(header::CACHE_CONTROL).unwrap(),
            IMAGE_CACHE_CONTROL
        );
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"png-bytes");
    }

    #[actix_web::test]
    async fn test_invalid_endpoint() {
        let app = places_app!(state(Some(MockPlacesProvider::new())));

        for payload in [json!({"endpoint": "nearby"}), json!({})] {
            let req = test::TestRequest::post()
                .uri("/places-proxy")
                .set_json(payload)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 400);
            let body: serde_json::Value = test::read_body_json(resp).await;
            assert_eq!(body, json!({"error": "Invalid endpoint."}));
        }
    }

    #[actix_web::test]
    async fn test_missing_key_and_missing_input() {
        let app = places_app!(state(None));
        let req = test::TestRequest::post()
            .uri("/places-proxy")
            .set_json(json!({"endpoint": "autocomplete", "input": "Lis"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);

        let app = places_app!(state(Some(MockPlacesProvider::new())));
        let req = test::TestRequest::post()
            .uri("/places-proxy")
            .set_json(json!({"endpoint": "autocomplete", "input": "  "}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Missing input parameter");
    }
}
