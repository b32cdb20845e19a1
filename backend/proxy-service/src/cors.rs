/// Origin-checked CORS for the proxy endpoints
///
/// Unlike a strict CORS layer, a disallowed origin is not rejected: responses
/// name the production origin instead, so the browser blocks the read.
/// Preflight `OPTIONS` requests are answered here with `200 OK`.
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use actix_web::http::Method;
use actix_web::{Error, HttpResponse};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

pub const ALLOW_HEADERS: &str = "Content-Type, Authorization, apikey, x-client-info";
pub const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE";
pub const MAX_AGE_SECS: &str = "86400";

const DEV_ORIGINS: [&str; 6] = [
    "http://localhost:4200",
    "http://localhost:8080",
    "http://localhost:8100",
    "http://127.0.0.1:4200",
    "http://127.0.0.1:8080",
    "http://127.0.0.1:8100",
];

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    /// Production origin first, then development origins
    allowed: Vec<String>,
}

impl CorsPolicy {
    pub fn new(prod_origin: &str) -> Self {
        let mut allowed = vec![prod_origin.trim_end_matches('/').to_string()];
        allowed.extend(DEV_ORIGINS.iter().map(|o| o.to_string()));
        Self { allowed }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.iter().any(|o| o == origin)
    }

    /// Origin to echo back for a request origin
    pub fn resolve_origin<'a>(&'a self, origin: Option<&'a str>) -> &'a str {
        match origin {
            Some(o) if self.is_allowed(o) => o,
            _ => &self.allowed[0],
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap, origin: Option<&str>) {
        let allow_origin = self.resolve_origin(origin);
        match HeaderValue::from_str(allow_origin) {
            Ok(value) => {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
            Err(e) => tracing::warn!(origin = %allow_origin, error = %e, "unusable CORS origin"),
        }

        let fixed: [(HeaderName, &'static str); 4] = [
            (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
            (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
            (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"),
            (header::ACCESS_CONTROL_MAX_AGE, MAX_AGE_SECS),
        ];
        for (name, value) in fixed {
            headers.insert(name, HeaderValue::from_static(value));
        }
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
}

/// Actix middleware applying a [`CorsPolicy`] to every response
pub struct CorsHeaders {
    policy: Arc<CorsPolicy>,
}

impl CorsHeaders {
    pub fn new(policy: Arc<CorsPolicy>) -> Self {
        Self { policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for CorsHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = CorsHeadersService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CorsHeadersService {
            service: Rc::new(service),
            policy: self.policy.clone(),
        }))
    }
}

pub struct CorsHeadersService<S> {
    service: Rc<S>,
    policy: Arc<CorsPolicy>,
}

impl<S, B> Service<ServiceRequest> for CorsHeadersService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let policy = self.policy.clone();
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if req.method() == Method::OPTIONS {
            let mut response = HttpResponse::Ok().body("OK");
            policy.apply(response.headers_mut(), origin.as_deref());
            return Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) });
        }

        let service = self.service.clone();
        Box::pin(async move {
            let mut res = service.call(req).await?;
            policy.apply(res.headers_mut(), origin.as_deref());
            Ok(res.map_into_left_body())
        })
    }
}
