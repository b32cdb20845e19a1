/// HTTP middleware for journal-service
///
/// Resolves the caller's [`Session`] from the bearer token issued by the
/// identity provider. Handlers take the session as an extractor; there is no
/// process-wide current user.
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{error::ErrorUnauthorized, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuthConfig;

/// Identity of the authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub email: Option<String>,
}

impl Session {
    pub fn author_id(&self) -> String {
        self.user_id.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Missing Authorization header")]
    MissingHeader,
    #[error("Invalid Authorization scheme")]
    InvalidScheme,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Invalid user ID")]
    InvalidSubject,
}

/// Validates HS256 access tokens
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match &config.jwt_audience {
            Some(aud) => validation.set_audience(&[aud.as_str()]),
            None => validation.validate_aud = false,
        }

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn verify_header(&self, header: Option<&str>) -> Result<Session, SessionError> {
        let header = header.ok_or(SessionError::MissingHeader)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(SessionError::InvalidScheme)?;
        self.verify_token(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Session, SessionError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|_| SessionError::InvalidToken)?;

        let user_id =
            Uuid::parse_str(&data.claims.sub).map_err(|_| SessionError::InvalidSubject)?;

        Ok(Session {
            user_id,
            email: data.claims.email,
        })
    }
}

/// Actix middleware that validates a Bearer token and stores the [`Session`]
pub struct JwtAuthMiddleware {
    verifier: Arc<SessionVerifier>,
}

impl JwtAuthMiddleware {
    pub fn new(verifier: Arc<SessionVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    verifier: Arc<SessionVerifier>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let verifier = self.verifier.clone();

        Box::pin(async move {
            let header = req
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok());

            let session = verifier.verify_header(header).map_err(|err| {
                tracing::debug!(error = %err, path = %req.path(), "rejected request");
                ErrorUnauthorized(err.to_string())
            })?;

            req.extensions_mut().insert(session);

            service.call(req).await
        })
    }
}

impl FromRequest for Session {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Session>()
                .cloned()
                .ok_or_else(|| ErrorUnauthorized("Session missing")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        email: &'a str,
        exp: usize,
    }

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            jwt_audience: None,
        }
    }

    fn token(secret: &str, sub: &str) -> String {
        let claims = TestClaims {
            sub,
            email: "traveller@example.com",
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_session() {
        let verifier = SessionVerifier::new(&config());
        let user_id = Uuid::new_v4();
        let header = format!("Bearer {}", token("test-secret", &user_id.to_string()));

        let session = verifier.verify_header(Some(&header)).unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.email.as_deref(), Some("traveller@example.com"));
    }

    #[test]
    fn test_rejections() {
        let verifier = SessionVerifier::new(&config());
        assert_eq!(verifier.verify_header(None), Err(SessionError::MissingHeader));
        assert_eq!(
            verifier.verify_header(Some("Basic abc")),
            Err(SessionError::InvalidScheme)
        );

        let forged = format!("Bearer {}", token("other-secret", &Uuid::new_v4().to_string()));
        assert_eq!(
            verifier.verify_header(Some(&forged)),
            Err(SessionError::InvalidToken)
        );

        let bad_sub = format!("Bearer {}", token("test-secret", "not-a-uuid"));
        assert_eq!(
            verifier.verify_header(Some(&bad_sub)),
            Err(SessionError::InvalidSubject)
        );
    }
}
