//! Transport-level checks run before any handler logic: API key, `{id}` shape, HTTP method.

use std::future::{ready, Ready};
use std::rc::Rc;

use actix_web::body::EitherBody;
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, Error, FromRequest, HttpRequest, HttpResponse, ResponseError};
use futures_util::future::LocalBoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::config::secrets_match;
use crate::error::ApiError;
use crate::routes::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

static UUID_V4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("uuid v4 regex")
});

static FOUR_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}$").expect("pin regex"));

pub fn is_uuid_v4(s: &str) -> bool {
    UUID_V4.is_match(s)
}

pub fn is_four_digit_pin(s: &str) -> bool {
    FOUR_DIGITS.is_match(s)
}

/// Shape-checks an identifier; existence is the handler's concern.
pub fn parse_entity_id(raw: &str) -> Result<Uuid, ApiError> {
    if !is_uuid_v4(raw) {
        return Err(ApiError::BadRequest("Invalid ID format".into()));
    }
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid ID format".into()))
}

/// Extractor for the `{id}` route segment, rejecting anything not shaped like a UUID v4.
#[derive(Debug, Clone, Copy)]
pub struct EntityId(pub Uuid);

impl FromRequest for EntityId {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let raw = req.match_info().get("id").unwrap_or_default();
        ready(parse_entity_id(raw).map(EntityId))
    }
}

/// Fallback for known resources hit with the wrong method.
pub async fn method_not_allowed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::BadRequest("Method not allowed".into()))
}

// ---------------- API key middleware ----------------

/// Requires `x-api-key` to match the configured key on every wrapped route.
/// The key is read from the `AppState` registered on the app.
#[derive(Clone, Copy, Default)]
pub struct ApiKeyGate;

impl<S, B> Transform<S, ServiceRequest> for ApiKeyGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyGateMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyGateMiddleware { service: Rc::new(service) }))
    }
}

pub struct ApiKeyGateMiddleware<S> {
    service: Rc<S>,
}

fn authorized(req: &ServiceRequest) -> bool {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
        tracing::error!("AppState missing; refusing api request");
        return false;
    };
    req.headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|presented| secrets_match(&state.config.api_key, presented))
        .unwrap_or(false)
}

impl<S, B> Service<ServiceRequest> for ApiKeyGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !authorized(&req) {
            tracing::warn!(path = %req.path(), "rejected request without valid api key");
            let resp = ApiError::Unauthorized("Invalid API key".into()).error_response();
            return Box::pin(async move { Ok(req.into_response(resp).map_into_right_body()) });
        }
        let svc = self.service.clone();
        Box::pin(async move {
            let res = svc.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_shape() {
        assert!(is_uuid_v4("3fa85f64-5717-4562-b3fc-2c963f66afa6"));
        assert!(is_uuid_v4("3FA85F64-5717-4562-B3FC-2C963F66AFA6"));
        assert!(!is_uuid_v4("not-a-uuid"));
        // version nibble must be 4
        assert!(!is_uuid_v4("3fa85f64-5717-1562-b3fc-2c963f66afa6"));
        assert!(!is_uuid_v4(""));
    }

    #[test]
    fn parse_rejects_bad_ids() {
        assert!(matches!(parse_entity_id("not-a-uuid"), Err(ApiError::BadRequest(_))));
        let id = parse_entity_id("3fa85f64-5717-4562-b3fc-2c963f66afa6").unwrap();
        assert_eq!(id.to_string(), "3fa85f64-5717-4562-b3fc-2c963f66afa6");
    }

    #[test]
    fn generated_ids_pass_the_gate() {
        for _ in 0..16 {
            assert!(is_uuid_v4(&Uuid::new_v4().to_string()));
        }
    }

    #[test]
    fn pin_shape() {
        assert!(is_four_digit_pin("0000"));
        assert!(!is_four_digit_pin("123"));
        assert!(!is_four_digit_pin("12a4"));
        assert!(!is_four_digit_pin("１２３４"));
    }
}
