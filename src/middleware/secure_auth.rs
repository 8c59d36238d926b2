use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    web, Error, HttpMessage,
};
use futures_util::future::{ok, Ready};
use log::debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::authenticated_user::AuthenticatedUser;
use crate::services::auth::JwtService;

/// Bearer-JWT authentication middleware. Verified identity lands in the
/// request extensions as `AuthenticatedUser`.
#[derive(Clone)]
pub struct SecureAuthentication;

impl<S, B> Transform<S, ServiceRequest> for SecureAuthentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SecureAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SecureAuthenticationMiddleware {
            service: Arc::new(service),
        })
    }
}

pub struct SecureAuthenticationMiddleware<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for SecureAuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Arc::clone(&self.service);

        Box::pin(async move {
            let jwt = req
                .app_data::<web::Data<JwtService>>()
                .cloned()
                .ok_or_else(|| {
                    Error::from(AppError::Configuration(
                        "JWT service not configured".to_string(),
                    ))
                })?;

            let token = extract_bearer_token(&req)?;
            let claims = jwt.verify_token(&token).map_err(Error::from)?;

            let user_id = Uuid::parse_str(&claims.sub).map_err(|_| {
                Error::from(AppError::Unauthorized(
                    "Token subject is not a valid user id".to_string(),
                ))
            })?;

            debug!("Authenticated request for user {}", user_id);
            req.extensions_mut().insert(AuthenticatedUser {
                user_id,
                username: claims.username,
                email: claims.email,
            });

            service.call(req).await
        })
    }
}

fn extract_bearer_token(req: &ServiceRequest) -> Result<String, Error> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| {
            Error::from(AppError::Unauthorized(
                "Missing Authorization header".to_string(),
            ))
        })?
        .to_str()
        .map_err(|_| {
            Error::from(AppError::Unauthorized(
                "Malformed Authorization header".to_string(),
            ))
        })?;

    header
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            Error::from(AppError::Unauthorized(
                "Authorization header must be a Bearer token".to_string(),
            ))
        })
}
