use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;

use crate::error::AppError;
use crate::models::api_response::ApiResponse;
use crate::models::authenticated_user::AuthenticatedUser;
use crate::services::auth_service::{AuthService, LoginRequest, RegisterRequest};

pub async fn register(
    body: web::Json<RegisterRequest>,
    auth_service: web::Data<AuthService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let user = auth_service.register(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(user, req.path())))
}

pub async fn login(
    body: web::Json<LoginRequest>,
    auth_service: web::Data<AuthService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let response = auth_service.login(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(response, req.path())))
}

pub async fn me(
    user: AuthenticatedUser,
    auth_service: web::Data<AuthService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    debug!("Fetching profile for user {}", user.user_id);
    let summary = auth_service.current_user(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(summary, req.path())))
}
