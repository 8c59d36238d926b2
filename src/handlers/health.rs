use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::config::AppSettings;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

pub async fn health_check(settings: web::Data<AppSettings>) -> impl Responder {
    // Public endpoint: basic liveness only, no dependency probes.
    let response = HealthResponse {
        status: "ok".to_string(),
        service: settings.app.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    HttpResponse::Ok().json(response)
}
