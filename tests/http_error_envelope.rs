use actix_web::{middleware::ErrorHandlers, test, web, App, HttpResponse};
use serde_json::Value;

use transaction_platform::config::settings::{
    AppConfig, AppSettings, BrokerConfig, DatabaseConfig, ServerConfig,
};
use transaction_platform::error::{render_error_envelope, AppError};
use transaction_platform::handlers::health::health_check;

fn settings() -> AppSettings {
    AppSettings {
        app: AppConfig {
            service_name: "transaction-service".to_string(),
            environment: "development".to_string(),
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            allowed_origins: vec![],
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            acquire_timeout_ms: 1000,
        },
        broker: BrokerConfig {
            url: "nats://unused".to_string(),
            audit_ack_timeout_secs: 10,
        },
    }
}

async fn failing_handler() -> Result<HttpResponse, AppError> {
    Err(AppError::Validation("amount must be greater than zero".to_string()))
}

async fn saga_failure_handler() -> Result<HttpResponse, AppError> {
    Err(AppError::DistributedTransaction(
        "Audit log creation failed or timed out".to_string(),
    ))
}

#[actix_web::test]
async fn health_reports_service_and_version() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(settings()))
            .route("/health", web::get().to(health_check)),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "transaction-service");
}

#[actix_web::test]
async fn validation_errors_use_the_shared_envelope() {
    let app = test::init_service(
        App::new()
            .wrap(ErrorHandlers::new().default_handler(render_error_envelope))
            .route("/api/transactions", web::post().to(failing_handler)),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/api/transactions").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["message"], "amount must be greater than zero");
    assert_eq!(body["path"], "/api/transactions");
    assert!(body.get("timestamp").is_some());
}

#[actix_web::test]
async fn saga_failures_surface_the_audit_message() {
    let app = test::init_service(
        App::new()
            .wrap(ErrorHandlers::new().default_handler(render_error_envelope))
            .route("/api/transactions", web::post().to(saga_failure_handler)),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/api/transactions").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 500);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "DISTRIBUTED_TRANSACTION_ERROR");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Audit log creation failed or timed out"));
}

#[actix_web::test]
async fn unknown_routes_return_an_enveloped_404() {
    let app = test::init_service(
        App::new().wrap(ErrorHandlers::new().default_handler(render_error_envelope)),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/nowhere").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 404);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["path"], "/api/nowhere");
}
