use actix_cors::Cors;
use actix_web::{middleware::ErrorHandlers, middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

use transaction_platform::config::AppSettings;
use transaction_platform::db::connection::{create_pool, verify_connection};
use transaction_platform::db::{run_migrations, AuditLogRepository, AUDIT_MIGRATOR};
use transaction_platform::error::{render_error_envelope, AppError};
use transaction_platform::handlers::health::health_check;
use transaction_platform::messaging::stream_client::NatsStreamClient;
use transaction_platform::routes::configure_audit_routes;
use transaction_platform::services::audit_consumer::AuditConsumer;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = match AppSettings::from_env("audit-service", 3001) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load settings: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match create_pool(&settings.database).await {
        Ok(pool) => {
            if let Err(e) = verify_connection(&pool).await {
                log::error!("Database verification failed: {}", e);
                std::process::exit(1);
            }
            pool
        }
        Err(e) => {
            log::error!("Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(&AUDIT_MIGRATOR, &pool).await {
        log::error!("Failed to apply migrations: {}", e);
        std::process::exit(1);
    }

    let stream = match NatsStreamClient::connect(&settings.broker, &settings.app.service_name).await
    {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("Failed to connect to the message broker: {}", e);
            std::process::exit(1);
        }
    };

    let repository = AuditLogRepository::new(pool.clone());
    let consumer = AuditConsumer::new(repository.clone(), Arc::clone(&stream));
    if let Err(e) = consumer.start().await {
        log::error!("Failed to start audit consumer: {}", e);
        std::process::exit(1);
    }

    let settings_data = web::Data::new(settings.clone());
    let repository_data = web::Data::new(repository);

    let host = settings.server.host.clone();
    let port = settings.server.port;
    log::info!(
        "Starting {} at http://{}:{}",
        settings.app.service_name,
        host,
        port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .wrap(ErrorHandlers::new().default_handler(render_error_envelope))
            .app_data(settings_data.clone())
            .app_data(repository_data.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::Validation(format!("Invalid request body: {}", err)).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                AppError::Validation(format!("Invalid query parameters: {}", err)).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                AppError::Validation(format!("Invalid path parameter: {}", err)).into()
            }))
            .route("/health", web::get().to(health_check))
            .service(web::scope("/api").configure(configure_audit_routes))
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    // Drain the broker first so pending acks flush, then drop the pool.
    if let Err(e) = stream.close().await {
        log::warn!("Broker drain failed: {}", e);
    }
    pool.close().await;
    Ok(())
}
