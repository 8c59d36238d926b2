use actix_cors::Cors;
use actix_web::{middleware::ErrorHandlers, middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;

use transaction_platform::config::{AppSettings, AuthConfig};
use transaction_platform::db::connection::{create_pool, verify_connection};
use transaction_platform::db::{
    run_migrations, TransactionRepository, UserRepository, TRANSACTION_MIGRATOR,
};
use transaction_platform::error::{render_error_envelope, AppError};
use transaction_platform::handlers::health::health_check;
use transaction_platform::messaging::stream_client::{NatsStreamClient, StreamPublisher};
use transaction_platform::middleware::SecureAuthentication;
use transaction_platform::routes::{
    configure_protected_transaction_routes, configure_public_transaction_routes,
};
use transaction_platform::services::auth::JwtService;
use transaction_platform::services::auth_service::AuthService;
use transaction_platform::services::correlation_registry::CorrelationRegistry;
use transaction_platform::services::transaction_saga::TransactionSagaService;

fn make_cors(settings: &AppSettings) -> Cors {
    if settings.app.is_production() {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allow_any_header()
            .max_age(3600);
        for origin in &settings.server.allowed_origins {
            cors = cors.allowed_origin(origin);
        }
        cors
    } else {
        Cors::permissive()
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = match AppSettings::from_env("transaction-service", 3000) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load settings: {}", e);
            std::process::exit(1);
        }
    };

    let auth_config = match AuthConfig::from_env(settings.app.is_production()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load auth configuration: {}", e);
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

    if let Err(e) = run_migrations(&TRANSACTION_MIGRATOR, &pool).await {
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

    // The ack listeners must be running before any saga publishes.
    let registry = Arc::new(CorrelationRegistry::new());
    if let Err(e) = CorrelationRegistry::start_listeners(&registry, &stream).await {
        log::error!("Failed to start audit ack listeners: {}", e);
        std::process::exit(1);
    }

    let jwt_service = JwtService::new(&auth_config);
    let auth_service = AuthService::new(UserRepository::new(pool.clone()), jwt_service.clone());
    let publisher: Arc<dyn StreamPublisher> = Arc::clone(&stream) as Arc<dyn StreamPublisher>;
    let saga_service = TransactionSagaService::new(
        TransactionRepository::new(pool.clone()),
        Arc::clone(&registry),
        publisher,
        settings.app.service_name.clone(),
        Duration::from_secs(settings.broker.audit_ack_timeout_secs),
    );

    let settings_data = web::Data::new(settings.clone());
    let jwt_data = web::Data::new(jwt_service);
    let auth_data = web::Data::new(auth_service);
    let saga_data = web::Data::new(saga_service);

    let host = settings.server.host.clone();
    let port = settings.server.port;
    log::info!(
        "Starting {} at http://{}:{}",
        settings.app.service_name,
        host,
        port
    );

    let cors_settings = settings.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(make_cors(&cors_settings))
            .wrap(Logger::default())
            .wrap(ErrorHandlers::new().default_handler(render_error_envelope))
            .app_data(settings_data.clone())
            .app_data(jwt_data.clone())
            .app_data(auth_data.clone())
            .app_data(saga_data.clone())
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
            .service(
                web::scope("/api")
                    .configure(configure_public_transaction_routes)
                    .service(
                        web::scope("")
                            .wrap(SecureAuthentication)
                            .configure(configure_protected_transaction_routes),
                    ),
            )
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    // Shutdown: fail outstanding sagas so their local transactions roll
    // back, drain the broker so in-flight acks deliver, then drop the pool.
    log::info!("Shutting down, failing in-flight sagas");
    registry.fail_all();
    if let Err(e) = stream.close().await {
        log::warn!("Broker drain failed: {}", e);
    }
    pool.close().await;
    Ok(())
}
