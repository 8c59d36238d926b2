use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::AppError;

const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Creates the service's bounded connection pool. Each in-flight saga holds
/// one connection for its whole local transaction, so the pool ceiling bounds
/// saga concurrency.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, AppError> {
    let mut last_error = None;

    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        log::info!(
            "Database connection attempt {} of {}",
            attempt,
            MAX_CONNECT_ATTEMPTS
        );

        match PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .test_before_acquire(true)
            .connect(&config.url)
            .await
        {
            Ok(pool) => {
                log::info!(
                    "Database pool established (max connections: {})",
                    config.max_connections
                );
                return Ok(pool);
            }
            Err(e) => {
                log::warn!("Database connection attempt {} failed: {}", attempt, e);

                if e.to_string().contains("authentication failed") {
                    log::error!("Database authentication failed; check DATABASE_URL credentials");
                    return Err(AppError::Database(e.to_string()));
                }

                last_error = Some(e);

                if attempt < MAX_CONNECT_ATTEMPTS {
                    let delay = Duration::from_secs(2 * attempt as u64);
                    log::info!("Retrying in {} seconds...", delay.as_secs());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    let error = last_error.unwrap_or_else(|| {
        sqlx::Error::Configuration("unknown database connection error".into())
    });
    log::error!("All database connection attempts failed: {}", error);
    Err(AppError::Database(error.to_string()))
}

/// Verifies the database connection by executing a simple query.
pub async fn verify_connection(pool: &PgPool) -> Result<(), AppError> {
    sqlx::query_as::<_, (i32,)>("SELECT 1 as result")
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            log::error!("Database connection verification failed: {}", e);
            AppError::Database(e.to_string())
        })?;

    log::debug!("Database connection verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[tokio::test]
    async fn verify_connection_when_database_available() {
        // Runs only when DATABASE_URL points at a live database.
        if let Ok(url) = env::var("DATABASE_URL") {
            let config = DatabaseConfig {
                url,
                max_connections: 2,
                acquire_timeout_ms: 2000,
            };
            if let Ok(pool) = create_pool(&config).await {
                let _result = verify_connection(&pool).await;
            }
        }
    }
}
