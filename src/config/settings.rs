use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::env;

/// Fallback secret for local development only. Production refuses to start
/// without an explicit JWT_SECRET of at least 32 bytes.
const DEV_JWT_SECRET: &str = "insecure-dev-only-jwt-secret-0123456789";

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppSettings {
    pub app: AppConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub url: String,
    pub audit_ack_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expires_in_secs: u64,
}

impl AppSettings {
    /// Loads settings from the environment. `default_service_name` and
    /// `default_port` differ between the two binaries.
    pub fn from_env(default_service_name: &str, default_port: u16) -> Result<Self, AppError> {
        let service_name =
            env::var("SERVICE_NAME").unwrap_or_else(|_| default_service_name.to_string());
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        if environment != "development" && environment != "production" {
            return Err(AppError::Configuration(
                "ENVIRONMENT must be 'development' or 'production'".to_string(),
            ));
        }

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| default_port.to_string())
            .parse::<u16>()
            .map_err(|_| {
                AppError::Configuration("PORT must be a valid port number".to_string())
            })?;

        let allowed_origins = match env::var("ALLOWED_ORIGINS") {
            Ok(v) => v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => Vec::new(),
        };

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Configuration("DATABASE_URL must be set".to_string()))?;

        let max_connections = env::var("DB_POOL_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "20".to_string())
            .parse::<u32>()
            .map_err(|_| {
                AppError::Configuration("DB_POOL_MAX_CONNECTIONS must be a valid number".to_string())
            })?;

        let acquire_timeout_ms = env::var("DB_POOL_ACQUIRE_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()
            .map_err(|_| {
                AppError::Configuration(
                    "DB_POOL_ACQUIRE_TIMEOUT_MS must be a valid number".to_string(),
                )
            })?;

        let nats_url =
            env::var("NATS_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string());

        let audit_ack_timeout_secs = env::var("AUDIT_ACK_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .map_err(|_| {
                AppError::Configuration("AUDIT_ACK_TIMEOUT_SECS must be a valid number".to_string())
            })?;

        Ok(Self {
            app: AppConfig {
                service_name,
                environment,
            },
            server: ServerConfig {
                host,
                port,
                allowed_origins,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
                acquire_timeout_ms,
            },
            broker: BrokerConfig {
                url: nats_url,
                audit_ack_timeout_secs,
            },
        })
    }
}

impl AuthConfig {
    /// Loaded only by the transaction service; the audit API sits inside the
    /// trust boundary and performs no authentication.
    pub fn from_env(is_production: bool) -> Result<Self, AppError> {
        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if !is_production => DEV_JWT_SECRET.to_string(),
            Err(_) => {
                return Err(AppError::Configuration(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
        };
        Self::validate_secret(&jwt_secret, is_production)?;

        let jwt_expires_in_secs = env::var("JWT_EXPIRES_IN_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse::<u64>()
            .map_err(|_| {
                AppError::Configuration("JWT_EXPIRES_IN_SECS must be a valid number".to_string())
            })?;

        Ok(Self {
            jwt_secret,
            jwt_expires_in_secs,
        })
    }

    fn validate_secret(secret: &str, is_production: bool) -> Result<(), AppError> {
        if is_production && secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AppError::Configuration(format!(
                "JWT_SECRET must be at least {} bytes in production",
                MIN_JWT_SECRET_LEN
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secret_rejected_in_production() {
        let result = AuthConfig::validate_secret("too-short", true);
        assert!(result.is_err());
    }

    #[test]
    fn short_secret_tolerated_in_development() {
        assert!(AuthConfig::validate_secret("dev", false).is_ok());
    }

    #[test]
    fn dev_fallback_secret_is_long_enough() {
        assert!(DEV_JWT_SECRET.len() >= MIN_JWT_SECRET_LEN);
    }
}
