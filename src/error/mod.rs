use actix_web::{
    dev::ServiceResponse,
    error::ResponseError,
    http::StatusCode,
    middleware::ErrorHandlerResponse,
    HttpResponse,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::error::Error as SqlxError;
use std::error::Error as StdError;
use std::fmt;

use crate::messaging::stream_client::StreamError;

/// Unique-violation SQLSTATE, used to collapse duplicate username/email
/// inserts into a Conflict.
const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    DistributedTransaction(String),
    Database(String),
    Configuration(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "Validation error: {}", e),
            AppError::Unauthorized(e) => write!(f, "Unauthorized: {}", e),
            AppError::NotFound(e) => write!(f, "Not found: {}", e),
            AppError::Conflict(e) => write!(f, "Conflict: {}", e),
            AppError::DistributedTransaction(e) => {
                write!(f, "Distributed transaction error: {}", e)
            }
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Configuration(e) => write!(f, "Configuration error: {}", e),
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl StdError for AppError {}

impl AppError {
    /// Stable machine-readable code surfaced in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::DistributedTransaction(_) => "DISTRIBUTED_TRANSACTION_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-facing message. Database and internal details are not leaked.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.clone(),
            AppError::Unauthorized(e) => e.clone(),
            AppError::NotFound(e) => e.clone(),
            AppError::Conflict(e) => e.clone(),
            AppError::DistributedTransaction(e) => e.clone(),
            AppError::Database(_) => "Database operation failed".to_string(),
            AppError::Configuration(_) => "Service misconfigured".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DistributedTransaction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // The path is only known at the middleware layer; render_error_envelope
        // rewrites this body with the request path filled in.
        HttpResponse::build(self.status_code()).json(ErrorEnvelope::new(
            self.code(),
            self.public_message(),
            String::new(),
        ))
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match &error {
            SqlxError::RowNotFound => AppError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION) {
                    AppError::Conflict("Resource already exists".to_string())
                } else {
                    AppError::Database(error.to_string())
                }
            }
            _ => AppError::Database(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON serialization error: {}", error))
    }
}

impl From<bigdecimal::ParseBigDecimalError> for AppError {
    fn from(error: bigdecimal::ParseBigDecimalError) -> Self {
        AppError::Validation(format!("Invalid decimal value: {}", error))
    }
}

impl From<StreamError> for AppError {
    fn from(error: StreamError) -> Self {
        AppError::Internal(format!("Stream error: {}", error))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
    pub timestamp: chrono::DateTime<Utc>,
    pub path: String,
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: String, path: String) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
            timestamp: Utc::now(),
            path,
        }
    }
}

fn code_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "VALIDATION_ERROR",
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::CONFLICT => "CONFLICT",
        StatusCode::METHOD_NOT_ALLOWED => "METHOD_NOT_ALLOWED",
        StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
        _ => "INTERNAL_ERROR",
    }
}

/// Single error-to-HTTP mapper: every 4xx/5xx leaving either service is
/// rewritten into the `{success, error, timestamp, path}` envelope, with the
/// request path attached. Registered as the default `ErrorHandlers` handler.
pub fn render_error_envelope<B>(
    res: ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    let status = res.status();
    let path = res.request().path().to_string();

    let envelope = match res.response().error().and_then(|e| e.as_error::<AppError>()) {
        Some(app_err) => ErrorEnvelope::new(app_err.code(), app_err.public_message(), path),
        None => {
            let message = res
                .response()
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                });
            ErrorEnvelope::new(code_for_status(status), message, path)
        }
    };

    let (req, res) = res.into_parts();
    let res = res.set_body(serde_json::to_string(&envelope).unwrap_or_default());
    let mut res = ServiceResponse::new(req, res)
        .map_into_boxed_body()
        .map_into_right_body::<B>();
    res.response_mut().headers_mut().insert(
        actix_web::http::header::CONTENT_TYPE,
        actix_web::http::header::HeaderValue::from_static("application/json"),
    );
    Ok(ErrorHandlerResponse::Response(res))
}

// Define AppResult type alias for Result<T, AppError>
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::DistributedTransaction("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let err = AppError::Database("connection string postgres://user:pw@host".into());
        assert_eq!(err.public_message(), "Database operation failed");
        assert_eq!(err.code(), "DATABASE_ERROR");
    }

    #[test]
    fn distributed_transaction_message_is_surfaced() {
        let err =
            AppError::DistributedTransaction("Audit log creation failed or timed out".into());
        assert!(err.public_message().contains("failed or timed out"));
        assert_eq!(err.code(), "DISTRIBUTED_TRANSACTION_ERROR");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: AppError = SqlxError::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
