pub mod connection;
pub mod repositories;

use sqlx::migrate::Migrator;
use sqlx::PgPool;

use crate::error::AppError;

/// Forward-only migrations for the transaction service's private schema.
pub static TRANSACTION_MIGRATOR: Migrator = sqlx::migrate!("migrations/transactions");

/// Forward-only migrations for the audit service's private schema.
pub static AUDIT_MIGRATOR: Migrator = sqlx::migrate!("migrations/audit");

pub async fn run_migrations(migrator: &Migrator, pool: &PgPool) -> Result<(), AppError> {
    migrator
        .run(pool)
        .await
        .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;
    log::info!("Database migrations applied");
    Ok(())
}

pub use repositories::audit_log_repository::AuditLogRepository;
pub use repositories::transaction_repository::TransactionRepository;
pub use repositories::user_repository::UserRepository;
