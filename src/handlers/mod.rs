pub mod audit_log_handlers;
pub mod auth_handlers;
pub mod health;
pub mod transaction_handlers;
