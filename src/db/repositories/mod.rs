pub mod audit_log_repository;
pub mod transaction_repository;
pub mod user_repository;
