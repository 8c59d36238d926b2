pub mod audit_consumer;
pub mod auth;
pub mod auth_service;
pub mod correlation_registry;
pub mod transaction_saga;
