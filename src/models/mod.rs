pub mod api_response;
pub mod audit_log;
pub mod auth_jwt_claims;
pub mod authenticated_user;
pub mod pagination;
pub mod transaction;
