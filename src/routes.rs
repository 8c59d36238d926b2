use actix_web::web;

use crate::handlers;

/// Transaction-service routes reachable without a bearer token.
/// Mounted under the "/api" scope in the binary.
pub fn configure_public_transaction_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/auth/register",
        web::post().to(handlers::auth_handlers::register),
    );
    cfg.route("/auth/login", web::post().to(handlers::auth_handlers::login));
}

/// Transaction-service routes wrapped with SecureAuthentication in the
/// binary.
pub fn configure_protected_transaction_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/me", web::get().to(handlers::auth_handlers::me));

    // Transaction routes (/api/transactions/*)
    cfg.service(
        web::scope("/transactions")
            .service(handlers::transaction_handlers::create_transaction)
            .service(handlers::transaction_handlers::list_transactions)
            .service(handlers::transaction_handlers::get_transaction)
            .service(handlers::transaction_handlers::update_transaction)
            .service(handlers::transaction_handlers::delete_transaction),
    );
}

/// Audit-service query and intake routes (/api/audit-logs/*). Unauthenticated
/// inside the trust boundary.
pub fn configure_audit_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/audit-logs")
            .service(handlers::audit_log_handlers::create_audit_log)
            .service(handlers::audit_log_handlers::list_audit_logs)
            .service(handlers::audit_log_handlers::get_by_correlation)
            .service(handlers::audit_log_handlers::get_by_entity)
            .service(handlers::audit_log_handlers::get_audit_log),
    );
}
