/// Durable stream and subject layout. All four subjects live on one stream so
/// retention and redelivery are managed in a single place.
pub const STREAM_NAME: &str = "AUDIT";
pub const STREAM_SUBJECTS: &str = "audit.log.>";

pub const AUDIT_LOG_CREATE: &str = "audit.log.create";
pub const AUDIT_LOG_CREATED: &str = "audit.log.created";
pub const AUDIT_LOG_FAILED: &str = "audit.log.failed";
pub const AUDIT_LOG_ROLLBACK: &str = "audit.log.rollback";

/// Durable consumer names. One consumer group per subject per owning service.
pub const DURABLE_AUDIT_CREATE: &str = "audit-svc-create";
pub const DURABLE_AUDIT_ROLLBACK: &str = "audit-svc-rollback";
pub const DURABLE_REGISTRY_CREATED: &str = "txn-svc-created";
pub const DURABLE_REGISTRY_FAILED: &str = "txn-svc-failed";

/// Stream retention window.
pub const STREAM_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;
