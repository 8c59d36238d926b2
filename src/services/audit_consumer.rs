use bytes::Bytes;
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::sync::Arc;

use async_nats::jetstream::consumer::pull;

use crate::db::AuditLogRepository;
use crate::db::repositories::audit_log_repository::NewAuditLog;
use crate::messaging::envelopes::{AuditCreatedAck, AuditEnvelope, AuditFailedAck, AuditRollback};
use crate::messaging::stream_client::{NatsStreamClient, StreamError, StreamPublisher};
use crate::messaging::subjects::{
    AUDIT_LOG_CREATE, AUDIT_LOG_CREATED, AUDIT_LOG_FAILED, AUDIT_LOG_ROLLBACK,
    DURABLE_AUDIT_CREATE, DURABLE_AUDIT_ROLLBACK,
};
use crate::models::audit_log::{AuditAction, AuditStatus};

/// Envelope validation applied before any row is written. Returns the error
/// text published on `audit.log.failed`.
pub fn validate_envelope(envelope: &AuditEnvelope) -> Result<(), String> {
    if envelope.correlation_id.trim().is_empty() {
        return Err("correlationId must not be empty".to_string());
    }
    if envelope.service_name.trim().is_empty() {
        return Err("serviceName must not be empty".to_string());
    }
    if envelope.entity_type.trim().is_empty() {
        return Err("entityType must not be empty".to_string());
    }
    if envelope.entity_id.trim().is_empty() {
        return Err("entityId must not be empty".to_string());
    }
    if AuditAction::parse(&envelope.action).is_err() {
        return Err(format!("unsupported action '{}'", envelope.action));
    }
    if AuditStatus::parse(&envelope.status).is_err() {
        return Err(format!("unsupported status '{}'", envelope.status));
    }
    Ok(())
}

/// Maps a validated envelope onto an insert payload.
pub fn new_audit_log(envelope: &AuditEnvelope) -> NewAuditLog {
    NewAuditLog {
        action: envelope.action.clone(),
        entity_type: envelope.entity_type.clone(),
        entity_id: envelope.entity_id.clone(),
        user_id: envelope.user_id.clone(),
        status: envelope.status.clone(),
        metadata: envelope.metadata.clone(),
        changes: envelope
            .changes
            .as_ref()
            .map(|c| serde_json::json!({"before": c.before, "after": c.after})),
        ip_address: envelope.ip_address.clone(),
        user_agent: envelope.user_agent.clone(),
        correlation_id: envelope.correlation_id.clone(),
        service_name: envelope.service_name.clone(),
    }
}

/// Owns the audit store's write side: turns `audit.log.create` messages into
/// rows plus exactly one ack or fail, and `audit.log.rollback` messages into
/// idempotent status transitions.
pub struct AuditConsumer {
    repository: AuditLogRepository,
    stream: Arc<NatsStreamClient>,
}

impl AuditConsumer {
    pub fn new(repository: AuditLogRepository, stream: Arc<NatsStreamClient>) -> Self {
        Self { repository, stream }
    }

    /// Creates both durable subscriptions, then spawns the two consume loops.
    pub async fn start(self) -> Result<(), StreamError> {
        let create_messages = self
            .stream
            .durable_subscription(AUDIT_LOG_CREATE, DURABLE_AUDIT_CREATE)
            .await?;
        let rollback_messages = self
            .stream
            .durable_subscription(AUDIT_LOG_ROLLBACK, DURABLE_AUDIT_ROLLBACK)
            .await?;

        let consumer = Arc::new(self);
        tokio::spawn(Arc::clone(&consumer).create_loop(create_messages));
        tokio::spawn(consumer.rollback_loop(rollback_messages));
        info!("Audit consumer started");
        Ok(())
    }

    async fn create_loop(self: Arc<Self>, mut messages: pull::Stream) {
        while let Some(next) = messages.next().await {
            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    warn!("Audit create subscription error: {}", e);
                    continue;
                }
            };

            self.handle_create(&message.payload).await;

            if let Err(e) = message.ack().await {
                warn!("Failed to acknowledge audit create message: {}", e);
            }
        }
        warn!("Audit create stream ended");
    }

    async fn rollback_loop(self: Arc<Self>, mut messages: pull::Stream) {
        while let Some(next) = messages.next().await {
            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    warn!("Rollback subscription error: {}", e);
                    continue;
                }
            };

            self.handle_rollback(&message.payload).await;

            if let Err(e) = message.ack().await {
                warn!("Failed to acknowledge rollback message: {}", e);
            }
        }
        warn!("Rollback stream ended");
    }

    async fn handle_create(&self, payload: &[u8]) {
        let envelope = match serde_json::from_slice::<AuditEnvelope>(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Without a correlation id there is nobody to notify; try to
                // salvage one so the saga fails fast instead of timing out.
                warn!("Malformed audit envelope: {}", e);
                if let Some(correlation_id) = salvage_correlation_id(payload) {
                    self.publish_failed(&correlation_id, &format!("malformed envelope: {}", e))
                        .await;
                }
                return;
            }
        };

        if let Err(reason) = validate_envelope(&envelope) {
            warn!(
                "Rejecting audit envelope for correlation id {}: {}",
                envelope.correlation_id, reason
            );
            self.publish_failed(&envelope.correlation_id, &reason).await;
            return;
        }

        match self.repository.insert(&new_audit_log(&envelope)).await {
            Ok((row, already_existed)) => {
                if already_existed {
                    debug!(
                        "Duplicate delivery for correlation id {}, re-publishing ack",
                        envelope.correlation_id
                    );
                }
                self.publish_created(&envelope.correlation_id, &row.id.to_string())
                    .await;
            }
            Err(e) => {
                warn!(
                    "Audit insert failed for correlation id {}: {}",
                    envelope.correlation_id, e
                );
                self.publish_failed(&envelope.correlation_id, "audit log persistence failed")
                    .await;
            }
        }
    }

    async fn handle_rollback(&self, payload: &[u8]) {
        let rollback = match serde_json::from_slice::<AuditRollback>(payload) {
            Ok(rollback) => rollback,
            Err(e) => {
                warn!("Malformed rollback message: {}", e);
                return;
            }
        };

        match self
            .repository
            .mark_rolled_back(&rollback.correlation_id)
            .await
        {
            Ok(0) => debug!(
                "Rollback for correlation id {} matched no rows ({})",
                rollback.correlation_id, rollback.reason
            ),
            Ok(count) => info!(
                "Rolled back {} audit row(s) for correlation id {} ({})",
                count, rollback.correlation_id, rollback.reason
            ),
            Err(e) => warn!(
                "Rollback for correlation id {} failed: {}",
                rollback.correlation_id, e
            ),
        }
    }

    async fn publish_created(&self, correlation_id: &str, audit_log_id: &str) {
        let ack = AuditCreatedAck {
            correlation_id: correlation_id.to_string(),
            audit_log_id: audit_log_id.to_string(),
            success: true,
        };
        self.publish_json(AUDIT_LOG_CREATED, &ack, correlation_id)
            .await;
    }

    async fn publish_failed(&self, correlation_id: &str, error: &str) {
        let ack = AuditFailedAck {
            correlation_id: correlation_id.to_string(),
            error: error.to_string(),
            success: false,
        };
        self.publish_json(AUDIT_LOG_FAILED, &ack, correlation_id)
            .await;
    }

    /// If the ack publish fails the row may already exist; the coordinator
    /// times out and compensates, which is the self-healing path.
    async fn publish_json<T: serde::Serialize>(
        &self,
        subject: &str,
        body: &T,
        correlation_id: &str,
    ) {
        let payload = match serde_json::to_vec(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize ack for {}: {}", correlation_id, e);
                return;
            }
        };
        if let Err(e) = self.stream.publish(subject, Bytes::from(payload)).await {
            warn!(
                "Publishing {} for correlation id {} failed: {}",
                subject, correlation_id, e
            );
        }
    }
}

fn salvage_correlation_id(payload: &[u8]) -> Option<String> {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()?
        .get("correlationId")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::envelopes::ChangeSet;

    fn envelope() -> AuditEnvelope {
        AuditEnvelope {
            action: "CREATE".to_string(),
            entity_type: "Transaction".to_string(),
            entity_id: "tx-1".to_string(),
            user_id: Some("u-1".to_string()),
            status: "SUCCESS".to_string(),
            metadata: None,
            changes: Some(ChangeSet {
                before: None,
                after: Some(serde_json::json!({"amount": "10.00"})),
            }),
            ip_address: None,
            user_agent: None,
            correlation_id: "corr-1".to_string(),
            service_name: "transaction-service".to_string(),
        }
    }

    #[test]
    fn valid_envelope_passes() {
        assert!(validate_envelope(&envelope()).is_ok());
    }

    #[test]
    fn empty_correlation_id_is_rejected() {
        let mut env = envelope();
        env.correlation_id = "  ".to_string();
        assert!(validate_envelope(&env).unwrap_err().contains("correlationId"));
    }

    #[test]
    fn empty_service_name_is_rejected() {
        let mut env = envelope();
        env.service_name = String::new();
        assert!(validate_envelope(&env).unwrap_err().contains("serviceName"));
    }

    #[test]
    fn out_of_enum_action_is_rejected() {
        let mut env = envelope();
        env.action = "ARCHIVE".to_string();
        assert!(validate_envelope(&env).unwrap_err().contains("ARCHIVE"));
    }

    #[test]
    fn out_of_enum_status_is_rejected() {
        let mut env = envelope();
        env.status = "OK".to_string();
        assert!(validate_envelope(&env).is_err());
    }

    #[test]
    fn new_audit_log_nests_change_snapshots() {
        let new = new_audit_log(&envelope());
        assert_eq!(new.correlation_id, "corr-1");
        let changes = new.changes.unwrap();
        assert_eq!(changes["after"]["amount"], serde_json::json!("10.00"));
        assert!(changes["before"].is_null());
    }

    #[test]
    fn salvages_correlation_id_from_partial_payload() {
        let payload = br#"{"correlationId": "corr-9", "action": 42}"#;
        assert_eq!(salvage_correlation_id(payload).as_deref(), Some("corr-9"));
        assert!(salvage_correlation_id(b"not json").is_none());
    }
}
