use bytes::Bytes;
use chrono::Utc;
use log::{debug, error, info, warn};
use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db::TransactionRepository;
use crate::error::AppError;
use crate::messaging::envelopes::{AuditEnvelope, AuditRollback, ChangeSet};
use crate::messaging::stream_client::StreamPublisher;
use crate::messaging::subjects::{AUDIT_LOG_CREATE, AUDIT_LOG_ROLLBACK};
use crate::models::audit_log::{AuditAction, AuditStatus};
use crate::models::pagination::{PageParams, SortOrder, TransactionSortField};
use crate::models::transaction::{
    CreateTransactionRequest, TransactionDto, TransactionFilter, TransactionRecord,
    TransactionStatus, UpdateTransactionRequest,
};
use crate::services::correlation_registry::CorrelationRegistry;

/// Message required by operators to distinguish consistency failures from
/// business failures.
const AUDIT_FAILURE_MESSAGE: &str = "Audit log creation failed or timed out";

/// Client metadata forwarded into the audit trail.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Drives the write path: a transaction row becomes durably visible if and
/// only if a matching SUCCESS audit row was confirmed by the audit service.
pub struct TransactionSagaService {
    repository: TransactionRepository,
    registry: Arc<CorrelationRegistry>,
    publisher: Arc<dyn StreamPublisher>,
    service_name: String,
    ack_timeout: Duration,
}

impl TransactionSagaService {
    pub fn new(
        repository: TransactionRepository,
        registry: Arc<CorrelationRegistry>,
        publisher: Arc<dyn StreamPublisher>,
        service_name: String,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            registry,
            publisher,
            service_name,
            ack_timeout,
        }
    }

    pub async fn create_transaction(
        &self,
        user_id: Uuid,
        request: CreateTransactionRequest,
        ctx: RequestContext,
    ) -> Result<TransactionDto, AppError> {
        request.validate()?;

        let correlation_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            user_id,
            amount: request.amount.clone(),
            currency: request.currency.clone(),
            status: TransactionStatus::Pending.as_str().to_string(),
            description: request.description.clone(),
            metadata: request.metadata.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.begin().await?;
        let inserted = match self.repository.insert(&mut tx, &record).await {
            Ok(row) => row,
            Err(e) => {
                Self::rollback_local(tx, &correlation_id).await;
                return Err(e);
            }
        };

        let envelope = build_audit_envelope(
            AuditAction::Create,
            &inserted,
            ChangeSet {
                before: None,
                after: Some(inserted.snapshot()),
            },
            &ctx,
            &correlation_id,
            &self.service_name,
        );

        debug!(
            "Saga {} created transaction {} locally, awaiting audit confirmation",
            correlation_id, inserted.id
        );
        self.confirm_and_commit(tx, envelope, &correlation_id)
            .await?;
        info!(
            "Transaction {} committed (correlation id {})",
            inserted.id, correlation_id
        );
        Ok(inserted.into())
    }

    pub async fn update_transaction(
        &self,
        id: Uuid,
        user_id: Uuid,
        patch: UpdateTransactionRequest,
        ctx: RequestContext,
    ) -> Result<TransactionDto, AppError> {
        patch.validate()?;

        let correlation_id = Uuid::new_v4().to_string();
        let mut tx = self.begin().await?;

        // Owner mismatch and missing row collapse to NotFound; the local
        // transaction is released before any audit request goes out.
        let before = match self.repository.find_for_owner(&mut tx, &id, &user_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                Self::rollback_local(tx, &correlation_id).await;
                return Err(AppError::NotFound(format!("Transaction not found: {}", id)));
            }
            Err(e) => {
                Self::rollback_local(tx, &correlation_id).await;
                return Err(e);
            }
        };

        let target = patch.apply_to(&before);
        let updated = match self.repository.update(&mut tx, &target).await {
            Ok(row) => row,
            Err(e) => {
                Self::rollback_local(tx, &correlation_id).await;
                return Err(e);
            }
        };

        let envelope = build_audit_envelope(
            AuditAction::Update,
            &updated,
            ChangeSet {
                before: Some(before.snapshot()),
                after: Some(updated.snapshot()),
            },
            &ctx,
            &correlation_id,
            &self.service_name,
        );

        self.confirm_and_commit(tx, envelope, &correlation_id)
            .await?;
        info!(
            "Transaction {} updated (correlation id {})",
            updated.id, correlation_id
        );
        Ok(updated.into())
    }

    pub async fn delete_transaction(
        &self,
        id: Uuid,
        user_id: Uuid,
        ctx: RequestContext,
    ) -> Result<(), AppError> {
        let correlation_id = Uuid::new_v4().to_string();
        let mut tx = self.begin().await?;

        let before = match self.repository.find_for_owner(&mut tx, &id, &user_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                Self::rollback_local(tx, &correlation_id).await;
                return Err(AppError::NotFound(format!("Transaction not found: {}", id)));
            }
            Err(e) => {
                Self::rollback_local(tx, &correlation_id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.repository.delete(&mut tx, &id).await {
            Self::rollback_local(tx, &correlation_id).await;
            return Err(e);
        }

        let envelope = build_audit_envelope(
            AuditAction::Delete,
            &before,
            ChangeSet {
                before: Some(before.snapshot()),
                after: None,
            },
            &ctx,
            &correlation_id,
            &self.service_name,
        );

        self.confirm_and_commit(tx, envelope, &correlation_id)
            .await?;
        info!(
            "Transaction {} deleted (correlation id {})",
            id, correlation_id
        );
        Ok(())
    }

    /// Read path: owner-scoped get; foreign rows collapse to NotFound.
    pub async fn get_transaction(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<TransactionDto, AppError> {
        self.repository
            .get_by_id_for_owner(&id, &user_id)
            .await?
            .map(TransactionDto::from)
            .ok_or_else(|| AppError::NotFound(format!("Transaction not found: {}", id)))
    }

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: TransactionFilter,
        page: PageParams,
        sort_field: TransactionSortField,
        sort_order: SortOrder,
    ) -> Result<(Vec<TransactionDto>, i64), AppError> {
        let (rows, total) = self
            .repository
            .list_for_owner(&user_id, &filter, page, sort_field, sort_order)
            .await?;
        Ok((rows.into_iter().map(TransactionDto::from).collect(), total))
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.repository
            .pool()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))
    }

    /// Steps 5–9 of the saga: register the waiter, publish the audit request,
    /// wait out the ack budget, then commit or roll back + compensate.
    async fn confirm_and_commit(
        &self,
        tx: Transaction<'static, Postgres>,
        envelope: AuditEnvelope,
        correlation_id: &str,
    ) -> Result<(), AppError> {
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                Self::rollback_local(tx, correlation_id).await;
                return Err(AppError::Internal(format!(
                    "Failed to serialize audit envelope: {}",
                    e
                )));
            }
        };

        // Registration precedes the publish so the ack cannot race the
        // waiter's existence.
        let waiter = self.registry.register(correlation_id);

        if let Err(e) = self
            .publisher
            .publish(AUDIT_LOG_CREATE, Bytes::from(payload))
            .await
        {
            warn!(
                "Publishing audit request for saga {} failed: {}",
                correlation_id, e
            );
            self.registry.resolve(correlation_id, false);
            Self::rollback_local(tx, correlation_id).await;
            self.publish_rollback(correlation_id, "audit request publish failed")
                .await;
            return Err(AppError::DistributedTransaction(format!(
                "{}: {}",
                AUDIT_FAILURE_MESSAGE, e
            )));
        }

        if !self.registry.await_ack(waiter, self.ack_timeout).await {
            Self::rollback_local(tx, correlation_id).await;
            self.publish_rollback(correlation_id, "audit confirmation failed or timed out")
                .await;
            return Err(AppError::DistributedTransaction(
                AUDIT_FAILURE_MESSAGE.to_string(),
            ));
        }

        if let Err(e) = tx.commit().await {
            error!("Saga {} failed to commit locally: {}", correlation_id, e);
            self.publish_rollback(correlation_id, "local commit failed")
                .await;
            return Err(AppError::DistributedTransaction(format!(
                "Local commit failed after audit confirmation: {}",
                e
            )));
        }

        Ok(())
    }

    async fn rollback_local(tx: Transaction<'static, Postgres>, correlation_id: &str) {
        if let Err(e) = tx.rollback().await {
            warn!(
                "Local rollback for saga {} reported an error: {}",
                correlation_id, e
            );
        }
    }

    /// Compensation publish. A failure here leaves the remote row SUCCESS
    /// until an external reconciliation path clears it; the saga still fails.
    async fn publish_rollback(&self, correlation_id: &str, reason: &str) {
        let message = AuditRollback {
            correlation_id: correlation_id.to_string(),
            reason: reason.to_string(),
        };
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize rollback message: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .publisher
            .publish(AUDIT_LOG_ROLLBACK, Bytes::from(payload))
            .await
        {
            error!(
                "Compensation publish for saga {} failed, remote audit row may be orphaned: {}",
                correlation_id, e
            );
        }
    }
}

/// Builds the audit.log.create envelope for a saga step.
pub fn build_audit_envelope(
    action: AuditAction,
    record: &TransactionRecord,
    changes: ChangeSet,
    ctx: &RequestContext,
    correlation_id: &str,
    service_name: &str,
) -> AuditEnvelope {
    AuditEnvelope {
        action: action.as_str().to_string(),
        entity_type: "Transaction".to_string(),
        entity_id: record.id.to_string(),
        user_id: Some(record.user_id.to_string()),
        status: AuditStatus::Success.as_str().to_string(),
        metadata: Some(serde_json::json!({
            "amount": record.amount.to_string(),
            "currency": record.currency,
            "status": record.status,
        })),
        changes: Some(changes),
        ip_address: ctx.ip_address.clone(),
        user_agent: ctx.user_agent.clone(),
        correlation_id: correlation_id.to_string(),
        service_name: service_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn record() -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: BigDecimal::from_str("100.50").unwrap(),
            currency: "USD".to_string(),
            status: "PENDING".to_string(),
            description: Some("Test".to_string()),
            metadata: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn create_envelope_carries_after_snapshot_only() {
        let row = record();
        let envelope = build_audit_envelope(
            AuditAction::Create,
            &row,
            ChangeSet {
                before: None,
                after: Some(row.snapshot()),
            },
            &RequestContext::default(),
            "corr-1",
            "transaction-service",
        );

        assert_eq!(envelope.action, "CREATE");
        assert_eq!(envelope.entity_type, "Transaction");
        assert_eq!(envelope.entity_id, row.id.to_string());
        assert_eq!(envelope.status, "SUCCESS");
        assert_eq!(envelope.correlation_id, "corr-1");
        let changes = envelope.changes.unwrap();
        assert!(changes.before.is_none());
        assert_eq!(
            changes.after.unwrap()["amount"],
            serde_json::json!("100.50")
        );
    }

    #[test]
    fn update_envelope_carries_both_snapshots() {
        let before = record();
        let patch: UpdateTransactionRequest =
            serde_json::from_str(r#"{"amount": 150.75, "status": "COMPLETED"}"#).unwrap();
        let after = patch.apply_to(&before);

        let envelope = build_audit_envelope(
            AuditAction::Update,
            &after,
            ChangeSet {
                before: Some(before.snapshot()),
                after: Some(after.snapshot()),
            },
            &RequestContext {
                ip_address: Some("10.0.0.1".to_string()),
                user_agent: Some("tests".to_string()),
            },
            "corr-2",
            "transaction-service",
        );

        let changes = envelope.changes.unwrap();
        assert_eq!(
            changes.before.as_ref().unwrap()["amount"],
            serde_json::json!("100.50")
        );
        assert_eq!(
            changes.after.as_ref().unwrap()["amount"],
            serde_json::json!("150.75")
        );
        assert_eq!(
            changes.after.as_ref().unwrap()["status"],
            serde_json::json!("COMPLETED")
        );
        assert_eq!(envelope.ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn delete_envelope_carries_before_snapshot_only() {
        let row = record();
        let envelope = build_audit_envelope(
            AuditAction::Delete,
            &row,
            ChangeSet {
                before: Some(row.snapshot()),
                after: None,
            },
            &RequestContext::default(),
            "corr-3",
            "transaction-service",
        );

        assert_eq!(envelope.action, "DELETE");
        let changes = envelope.changes.unwrap();
        assert!(changes.after.is_none());
        assert_eq!(
            changes.before.unwrap()["status"],
            serde_json::json!("PENDING")
        );
    }

    #[test]
    fn envelope_metadata_summarizes_the_row() {
        let row = record();
        let envelope = build_audit_envelope(
            AuditAction::Create,
            &row,
            ChangeSet::default(),
            &RequestContext::default(),
            "corr-4",
            "transaction-service",
        );
        let metadata = envelope.metadata.unwrap();
        assert_eq!(metadata["amount"], serde_json::json!("100.50"));
        assert_eq!(metadata["currency"], serde_json::json!("USD"));
    }
}
