use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit_log::{AuditLogFilter, AuditLogRecord};
use crate::models::pagination::{PageParams, SortOrder};

const SELECT_COLUMNS: &str = "id, action, entity_type, entity_id, user_id, status, metadata, \
     changes, ip_address, user_agent, correlation_id, service_name, created_at";

const PG_UNIQUE_VIOLATION: &str = "23505";

/// Insert payload, already validated by the consumer.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub user_id: Option<String>,
    pub status: String,
    pub metadata: Option<JsonValue>,
    pub changes: Option<JsonValue>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub correlation_id: String,
    pub service_name: String,
}

#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts an audit row. At-least-once delivery means the same envelope
    /// can arrive twice; the unique index on (correlation_id, action,
    /// entity_id) turns the duplicate into a fetch of the original row so the
    /// consumer can re-publish the same ack. The bool is true when the row
    /// already existed.
    pub async fn insert(&self, new: &NewAuditLog) -> Result<(AuditLogRecord, bool), AppError> {
        let insert_result = sqlx::query_as::<_, AuditLogRecord>(&format!(
            r#"
            INSERT INTO audit_logs
                (id, action, entity_type, entity_id, user_id, status, metadata, changes,
                 ip_address, user_agent, correlation_id, service_name, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new.action)
        .bind(&new.entity_type)
        .bind(&new.entity_id)
        .bind(&new.user_id)
        .bind(&new.status)
        .bind(&new.metadata)
        .bind(&new.changes)
        .bind(&new.ip_address)
        .bind(&new.user_agent)
        .bind(&new.correlation_id)
        .bind(&new.service_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match insert_result {
            Ok(row) => Ok((row, false)),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION) =>
            {
                let existing = self
                    .find_duplicate(&new.correlation_id, &new.action, &new.entity_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Database(
                            "Duplicate audit insert reported but original row missing".to_string(),
                        )
                    })?;
                Ok((existing, true))
            }
            Err(e) => Err(AppError::Database(format!(
                "Failed to insert audit log: {}",
                e
            ))),
        }
    }

    async fn find_duplicate(
        &self,
        correlation_id: &str,
        action: &str,
        entity_id: &str,
    ) -> Result<Option<AuditLogRecord>, AppError> {
        let row = sqlx::query_as::<_, AuditLogRecord>(&format!(
            "SELECT {} FROM audit_logs WHERE correlation_id = $1 AND action = $2 AND entity_id = $3",
            SELECT_COLUMNS
        ))
        .bind(correlation_id)
        .bind(action)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch audit log: {}", e)))?;

        Ok(row)
    }

    /// Compensation: transitions every row sharing the correlation id to
    /// ROLLED_BACK. Idempotent; already rolled-back rows are untouched.
    pub async fn mark_rolled_back(&self, correlation_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE audit_logs SET status = 'ROLLED_BACK' \
             WHERE correlation_id = $1 AND status <> 'ROLLED_BACK'",
        )
        .bind(correlation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to mark audit logs rolled back: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<AuditLogRecord>, AppError> {
        let row = sqlx::query_as::<_, AuditLogRecord>(&format!(
            "SELECT {} FROM audit_logs WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch audit log: {}", e)))?;

        Ok(row)
    }

    /// Full saga trail for one correlation id, oldest first.
    pub async fn get_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<AuditLogRecord>, AppError> {
        let rows = sqlx::query_as::<_, AuditLogRecord>(&format!(
            "SELECT {} FROM audit_logs WHERE correlation_id = $1 ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch audit logs: {}", e)))?;

        Ok(rows)
    }

    /// Per-entity history, newest first.
    pub async fn get_by_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditLogRecord>, AppError> {
        let rows = sqlx::query_as::<_, AuditLogRecord>(&format!(
            "SELECT {} FROM audit_logs WHERE entity_type = $1 AND entity_id = $2 \
             ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch audit logs by entity: {}", e)))?;

        Ok(rows)
    }

    pub async fn list(
        &self,
        filter: &AuditLogFilter,
        page: PageParams,
        sort_order: SortOrder,
    ) -> Result<(Vec<AuditLogRecord>, i64), AppError> {
        let (where_clause, binds) = Self::build_where(filter);

        let list_sql = format!(
            "SELECT {} FROM audit_logs WHERE 1=1{} ORDER BY created_at {} LIMIT ${} OFFSET ${}",
            SELECT_COLUMNS,
            where_clause,
            sort_order.as_sql(),
            binds + 1,
            binds + 2,
        );
        let count_sql = format!("SELECT COUNT(*) FROM audit_logs WHERE 1=1{}", where_clause);

        let mut list_query = sqlx::query_as::<_, AuditLogRecord>(&list_sql);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);

        macro_rules! bind_filter {
            ($field:expr) => {
                if let Some(value) = $field {
                    list_query = list_query.bind(value);
                    count_query = count_query.bind(value);
                }
            };
        }

        bind_filter!(&filter.action);
        bind_filter!(&filter.entity_type);
        bind_filter!(&filter.entity_id);
        bind_filter!(&filter.user_id);
        bind_filter!(&filter.status);
        bind_filter!(&filter.correlation_id);
        bind_filter!(&filter.service_name);
        bind_filter!(&filter.start_date);
        bind_filter!(&filter.end_date);

        let rows = list_query
            .bind(page.limit_i64())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list audit logs: {}", e)))?;

        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count audit logs: {}", e)))?;

        Ok((rows, total))
    }

    fn build_where(filter: &AuditLogFilter) -> (String, usize) {
        let mut clause = String::new();
        let mut index = 1;

        let mut add = |present: bool, expr: &str, clause: &mut String| {
            if present {
                clause.push_str(&format!(" AND {} ${}", expr, index));
                index += 1;
            }
        };

        add(filter.action.is_some(), "action =", &mut clause);
        add(filter.entity_type.is_some(), "entity_type =", &mut clause);
        add(filter.entity_id.is_some(), "entity_id =", &mut clause);
        add(filter.user_id.is_some(), "user_id =", &mut clause);
        add(filter.status.is_some(), "status =", &mut clause);
        add(
            filter.correlation_id.is_some(),
            "correlation_id =",
            &mut clause,
        );
        add(filter.service_name.is_some(), "service_name =", &mut clause);
        add(filter.start_date.is_some(), "created_at >=", &mut clause);
        add(filter.end_date.is_some(), "created_at <=", &mut clause);

        (clause, index - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_covers_all_filters_in_order() {
        let filter = AuditLogFilter {
            action: Some("CREATE".to_string()),
            entity_type: Some("Transaction".to_string()),
            entity_id: None,
            user_id: None,
            status: Some("SUCCESS".to_string()),
            correlation_id: Some("corr".to_string()),
            service_name: None,
            start_date: None,
            end_date: None,
        };
        let (clause, binds) = AuditLogRepository::build_where(&filter);
        assert_eq!(
            clause,
            " AND action = $1 AND entity_type = $2 AND status = $3 AND correlation_id = $4"
        );
        assert_eq!(binds, 4);
    }

    #[test]
    fn empty_filter_produces_no_clause() {
        let (clause, binds) = AuditLogRepository::build_where(&AuditLogFilter::default());
        assert!(clause.is_empty());
        assert_eq!(binds, 0);
    }
}
