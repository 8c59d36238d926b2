use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Read,
    Login,
    Logout,
    Rollback,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Read => "READ",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::Rollback => "ROLLBACK",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            "READ" => Ok(AuditAction::Read),
            "LOGIN" => Ok(AuditAction::Login),
            "LOGOUT" => Ok(AuditAction::Logout),
            "ROLLBACK" => Ok(AuditAction::Rollback),
            other => Err(AppError::Validation(format!(
                "Unsupported audit action '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Success,
    Failed,
    RolledBack,
    Pending,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failed => "FAILED",
            AuditStatus::RolledBack => "ROLLED_BACK",
            AuditStatus::Pending => "PENDING",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "SUCCESS" => Ok(AuditStatus::Success),
            "FAILED" => Ok(AuditStatus::Failed),
            "ROLLED_BACK" => Ok(AuditStatus::RolledBack),
            "PENDING" => Ok(AuditStatus::Pending),
            other => Err(AppError::Validation(format!(
                "Unsupported audit status '{}'",
                other
            ))),
        }
    }
}

/// Audit store row. Rows are immutable except for the rollback transition.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRecord {
    pub id: Uuid,
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
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogDto {
    pub id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub correlation_id: String,
    pub service_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogRecord> for AuditLogDto {
    fn from(record: AuditLogRecord) -> Self {
        Self {
            id: record.id,
            action: record.action,
            entity_type: record.entity_type,
            entity_id: record.entity_id,
            user_id: record.user_id,
            status: record.status,
            metadata: record.metadata,
            changes: record.changes,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            correlation_id: record.correlation_id,
            service_name: record.service_name,
            created_at: record.created_at,
        }
    }
}

/// Filters for `GET /api/audit-logs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogListQuery {
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub correlation_id: Option<String>,
    pub service_name: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub correlation_id: Option<String>,
    pub service_name: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AuditLogListQuery {
    pub fn into_filter(self) -> Result<AuditLogFilter, AppError> {
        if let Some(action) = &self.action {
            AuditAction::parse(action)?;
        }
        if let Some(status) = &self.status {
            AuditStatus::parse(status)?;
        }
        Ok(AuditLogFilter {
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            user_id: self.user_id,
            status: self.status,
            correlation_id: self.correlation_id,
            service_name: self.service_name,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trip() {
        for action in [
            "CREATE", "UPDATE", "DELETE", "READ", "LOGIN", "LOGOUT", "ROLLBACK",
        ] {
            assert_eq!(AuditAction::parse(action).unwrap().as_str(), action);
        }
        assert!(AuditAction::parse("create").is_err());
    }

    #[test]
    fn status_round_trip() {
        for status in ["SUCCESS", "FAILED", "ROLLED_BACK", "PENDING"] {
            assert_eq!(AuditStatus::parse(status).unwrap().as_str(), status);
        }
        assert!(AuditStatus::parse("DONE").is_err());
    }

    #[test]
    fn list_query_rejects_unknown_action_filter() {
        let query = AuditLogListQuery {
            action: Some("ARCHIVE".to_string()),
            ..Default::default()
        };
        assert!(query.into_filter().is_err());
    }

    #[test]
    fn dto_omits_absent_optionals() {
        let dto = AuditLogDto::from(AuditLogRecord {
            id: Uuid::new_v4(),
            action: "CREATE".to_string(),
            entity_type: "Transaction".to_string(),
            entity_id: Uuid::new_v4().to_string(),
            user_id: None,
            status: "SUCCESS".to_string(),
            metadata: None,
            changes: None,
            ip_address: None,
            user_agent: None,
            correlation_id: Uuid::new_v4().to_string(),
            service_name: "transaction-service".to_string(),
            created_at: Utc::now(),
        });
        let value = serde_json::to_value(&dto).unwrap();
        assert!(value.get("userId").is_none());
        assert!(value.get("metadata").is_none());
        assert_eq!(value["serviceName"], serde_json::json!("transaction-service"));
    }
}
