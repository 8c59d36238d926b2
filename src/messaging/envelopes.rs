use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Before/after snapshots carried with UPDATE (both), CREATE (after only) and
/// DELETE (before only) audit requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<JsonValue>,
}

/// Payload of `audit.log.create`. Action and status travel as plain strings
/// so the consumer can reject out-of-enum values while still reading the
/// correlation id for the failure ack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEnvelope {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub correlation_id: String,
    pub service_name: String,
}

/// Payload of `audit.log.created`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditCreatedAck {
    pub correlation_id: String,
    pub audit_log_id: String,
    pub success: bool,
}

/// Payload of `audit.log.failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditFailedAck {
    pub correlation_id: String,
    pub error: String,
    pub success: bool,
}

/// Payload of `audit.log.rollback`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditRollback {
    pub correlation_id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn envelope_uses_camel_case_keys() {
        let envelope = AuditEnvelope {
            action: "CREATE".to_string(),
            entity_type: "Transaction".to_string(),
            entity_id: "abc".to_string(),
            user_id: Some("u1".to_string()),
            status: "SUCCESS".to_string(),
            metadata: None,
            changes: Some(ChangeSet {
                before: None,
                after: Some(serde_json::json!({"amount": "100.50"})),
            }),
            ip_address: Some("127.0.0.1".to_string()),
            user_agent: None,
            correlation_id: "corr-1".to_string(),
            service_name: "transaction-service".to_string(),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["entityType"], serde_json::json!("Transaction"));
        assert_eq!(value["correlationId"], serde_json::json!("corr-1"));
        assert_eq!(value["ipAddress"], serde_json::json!("127.0.0.1"));
        assert_eq!(
            value["changes"]["after"]["amount"],
            serde_json::json!("100.50")
        );
        assert!(value.get("userAgent").is_none());
    }

    #[test]
    fn acks_round_trip() {
        let ack = AuditCreatedAck {
            correlation_id: "c".to_string(),
            audit_log_id: "a".to_string(),
            success: true,
        };
        let bytes = serde_json::to_vec(&ack).unwrap();
        let parsed: AuditCreatedAck = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, ack);

        let fail = AuditFailedAck {
            correlation_id: "c".to_string(),
            error: "insert failed".to_string(),
            success: false,
        };
        let value = serde_json::to_value(&fail).unwrap();
        assert_eq!(value["success"], serde_json::json!(false));
    }

    #[test]
    fn rollback_round_trip() {
        let msg = AuditRollback {
            correlation_id: "c".to_string(),
            reason: "ack timeout".to_string(),
        };
        let parsed: AuditRollback =
            serde_json::from_slice(&serde_json::to_vec(&msg).unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }
}
