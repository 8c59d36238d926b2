use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Maximum digits before the decimal point for a NUMERIC(15,2) amount.
const MAX_INTEGER_DIGITS: i64 = 13;
const MAX_FRACTIONAL_DIGITS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
    Cad,
    Aud,
    Chf,
    Cny,
}

impl Currency {
    pub const ALL: [Currency; 8] = [
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Jpy,
        Currency::Cad,
        Currency::Aud,
        Currency::Chf,
        Currency::Cny,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Chf => "CHF",
            Currency::Cny => "CNY",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        Currency::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == raw)
            .ok_or_else(|| AppError::Validation(format!("Unsupported currency '{}'", raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Processing,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Processing => "PROCESSING",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            "PROCESSING" => Ok(TransactionStatus::Processing),
            other => Err(AppError::Validation(format!(
                "Unsupported transaction status '{}'",
                other
            ))),
        }
    }
}

/// Database row. Currency and status are stored as their wire strings; the
/// enums above guard the boundary.
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub description: Option<String>,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Field snapshot stored in audit `changes`. Amounts serialize as exact
    /// decimal strings.
    pub fn snapshot(&self) -> JsonValue {
        serde_json::json!({
            "amount": self.amount.to_string(),
            "currency": self.currency,
            "status": self.status,
            "description": self.description,
            "metadata": self.metadata,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: String,
    pub currency: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionDto {
    fn from(record: TransactionRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            amount: record.amount.to_string(),
            currency: record.currency,
            status: record.status,
            description: record.description,
            metadata: record.metadata,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Accepts JSON numbers or strings; either way the value is parsed from its
/// decimal literal so nothing goes through a lossy float.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(serde_json::Number),
        Text(String),
    }

    let literal = match RawAmount::deserialize(deserializer)? {
        RawAmount::Number(n) => n.to_string(),
        RawAmount::Text(s) => s,
    };
    BigDecimal::from_str(literal.trim()).map_err(serde::de::Error::custom)
}

fn deserialize_amount_opt<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(serde_json::Number),
        Text(String),
    }

    let raw: Option<RawAmount> = Option::deserialize(deserializer)?;
    raw.map(|value| {
        let literal = match value {
            RawAmount::Number(n) => n.to_string(),
            RawAmount::Text(s) => s,
        };
        BigDecimal::from_str(literal.trim()).map_err(serde::de::Error::custom)
    })
    .transpose()
}

pub fn validate_amount(amount: &BigDecimal) -> Result<(), AppError> {
    if *amount <= BigDecimal::from(0) {
        return Err(AppError::Validation(
            "amount must be greater than zero".to_string(),
        ));
    }
    let normalized = amount.normalized();
    let fractional = normalized.fractional_digit_count().max(0);
    if fractional > MAX_FRACTIONAL_DIGITS {
        return Err(AppError::Validation(
            "amount supports at most 2 decimal places".to_string(),
        ));
    }
    if normalized.digits() as i64 - fractional > MAX_INTEGER_DIGITS {
        return Err(AppError::Validation(
            "amount exceeds the supported precision".to_string(),
        ));
    }
    Ok(())
}

fn validate_metadata(metadata: &Option<JsonValue>) -> Result<(), AppError> {
    if let Some(value) = metadata {
        if !value.is_object() {
            return Err(AppError::Validation(
                "metadata must be a JSON object".to_string(),
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: BigDecimal,
    pub currency: String,
    pub description: Option<String>,
    pub metadata: Option<JsonValue>,
}

impl CreateTransactionRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_amount(&self.amount)?;
        Currency::parse(&self.currency)?;
        validate_metadata(&self.metadata)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransactionRequest {
    #[serde(default, deserialize_with = "deserialize_amount_opt")]
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<JsonValue>,
}

impl UpdateTransactionRequest {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.currency.is_none()
            && self.status.is_none()
            && self.description.is_none()
            && self.metadata.is_none()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.is_empty() {
            return Err(AppError::Validation(
                "update must contain at least one field".to_string(),
            ));
        }
        if let Some(amount) = &self.amount {
            validate_amount(amount)?;
        }
        if let Some(currency) = &self.currency {
            Currency::parse(currency)?;
        }
        if let Some(status) = &self.status {
            TransactionStatus::parse(status)?;
        }
        validate_metadata(&self.metadata)?;
        Ok(())
    }

    /// Applies the patch to a fetched row, returning the post-image used for
    /// the UPDATE statement and the audit `after` snapshot.
    pub fn apply_to(&self, record: &TransactionRecord) -> TransactionRecord {
        let mut updated = record.clone();
        if let Some(amount) = &self.amount {
            updated.amount = amount.clone();
        }
        if let Some(currency) = &self.currency {
            updated.currency = currency.clone();
        }
        if let Some(status) = &self.status {
            updated.status = status.clone();
        }
        if let Some(description) = &self.description {
            updated.description = Some(description.clone());
        }
        if let Some(metadata) = &self.metadata {
            updated.metadata = Some(metadata.clone());
        }
        updated.updated_at = Utc::now();
        updated
    }
}

/// Owner-scoped list filters for `GET /api/transactions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListQuery {
    pub status: Option<String>,
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "deserialize_amount_opt")]
    pub min_amount: Option<BigDecimal>,
    #[serde(default, deserialize_with = "deserialize_amount_opt")]
    pub max_amount: Option<BigDecimal>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub status: Option<String>,
    pub currency: Option<String>,
    pub min_amount: Option<BigDecimal>,
    pub max_amount: Option<BigDecimal>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl TransactionListQuery {
    pub fn into_filter(self) -> Result<TransactionFilter, AppError> {
        if let Some(status) = &self.status {
            TransactionStatus::parse(status)?;
        }
        if let Some(currency) = &self.currency {
            Currency::parse(currency)?;
        }
        Ok(TransactionFilter {
            status: self.status,
            currency: self.currency,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

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
    fn create_request_accepts_json_number_amount() {
        let req: CreateTransactionRequest =
            serde_json::from_str(r#"{"amount": 100.50, "currency": "USD"}"#).unwrap();
        assert_eq!(req.amount, BigDecimal::from_str("100.50").unwrap());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn create_request_accepts_string_amount() {
        let req: CreateTransactionRequest =
            serde_json::from_str(r#"{"amount": "42.07", "currency": "EUR"}"#).unwrap();
        assert_eq!(req.amount.to_string(), "42.07");
    }

    #[test]
    fn negative_amount_is_rejected() {
        let req: CreateTransactionRequest =
            serde_json::from_str(r#"{"amount": -100, "currency": "USD"}"#).unwrap();
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn zero_amount_is_rejected() {
        assert!(validate_amount(&BigDecimal::from(0)).is_err());
    }

    #[test]
    fn three_decimal_places_are_rejected() {
        assert!(validate_amount(&BigDecimal::from_str("10.123").unwrap()).is_err());
    }

    #[test]
    fn trailing_zero_scale_is_tolerated() {
        assert!(validate_amount(&BigDecimal::from_str("10.1200").unwrap()).is_ok());
    }

    #[test]
    fn fourteen_integer_digits_are_rejected() {
        assert!(validate_amount(&BigDecimal::from_str("12345678901234.00").unwrap()).is_err());
        assert!(validate_amount(&BigDecimal::from_str("1234567890123.99").unwrap()).is_ok());
    }

    #[test]
    fn unknown_currency_is_rejected() {
        let req: CreateTransactionRequest =
            serde_json::from_str(r#"{"amount": 5, "currency": "BTC"}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn empty_update_is_rejected() {
        let patch = UpdateTransactionRequest::default();
        assert!(matches!(patch.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn update_applies_only_provided_fields() {
        let base = record();
        let patch: UpdateTransactionRequest =
            serde_json::from_str(r#"{"amount": 150.75, "status": "COMPLETED"}"#).unwrap();
        patch.validate().unwrap();
        let updated = patch.apply_to(&base);
        assert_eq!(updated.amount.to_string(), "150.75");
        assert_eq!(updated.status, "COMPLETED");
        assert_eq!(updated.currency, base.currency);
        assert_eq!(updated.description, base.description);
    }

    #[test]
    fn snapshot_serializes_amount_as_string() {
        let snap = record().snapshot();
        assert_eq!(snap["amount"], serde_json::json!("100.50"));
        assert_eq!(snap["status"], serde_json::json!("PENDING"));
    }

    #[test]
    fn dto_preserves_decimal_precision() {
        let dto = TransactionDto::from(record());
        assert_eq!(dto.amount, "100.50");
    }

    #[test]
    fn status_round_trip() {
        for status in ["PENDING", "COMPLETED", "FAILED", "CANCELLED", "PROCESSING"] {
            assert_eq!(TransactionStatus::parse(status).unwrap().as_str(), status);
        }
        assert!(TransactionStatus::parse("SHIPPED").is_err());
    }

    proptest! {
        #[test]
        fn two_decimal_amounts_survive_the_wire(cents in 1i64..=999_999_999) {
            let literal = format!("{}.{:02}", cents / 100, cents % 100);
            let body = format!(r#"{{"amount": {}, "currency": "USD"}}"#, literal);
            let req: CreateTransactionRequest = serde_json::from_str(&body).unwrap();
            prop_assert!(req.validate().is_ok());
            prop_assert_eq!(req.amount.normalized(), BigDecimal::from_str(&literal).unwrap().normalized());
        }
    }
}
