use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::pagination::{PageParams, SortOrder, TransactionSortField};
use crate::models::transaction::{TransactionFilter, TransactionRecord};

const SELECT_COLUMNS: &str =
    "id, user_id, amount, currency, status, description, metadata, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts a row inside the saga's local transaction. Visibility is
    /// deferred until the coordinator commits.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &TransactionRecord,
    ) -> Result<TransactionRecord, AppError> {
        let row = sqlx::query_as::<_, TransactionRecord>(&format!(
            r#"
            INSERT INTO transactions
                (id, user_id, amount, currency, status, description, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.amount)
        .bind(&record.currency)
        .bind(&record.status)
        .bind(&record.description)
        .bind(&record.metadata)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert transaction: {}", e)))?;

        Ok(row)
    }

    /// Fetches the pre-image inside the saga's local transaction, scoped to
    /// the owner so a foreign id behaves exactly like a missing one.
    pub async fn find_for_owner(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<TransactionRecord>, AppError> {
        let row = sqlx::query_as::<_, TransactionRecord>(&format!(
            "SELECT {} FROM transactions WHERE id = $1 AND user_id = $2",
            SELECT_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch transaction: {}", e)))?;

        Ok(row)
    }

    pub async fn update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &TransactionRecord,
    ) -> Result<TransactionRecord, AppError> {
        let row = sqlx::query_as::<_, TransactionRecord>(&format!(
            r#"
            UPDATE transactions
            SET amount = $1,
                currency = $2,
                status = $3,
                description = $4,
                metadata = $5,
                updated_at = $6
            WHERE id = $7
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(&record.amount)
        .bind(&record.currency)
        .bind(&record.status)
        .bind(&record.description)
        .bind(&record.metadata)
        .bind(record.updated_at)
        .bind(record.id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update transaction: {}", e)))?;

        Ok(row)
    }

    pub async fn delete(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: &Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM transactions WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete transaction: {}", e)))?;

        Ok(())
    }

    /// Read path: owner-scoped get. Absent and foreign rows collapse to None.
    pub async fn get_by_id_for_owner(
        &self,
        id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<TransactionRecord>, AppError> {
        let row = sqlx::query_as::<_, TransactionRecord>(&format!(
            "SELECT {} FROM transactions WHERE id = $1 AND user_id = $2",
            SELECT_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch transaction: {}", e)))?;

        Ok(row)
    }

    /// Owner-scoped filtered page plus the unpaged total for the same filter.
    pub async fn list_for_owner(
        &self,
        user_id: &Uuid,
        filter: &TransactionFilter,
        page: PageParams,
        sort_field: TransactionSortField,
        sort_order: SortOrder,
    ) -> Result<(Vec<TransactionRecord>, i64), AppError> {
        let (where_clause, binds) = Self::build_where(filter);

        let list_sql = format!(
            "SELECT {} FROM transactions WHERE user_id = $1{} ORDER BY {} {} LIMIT ${} OFFSET ${}",
            SELECT_COLUMNS,
            where_clause,
            sort_field.as_sql(),
            sort_order.as_sql(),
            binds + 2,
            binds + 3,
        );
        let count_sql = format!(
            "SELECT COUNT(*) FROM transactions WHERE user_id = $1{}",
            where_clause
        );

        let mut list_query = sqlx::query_as::<_, TransactionRecord>(&list_sql).bind(user_id);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(user_id);

        if let Some(status) = &filter.status {
            list_query = list_query.bind(status);
            count_query = count_query.bind(status);
        }
        if let Some(currency) = &filter.currency {
            list_query = list_query.bind(currency);
            count_query = count_query.bind(currency);
        }
        if let Some(min_amount) = &filter.min_amount {
            list_query = list_query.bind(min_amount);
            count_query = count_query.bind(min_amount);
        }
        if let Some(max_amount) = &filter.max_amount {
            list_query = list_query.bind(max_amount);
            count_query = count_query.bind(max_amount);
        }
        if let Some(start_date) = &filter.start_date {
            list_query = list_query.bind(start_date);
            count_query = count_query.bind(start_date);
        }
        if let Some(end_date) = &filter.end_date {
            list_query = list_query.bind(end_date);
            count_query = count_query.bind(end_date);
        }

        let rows = list_query
            .bind(page.limit_i64())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list transactions: {}", e)))?;

        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count transactions: {}", e)))?;

        Ok((rows, total))
    }

    /// Builds the filter tail of the WHERE clause. $1 is always the owner id;
    /// placeholders here continue from $2 in declaration order.
    fn build_where(filter: &TransactionFilter) -> (String, usize) {
        let mut clause = String::new();
        let mut index = 2;

        if filter.status.is_some() {
            clause.push_str(&format!(" AND status = ${}", index));
            index += 1;
        }
        if filter.currency.is_some() {
            clause.push_str(&format!(" AND currency = ${}", index));
            index += 1;
        }
        if filter.min_amount.is_some() {
            clause.push_str(&format!(" AND amount >= ${}", index));
            index += 1;
        }
        if filter.max_amount.is_some() {
            clause.push_str(&format!(" AND amount <= ${}", index));
            index += 1;
        }
        if filter.start_date.is_some() {
            clause.push_str(&format!(" AND created_at >= ${}", index));
            index += 1;
        }
        if filter.end_date.is_some() {
            clause.push_str(&format!(" AND created_at <= ${}", index));
            index += 1;
        }

        (clause, index - 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn where_clause_numbers_placeholders_in_order() {
        let filter = TransactionFilter {
            status: Some("PENDING".to_string()),
            currency: None,
            min_amount: Some(BigDecimal::from_str("1").unwrap()),
            max_amount: None,
            start_date: None,
            end_date: None,
        };
        let (clause, binds) = TransactionRepository::build_where(&filter);
        assert_eq!(clause, " AND status = $2 AND amount >= $3");
        assert_eq!(binds, 2);
    }

    #[test]
    fn empty_filter_produces_no_clause() {
        let filter = TransactionFilter {
            status: None,
            currency: None,
            min_amount: None,
            max_amount: None,
            start_date: None,
            end_date: None,
        };
        let (clause, binds) = TransactionRepository::build_where(&filter);
        assert!(clause.is_empty());
        assert_eq!(binds, 0);
    }
}
