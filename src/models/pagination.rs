use crate::error::AppError;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: u32,
    pub limit: u32,
}

impl PageParams {
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }

    pub fn limit_i64(&self) -> i64 {
        self.limit as i64
    }
}

/// Clamp-free validation: out-of-range paging is a client error, not a
/// silently adjusted value.
pub fn resolve_page(page: Option<u32>, limit: Option<u32>) -> Result<PageParams, AppError> {
    let page = page.unwrap_or(1);
    if page < 1 {
        return Err(AppError::Validation("page must be >= 1".to_string()));
    }
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if limit < 1 || limit > MAX_PAGE_LIMIT {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_LIMIT
        )));
    }
    Ok(PageParams { page, limit })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw {
            None => Ok(SortOrder::Desc),
            Some(s) if s.eq_ignore_ascii_case("asc") => Ok(SortOrder::Asc),
            Some(s) if s.eq_ignore_ascii_case("desc") => Ok(SortOrder::Desc),
            Some(other) => Err(AppError::Validation(format!(
                "sortOrder must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

/// Sortable columns for the transaction list. The SQL name comes from this
/// whitelist, never from client input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionSortField {
    CreatedAt,
    UpdatedAt,
    Amount,
}

impl TransactionSortField {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TransactionSortField::CreatedAt => "created_at",
            TransactionSortField::UpdatedAt => "updated_at",
            TransactionSortField::Amount => "amount",
        }
    }

    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw {
            None => Ok(TransactionSortField::CreatedAt),
            Some("createdAt") => Ok(TransactionSortField::CreatedAt),
            Some("updatedAt") => Ok(TransactionSortField::UpdatedAt),
            Some("amount") => Ok(TransactionSortField::Amount),
            Some(other) => Err(AppError::Validation(format!(
                "sortBy must be one of createdAt, updatedAt, amount, got '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_are_page_one_limit_ten() {
        let params = resolve_page(None, None).unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn page_zero_is_rejected() {
        assert!(resolve_page(Some(0), None).is_err());
    }

    #[test]
    fn limit_above_max_is_rejected() {
        assert!(resolve_page(None, Some(101)).is_err());
    }

    #[test]
    fn offset_accounts_for_page() {
        let params = resolve_page(Some(3), Some(25)).unwrap();
        assert_eq!(params.offset(), 50);
    }

    #[test]
    fn sort_field_whitelist() {
        assert_eq!(
            TransactionSortField::parse(Some("amount")).unwrap().as_sql(),
            "amount"
        );
        assert!(TransactionSortField::parse(Some("amount; DROP TABLE")).is_err());
    }

    #[test]
    fn sort_order_defaults_to_desc() {
        assert_eq!(SortOrder::parse(None).unwrap(), SortOrder::Desc);
        assert_eq!(SortOrder::parse(Some("ASC")).unwrap(), SortOrder::Asc);
        assert!(SortOrder::parse(Some("sideways")).is_err());
    }

    proptest! {
        #[test]
        fn accepted_pages_always_produce_nonnegative_offsets(
            page in 1u32..10_000,
            limit in 1u32..=MAX_PAGE_LIMIT,
        ) {
            let params = resolve_page(Some(page), Some(limit)).unwrap();
            prop_assert!(params.offset() >= 0);
            prop_assert_eq!(params.limit_i64(), limit as i64);
        }
    }
}
