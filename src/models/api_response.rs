use chrono::{DateTime, Utc};
use serde::Serialize;

/// Success wrapper for every JSON response leaving either service. Error
/// responses are produced by `error::render_error_envelope` with the same
/// outer shape.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub path: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, path: &str) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedData<T: Serialize> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl<T: Serialize> PaginatedData<T> {
    pub fn new(items: Vec<T>, page: u32, limit: u32, total: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + limit as i64 - 1) / limit as i64
        };
        Self {
            items,
            page,
            limit,
            total,
            total_pages,
        }
    }
}
