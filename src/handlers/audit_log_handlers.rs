use actix_web::{get, post, web, HttpRequest, HttpResponse};
use uuid::Uuid;

use crate::db::AuditLogRepository;
use crate::error::AppError;
use crate::messaging::envelopes::AuditEnvelope;
use crate::models::api_response::{ApiResponse, PaginatedData};
use crate::models::audit_log::{AuditLogDto, AuditLogListQuery};
use crate::models::pagination::{resolve_page, SortOrder};
use crate::services::audit_consumer::{new_audit_log, validate_envelope};

/// Direct write surface. The saga path goes through the stream; this endpoint
/// exists for in-boundary callers recording READ/LOGIN style events.
#[post("")]
pub async fn create_audit_log(
    body: web::Json<AuditEnvelope>,
    repository: web::Data<AuditLogRepository>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let envelope = body.into_inner();
    validate_envelope(&envelope).map_err(AppError::Validation)?;

    let (row, _already_existed) = repository.insert(&new_audit_log(&envelope)).await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(AuditLogDto::from(row), req.path())))
}

#[get("")]
pub async fn list_audit_logs(
    query: web::Query<AuditLogListQuery>,
    repository: web::Data<AuditLogRepository>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let page = resolve_page(query.page, query.limit)?;
    let sort_order = SortOrder::parse(query.sort_order.as_deref())?;
    let filter = query.into_filter()?;

    let (rows, total) = repository.list(&filter, page, sort_order).await?;
    let items: Vec<AuditLogDto> = rows.into_iter().map(AuditLogDto::from).collect();
    let data = PaginatedData::new(items, page.page, page.limit, total);
    Ok(HttpResponse::Ok().json(ApiResponse::ok(data, req.path())))
}

#[get("/correlation/{correlation_id}")]
pub async fn get_by_correlation(
    path: web::Path<String>,
    repository: web::Data<AuditLogRepository>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let rows = repository.get_by_correlation(&path.into_inner()).await?;
    let items: Vec<AuditLogDto> = rows.into_iter().map(AuditLogDto::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::ok(items, req.path())))
}

#[get("/entity/{entity_type}/{entity_id}")]
pub async fn get_by_entity(
    path: web::Path<(String, String)>,
    repository: web::Data<AuditLogRepository>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let (entity_type, entity_id) = path.into_inner();
    let rows = repository.get_by_entity(&entity_type, &entity_id).await?;
    let items: Vec<AuditLogDto> = rows.into_iter().map(AuditLogDto::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::ok(items, req.path())))
}

#[get("/{id}")]
pub async fn get_audit_log(
    path: web::Path<Uuid>,
    repository: web::Data<AuditLogRepository>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let row = repository
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Audit log not found: {}", id)))?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(AuditLogDto::from(row), req.path())))
}
