use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use log::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::api_response::{ApiResponse, PaginatedData};
use crate::models::authenticated_user::AuthenticatedUser;
use crate::models::pagination::{resolve_page, SortOrder, TransactionSortField};
use crate::models::transaction::{
    CreateTransactionRequest, TransactionListQuery, UpdateTransactionRequest,
};
use crate::services::transaction_saga::{RequestContext, TransactionSagaService};

fn request_context(req: &HttpRequest) -> RequestContext {
    RequestContext {
        ip_address: req.peer_addr().map(|addr| addr.ip().to_string()),
        user_agent: req
            .headers()
            .get("user-agent")
            .and_then(|ua| ua.to_str().ok())
            .map(str::to_string),
    }
}

#[post("")]
pub async fn create_transaction(
    user: AuthenticatedUser,
    body: web::Json<CreateTransactionRequest>,
    saga: web::Data<TransactionSagaService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    debug!("Creating transaction for user {}", user.user_id);
    let dto = saga
        .create_transaction(user.user_id, body.into_inner(), request_context(&req))
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok(dto, req.path())))
}

#[get("")]
pub async fn list_transactions(
    user: AuthenticatedUser,
    query: web::Query<TransactionListQuery>,
    saga: web::Data<TransactionSagaService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let page = resolve_page(query.page, query.limit)?;
    let sort_field = TransactionSortField::parse(query.sort_by.as_deref())?;
    let sort_order = SortOrder::parse(query.sort_order.as_deref())?;
    let filter = query.into_filter()?;

    let (items, total) = saga
        .list_transactions(user.user_id, filter, page, sort_field, sort_order)
        .await?;
    let data = PaginatedData::new(items, page.page, page.limit, total);
    Ok(HttpResponse::Ok().json(ApiResponse::ok(data, req.path())))
}

#[get("/{id}")]
pub async fn get_transaction(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    saga: web::Data<TransactionSagaService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let dto = saga
        .get_transaction(path.into_inner(), user.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(dto, req.path())))
}

#[put("/{id}")]
pub async fn update_transaction(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateTransactionRequest>,
    saga: web::Data<TransactionSagaService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let dto = saga
        .update_transaction(
            path.into_inner(),
            user.user_id,
            body.into_inner(),
            request_context(&req),
        )
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(dto, req.path())))
}

#[delete("/{id}")]
pub async fn delete_transaction(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    saga: web::Data<TransactionSagaService>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    saga.delete_transaction(path.into_inner(), user.user_id, request_context(&req))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
