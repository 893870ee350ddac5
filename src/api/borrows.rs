//! Lending endpoints and ledger views

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{BorrowRecord, RecordQuery},
};

use super::{ApiResponse, AuthenticatedUser};

/// Book selected for a borrow or a return
#[derive(Debug, Deserialize, ToSchema)]
pub struct BookIdRequest {
    /// Book ID
    pub id: i32,
}

/// Borrow one copy of a book
#[utoipa::path(
    post,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = BookIdRequest,
    responses(
        (status = 201, description = "Copy lent; envelope data is the new record", body = BorrowRecord),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Out of stock, already borrowed, or book row busy", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<BookIdRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<BorrowRecord>>)> {
    let record = state
        .services
        .inventory
        .borrow(request.id, claims.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Book borrowed", record))))
}

/// Return a borrowed copy
#[utoipa::path(
    post,
    path = "/borrows/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = BookIdRequest,
    responses(
        (status = 200, description = "Copy returned; envelope data is the closed record", body = BorrowRecord),
        (status = 404, description = "Book not found or no outstanding borrow", body = crate::error::ErrorResponse),
        (status = 409, description = "Book row busy", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<BookIdRequest>,
) -> AppResult<Json<ApiResponse<BorrowRecord>>> {
    let record = state
        .services
        .inventory
        .return_book(request.id, claims.user_id)
        .await?;
    Ok(Json(ApiResponse::ok("Book returned", record)))
}

/// Borrow history of the caller
#[utoipa::path(
    get,
    path = "/records",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = Option<i32>, Query, description = "Only records of this book"),
        ("status" = Option<String>, Query, description = "borrowed or returned")
    ),
    responses(
        (status = 200, description = "The caller's records, newest first", body = Vec<BorrowRecord>)
    )
)]
pub async fn my_records(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<RecordQuery>,
) -> AppResult<Json<ApiResponse<Vec<BorrowRecord>>>> {
    let records = state
        .services
        .ledger
        .list_for_user(claims.user_id, &query)
        .await?;
    Ok(Json(ApiResponse::ok("OK", records)))
}

/// Every borrow record (admin)
#[utoipa::path(
    get,
    path = "/admin/records",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = Option<i32>, Query, description = "Only records of this user"),
        ("book_id" = Option<i32>, Query, description = "Only records of this book"),
        ("status" = Option<String>, Query, description = "borrowed or returned")
    ),
    responses(
        (status = 200, description = "Records, newest first", body = Vec<BorrowRecord>),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse)
    )
)]
pub async fn all_records(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<RecordQuery>,
) -> AppResult<Json<ApiResponse<Vec<BorrowRecord>>>> {
    claims.require_admin()?;

    let records = state.services.ledger.list(&query).await?;
    Ok(Json(ApiResponse::ok("OK", records)))
}

/// Borrow history of one user (admin)
#[utoipa::path(
    get,
    path = "/admin/users/{id}/records",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        ("book_id" = Option<i32>, Query, description = "Only records of this book"),
        ("status" = Option<String>, Query, description = "borrowed or returned")
    ),
    responses(
        (status = 200, description = "The user's records, newest first", body = Vec<BorrowRecord>),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn user_records(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<RecordQuery>,
) -> AppResult<Json<ApiResponse<Vec<BorrowRecord>>>> {
    claims.require_admin()?;

    let records = state.services.ledger.list_for_user(user_id, &query).await?;
    Ok(Json(ApiResponse::ok("OK", records)))
}
