//! Catalog endpoints

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Multipart;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::{book::DEFAULT_SUMMARY, Book, BookQuery, CreateBook, DeleteOutcome, UpdateBook},
    services::assets::CoverUpload,
};

use super::{ApiResponse, AuthenticatedUser};

/// Multipart form accepted by the create and update endpoints
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct BookUpload {
    /// Required on create
    title: Option<String>,
    /// Required on create
    author: Option<String>,
    /// Blank or missing falls back to the default summary on create; on
    /// update a submitted blank value resets it and an absent field keeps it
    summary: Option<String>,
    /// Required on create
    initial_stock: Option<i32>,
    /// Update only
    stock: Option<i32>,
    /// Update only
    total_stock: Option<i32>,
    #[schema(value_type = Option<String>, format = Binary)]
    cover: Option<Vec<u8>>,
}

/// Text fields and the optional cover of a book form
#[derive(Default)]
struct BookForm {
    fields: HashMap<String, String>,
    cover: Option<CoverUpload>,
}

impl BookForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = BookForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid form data: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == "cover" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Could not read cover: {}", e)))?;
                // An empty file input means no cover was picked
                if !bytes.is_empty() {
                    form.cover = Some(CoverUpload::from_filename(&file_name, bytes.to_vec())?);
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Could not read {}: {}", name, e)))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// A non-blank text field
    fn text(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn int(&self, key: &str) -> AppResult<Option<i32>> {
        match self.text(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| AppError::BadRequest(format!("{} must be an integer, got '{}'", key, raw))),
        }
    }

    fn required(&self, key: &str) -> AppResult<String> {
        self.text(key)
            .ok_or_else(|| AppError::BadRequest(format!("{} is required", key)))
    }
}

/// List books, optionally filtered by substring
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("title" = Option<String>, Query, description = "Substring of the title"),
        ("author" = Option<String>, Query, description = "Substring of the author"),
        ("summary" = Option<String>, Query, description = "Substring of the summary")
    ),
    responses(
        (status = 200, description = "Matching books, newest first", body = Vec<Book>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<ApiResponse<Vec<Book>>>> {
    let books = state.services.catalog.list_books(&query).await?;
    Ok(Json(ApiResponse::ok("OK", books)))
}

/// Get a single book
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Book>>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(ApiResponse::ok("OK", book)))
}

/// Add a book to the catalog (admin)
#[utoipa::path(
    post,
    path = "/admin/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body(content = BookUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Missing or invalid field", body = crate::error::ErrorResponse),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse),
        (status = 409, description = "Same title and author already catalogued", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<Book>>)> {
    claims.require_admin()?;

    let form = BookForm::read(multipart).await?;
    let request = CreateBook {
        title: form.required("title")?,
        author: form.required("author")?,
        summary: form.text("summary"),
        initial_stock: form
            .int("initial_stock")?
            .ok_or_else(|| AppError::BadRequest("initial_stock is required".to_string()))?,
    };

    let book = state.services.catalog.create_book(request, form.cover).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Book created", book))))
}

/// Update book fields and stock counts (admin)
#[utoipa::path(
    put,
    path = "/admin/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body(content = BookUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "stock would exceed total_stock", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Book row busy", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Book>>> {
    claims.require_admin()?;

    let form = BookForm::read(multipart).await?;
    let update = UpdateBook {
        title: form.text("title"),
        author: form.text("author"),
        summary: form
            .fields
            .contains_key("summary")
            .then(|| form.text("summary").unwrap_or_else(|| DEFAULT_SUMMARY.to_string())),
        cover_path: None,
        stock: form.int("stock")?,
        total_stock: form.int("total_stock")?,
    };

    let book = state.services.inventory.update_book(id, update, form.cover).await?;
    Ok(Json(ApiResponse::ok("Book updated", book)))
}

/// Remove a book once every copy is back (admin)
#[utoipa::path(
    delete,
    path = "/admin/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book deleted; `cover_retained` when its cover could not be removed", body = DeleteOutcome),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Copies still on loan", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<DeleteOutcome>>> {
    claims.require_admin()?;

    let outcome = state.services.inventory.delete_book(id).await?;
    let msg = match outcome {
        DeleteOutcome::Deleted => "Book deleted",
        DeleteOutcome::CoverRetained { .. } => "Book deleted, cover could not be removed",
    };
    Ok(Json(ApiResponse::ok(msg, outcome)))
}
