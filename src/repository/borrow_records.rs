//! Borrow records repository (Postgres) for ledger operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{BorrowRecord, BorrowStatus, RecordQuery},
};

const RECORD_COLUMNS: &str = "id, user_id, book_id, borrow_date, return_date, status, created_at, updated_at";

/// List ledger rows matching the query
pub async fn list(pool: &Pool<Postgres>, query: &RecordQuery) -> AppResult<Vec<BorrowRecord>> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {} FROM borrow_records WHERE 1=1", RECORD_COLUMNS));

    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(book_id) = query.book_id {
        builder.push(" AND book_id = ").push_bind(book_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
    builder.push(" ORDER BY id DESC");

    let records = builder
        .build_query_as::<BorrowRecord>()
        .fetch_all(pool)
        .await?;
    Ok(records)
}

/// Outstanding record for (user, book), read inside the caller's transaction
pub async fn find_outstanding(
    conn: &mut PgConnection,
    user_id: i32,
    book_id: i32,
) -> AppResult<Option<BorrowRecord>> {
    let record = sqlx::query_as::<_, BorrowRecord>(&format!(
        "SELECT {} FROM borrow_records WHERE user_id = $1 AND book_id = $2 AND status = $3",
        RECORD_COLUMNS
    ))
    .bind(user_id)
    .bind(book_id)
    .bind(BorrowStatus::Borrowed)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

pub async fn insert(
    conn: &mut PgConnection,
    user_id: i32,
    book_id: i32,
    borrow_date: DateTime<Utc>,
) -> AppResult<BorrowRecord> {
    sqlx::query_as::<_, BorrowRecord>(&format!(
        r#"
        INSERT INTO borrow_records (user_id, book_id, borrow_date, return_date, status)
        VALUES ($1, $2, $3, NULL, $4)
        RETURNING {}
        "#,
        RECORD_COLUMNS
    ))
    .bind(user_id)
    .bind(book_id)
    .bind(borrow_date)
    .bind(BorrowStatus::Borrowed)
    .fetch_one(conn)
    .await
    .map_err(AppError::from)
    .map_err(|e| {
        // borrow_records_one_outstanding
        if e.is_unique_violation() {
            AppError::Conflict(format!(
                "User {} already has book {} on loan",
                user_id, book_id
            ))
        } else {
            e
        }
    })
}

pub async fn mark_returned(
    conn: &mut PgConnection,
    record_id: i32,
    return_date: DateTime<Utc>,
) -> AppResult<BorrowRecord> {
    sqlx::query_as::<_, BorrowRecord>(&format!(
        r#"
        UPDATE borrow_records
        SET return_date = $2, status = $3, updated_at = NOW()
        WHERE id = $1 AND status = $4
        RETURNING {}
        "#,
        RECORD_COLUMNS
    ))
    .bind(record_id)
    .bind(return_date)
    .bind(BorrowStatus::Returned)
    .bind(BorrowStatus::Borrowed)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Outstanding borrow record {} not found", record_id)))
}
