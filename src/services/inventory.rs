//! Inventory transaction manager.
//!
//! Every stock-changing operation runs as one store transaction: lock the
//! book row, check the invariants against the locked row, write, commit.
//! Any early return drops the transaction handle, which rolls it back, so a
//! rejected or cancelled operation never leaves partial writes behind.
//!
//! Cover files live outside the transaction. They are written before it
//! starts and released after it commits; a failed release is reported to the
//! caller instead of undoing the commit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::assets::{AssetStore, CoverUpload};
use crate::{
    error::{AppError, AppResult},
    models::{Book, BorrowRecord, DeleteOutcome, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct InventoryManager {
    repository: Repository,
    assets: Arc<dyn AssetStore>,
    max_retries: u32,
}

fn book_not_found(id: i32) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

impl InventoryManager {
    pub fn new(repository: Repository, assets: Arc<dyn AssetStore>, max_retries: u32) -> Self {
        Self {
            repository,
            assets,
            max_retries,
        }
    }

    /// Lend one copy of a book to a user
    pub async fn borrow(&self, book_id: i32, user_id: i32) -> AppResult<BorrowRecord> {
        let record = self
            .with_retry("borrow", book_id, || self.try_borrow(book_id, user_id))
            .await
            .map_err(|e| {
                tracing::debug!("Borrow of book {} by user {} rejected: {}", book_id, user_id, e);
                e
            })?;

        tracing::info!(
            "User {} borrowed book {} (record {})",
            user_id,
            book_id,
            record.id
        );
        Ok(record)
    }

    /// Take back the copy a user has outstanding
    pub async fn return_book(&self, book_id: i32, user_id: i32) -> AppResult<BorrowRecord> {
        let record = self
            .with_retry("return", book_id, || self.try_return(book_id, user_id))
            .await
            .map_err(|e| {
                tracing::debug!("Return of book {} by user {} rejected: {}", book_id, user_id, e);
                e
            })?;

        tracing::info!(
            "User {} returned book {} (record {})",
            user_id,
            book_id,
            record.id
        );
        Ok(record)
    }

    /// Apply a partial update, optionally replacing the cover.
    ///
    /// The stock pair is checked against the locked row with the proposed
    /// values substituted, so `stock` and `total_stock` can move together.
    pub async fn update_book(
        &self,
        book_id: i32,
        mut update: UpdateBook,
        cover: Option<CoverUpload>,
    ) -> AppResult<Book> {
        for (field, value) in [("title", &update.title), ("author", &update.author)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(AppError::Validation(format!("{} must not be empty", field)));
            }
        }

        let new_cover = match cover {
            Some(upload) => Some(self.assets.save(&upload).await?),
            None => None,
        };
        update.cover_path = new_cover.clone();

        let result = self
            .with_retry("update", book_id, || self.try_update(book_id, &update))
            .await;

        let (book, previous_cover) = match result {
            Ok(updated) => updated,
            Err(e) => {
                tracing::debug!("Update of book {} rejected: {}", book_id, e);
                if let Some(ref path) = new_cover {
                    if let Err(cleanup) = self.assets.delete(path).await {
                        tracing::warn!("Could not remove unused cover {}: {}", path, cleanup);
                    }
                }
                return Err(e);
            }
        };

        if let Some(ref path) = new_cover {
            if previous_cover != *path {
                if let Err(e) = self.assets.delete(&previous_cover).await {
                    tracing::warn!(
                        "Book {} updated but old cover {} was kept: {}",
                        book_id,
                        previous_cover,
                        e
                    );
                }
            }
        }

        tracing::info!("Updated book {}", book_id);
        Ok(book)
    }

    /// Remove a book once every copy is back on the shelf
    pub async fn delete_book(&self, book_id: i32) -> AppResult<DeleteOutcome> {
        let cover_path = self
            .with_retry("delete", book_id, || self.try_delete(book_id))
            .await
            .map_err(|e| {
                tracing::debug!("Delete of book {} rejected: {}", book_id, e);
                e
            })?;

        tracing::info!("Deleted book {}", book_id);

        match self.assets.delete(&cover_path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) => {
                tracing::warn!(
                    "Book {} deleted but cover {} was kept: {}",
                    book_id,
                    cover_path,
                    e
                );
                Ok(DeleteOutcome::CoverRetained {
                    cover_path,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn try_borrow(&self, book_id: i32, user_id: i32) -> AppResult<BorrowRecord> {
        let mut tx = self.repository.inventory.begin().await?;

        let mut book = tx
            .lock_book_for_update(book_id)
            .await?
            .ok_or_else(|| book_not_found(book_id))?;

        book.take_copy()?;

        if tx.find_outstanding(user_id, book_id).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "User {} already has book {} on loan",
                user_id, book_id
            )));
        }

        tx.save_book(&book).await?;
        let record = tx.insert_record(user_id, book_id, Utc::now()).await?;
        tx.commit().await?;

        Ok(record)
    }

    async fn try_return(&self, book_id: i32, user_id: i32) -> AppResult<BorrowRecord> {
        let mut tx = self.repository.inventory.begin().await?;

        let mut book = tx
            .lock_book_for_update(book_id)
            .await?
            .ok_or_else(|| book_not_found(book_id))?;

        let outstanding = tx
            .find_outstanding(user_id, book_id)
            .await?
            .ok_or(AppError::RecordNotFound { user_id, book_id })?;

        if !book.put_back_copy() {
            tracing::warn!(
                "Book {} already has {} of {} copies on the shelf; closing record {} without restocking",
                book_id,
                book.stock,
                book.total_stock,
                outstanding.id
            );
        }

        tx.save_book(&book).await?;
        let record = tx.mark_returned(outstanding.id, Utc::now()).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Returns the committed row and the cover path it had before the update.
    async fn try_update(&self, book_id: i32, update: &UpdateBook) -> AppResult<(Book, String)> {
        let mut tx = self.repository.inventory.begin().await?;

        let book = tx
            .lock_book_for_update(book_id)
            .await?
            .ok_or_else(|| book_not_found(book_id))?;

        let next = book.apply_update(update)?;
        let saved = tx.save_book(&next).await?;
        tx.commit().await?;

        Ok((saved, book.cover_path))
    }

    /// Returns the cover path of the deleted row.
    async fn try_delete(&self, book_id: i32) -> AppResult<String> {
        let mut tx = self.repository.inventory.begin().await?;

        let book = tx
            .lock_book_for_update(book_id)
            .await?
            .ok_or_else(|| book_not_found(book_id))?;

        book.ensure_deletable()?;
        tx.delete_book(book_id).await?;
        tx.commit().await?;

        Ok(book.cover_path)
    }

    /// Replay a whole transaction when the store reports a deadlock or a
    /// serialization failure; surface lock timeouts as conflicts.
    async fn with_retry<T, F, Fut>(&self, op: &str, book_id: i32, mut attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    tracing::debug!(
                        "{} on book {} hit {}; retry {}/{}",
                        op,
                        book_id,
                        e,
                        retries,
                        self.max_retries
                    );
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(retries))).await;
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("{} on book {} gave up after {} retries: {}", op, book_id, retries, e);
                    return Err(AppError::Conflict(format!(
                        "Book {} is busy, try again",
                        book_id
                    )));
                }
                Err(e) if e.is_lock_timeout() => {
                    return Err(AppError::Conflict(format!(
                        "Timed out waiting for the lock on book {}",
                        book_id
                    )));
                }
                other => return other,
            }
        }
    }
}
