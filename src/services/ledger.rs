//! Read-only views over the borrow ledger

use crate::{
    error::{AppError, AppResult},
    models::{BorrowRecord, RecordQuery},
    repository::Repository,
};

#[derive(Clone)]
pub struct LedgerService {
    repository: Repository,
}

impl LedgerService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// All records matching the query, newest first
    pub async fn list(&self, query: &RecordQuery) -> AppResult<Vec<BorrowRecord>> {
        self.repository.inventory.list_records(query).await
    }

    /// Records of one user; the user must exist
    pub async fn list_for_user(&self, user_id: i32, query: &RecordQuery) -> AppResult<Vec<BorrowRecord>> {
        self.repository
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound { user_id })?;

        let query = RecordQuery {
            user_id: Some(user_id),
            ..query.clone()
        };
        self.repository.inventory.list_records(&query).await
    }
}
