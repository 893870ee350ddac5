//! Catalog service: book creation and lookup

use std::sync::Arc;

use super::assets::{AssetStore, CoverUpload};
use crate::{
    error::{AppError, AppResult},
    models::{book::DEFAULT_SUMMARY, Book, BookQuery, CreateBook, NewBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    assets: Arc<dyn AssetStore>,
    default_cover: String,
}

impl CatalogService {
    pub fn new(repository: Repository, assets: Arc<dyn AssetStore>, default_cover: String) -> Self {
        Self {
            repository,
            assets,
            default_cover,
        }
    }

    /// List books matching the query, newest first
    pub async fn list_books(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        self.repository.inventory.list_books(query).await
    }

    /// Get book by ID
    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository
            .inventory
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Add a book to the catalog with every copy on the shelf
    pub async fn create_book(&self, book: CreateBook, cover: Option<CoverUpload>) -> AppResult<Book> {
        let title = book.title.trim();
        let author = book.author.trim();
        if title.is_empty() || author.is_empty() {
            return Err(AppError::Validation("Title and author are required".to_string()));
        }
        if book.initial_stock < 0 {
            return Err(AppError::Validation(
                "Initial stock must not be negative".to_string(),
            ));
        }

        if self.repository.inventory.find_book(title, author).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "A book titled '{}' by {} already exists",
                title, author
            )));
        }

        let uploaded = match cover {
            Some(ref upload) => Some(self.assets.save(upload).await?),
            None => None,
        };

        let summary = book
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SUMMARY);

        let new_book = NewBook {
            title: title.to_string(),
            author: author.to_string(),
            summary: summary.to_string(),
            cover_path: uploaded.clone().unwrap_or_else(|| self.default_cover.clone()),
            initial_stock: book.initial_stock,
        };

        match self.repository.inventory.create_book(&new_book).await {
            Ok(created) => {
                tracing::info!("Created book {} '{}' with {} copies", created.id, created.title, created.total_stock);
                Ok(created)
            }
            Err(e) => {
                if let Some(ref path) = uploaded {
                    if let Err(cleanup) = self.assets.delete(path).await {
                        tracing::warn!("Could not remove cover {} after failed insert: {}", path, cleanup);
                    }
                }
                Err(e)
            }
        }
    }
}
