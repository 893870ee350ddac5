//! Book (catalog) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

/// Summary stored when a book is created without one
pub const DEFAULT_SUMMARY: &str = "No summary available.";

/// Book row from the catalog.
///
/// `stock` counts the copies currently on the shelf, `total_stock` every copy
/// the library owns. `0 <= stock <= total_stock` holds for every committed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub summary: String,
    pub cover_path: String,
    /// Stock at creation time, never adjusted afterwards
    pub initial_stock: i32,
    pub stock: i32,
    pub total_stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Copies currently out on loan
    pub fn on_loan(&self) -> i32 {
        self.total_stock - self.stock
    }

    /// Take one copy off the shelf for a borrow.
    pub fn take_copy(&mut self) -> AppResult<()> {
        if self.stock <= 0 {
            return Err(AppError::OutOfStock { book_id: self.id });
        }
        self.stock -= 1;
        Ok(())
    }

    /// Put one copy back on the shelf after a return.
    ///
    /// Returns `false` when the shelf was already full, which happens only if
    /// an administrator raised `stock` while copies were out. The stock is
    /// left at `total_stock` in that case.
    pub fn put_back_copy(&mut self) -> bool {
        if self.stock >= self.total_stock {
            return false;
        }
        self.stock += 1;
        true
    }

    /// A book can only leave the catalog once every copy is back.
    pub fn ensure_deletable(&self) -> AppResult<()> {
        if self.stock != self.total_stock {
            return Err(AppError::Conflict(format!(
                "Book {} still has {} cop{} on loan",
                self.id,
                self.on_loan(),
                if self.on_loan() == 1 { "y" } else { "ies" }
            )));
        }
        Ok(())
    }

    /// Build the row that `update` would produce, checking the stock pair
    /// against the proposed values rather than the current ones.
    pub fn apply_update(&self, update: &UpdateBook) -> AppResult<Book> {
        let stock = update.stock.unwrap_or(self.stock);
        let total_stock = update.total_stock.unwrap_or(self.total_stock);
        check_stock_range(stock, total_stock)?;

        let mut next = self.clone();
        if let Some(ref title) = update.title {
            next.title = title.clone();
        }
        if let Some(ref author) = update.author {
            next.author = author.clone();
        }
        if let Some(ref summary) = update.summary {
            next.summary = summary.clone();
        }
        if let Some(ref cover_path) = update.cover_path {
            next.cover_path = cover_path.clone();
        }
        next.stock = stock;
        next.total_stock = total_stock;
        Ok(next)
    }
}

/// Validate a (stock, total_stock) pair.
pub fn check_stock_range(stock: i32, total_stock: i32) -> AppResult<()> {
    if stock < 0 || total_stock < 0 {
        return Err(AppError::Validation(
            "Stock values must not be negative".to_string(),
        ));
    }
    if stock > total_stock {
        return Err(AppError::InvalidRange { stock, total_stock });
    }
    Ok(())
}

/// Fields of a book about to be inserted
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub summary: String,
    pub cover_path: String,
    pub initial_stock: i32,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    pub summary: Option<String>,
    pub initial_stock: i32,
}

/// Partial book update; unset fields keep their current value
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    /// Filled in by the service once a replacement cover is stored
    #[serde(skip)]
    pub cover_path: Option<String>,
    pub stock: Option<i32>,
    pub total_stock: Option<i32>,
}

/// Catalog filters, each a case-insensitive substring match
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
}

impl BookQuery {
    /// In-process equivalent of the SQL filter
    pub fn matches(&self, book: &Book) -> bool {
        fn contains(haystack: &str, needle: &Option<String>) -> bool {
            match needle.as_deref() {
                None | Some("") => true,
                Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
            }
        }

        contains(&book.title, &self.title)
            && contains(&book.author, &self.author)
            && contains(&book.summary, &self.summary)
    }
}

/// Outcome of a catalog deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// Row and cover are both gone
    Deleted,
    /// Row is gone but its cover file could not be released
    CoverRetained { cover_path: String, reason: String },
}
