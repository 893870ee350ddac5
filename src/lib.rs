//! Shelfkeeper Library Inventory Server
//!
//! A REST JSON API over a book catalog and a borrow ledger. Borrows,
//! returns, stock updates and deletions run as row-locked transactions so
//! that `0 <= stock <= total_stock` holds under concurrent traffic.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
