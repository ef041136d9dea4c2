//! Process-wide service bootstrap.
//!
//! [`App::start`] opens the database pool and applies migrations before the
//! service is reachable; [`App::shutdown`] releases the pool.

use crate::config::AppConfig;
use crate::db::{self, DbError};
use crate::services::ReviewService;
use crate::store::SqliteStore;

/// A started service instance owning the database pool.
pub struct App {
    service: ReviewService<SqliteStore>,
}

impl App {
    /// Initialize the database and build the service.
    pub async fn start(config: AppConfig) -> Result<Self, DbError> {
        let pool = db::initialize(&config).await?;
        let service = ReviewService::new(SqliteStore::new(pool));

        log::info!("Review service started");
        Ok(Self { service })
    }

    /// The review service; cheap to clone for concurrent callers.
    pub fn service(&self) -> &ReviewService<SqliteStore> {
        &self.service
    }

    /// Close the pool. Consumes the app so no caller can reach a closed store.
    pub async fn shutdown(self) {
        self.service.store().close().await;
        log::info!("Review service stopped");
    }
}
