//! Review Assigner - reviewer assignment and reconciliation for team pull
//! requests.
//!
//! The crate keeps each pull request's reviewer set valid: no self-review,
//! no duplicates, frozen after merge, drawn only from active members of the
//! reviewer's team. [`services::ReviewService`] implements the use cases over
//! any [`store::ReviewStore`]; [`app::App`] wires it to SQLite.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use app::App;
pub use config::AppConfig;
pub use error::{AppError, ErrorCode};
pub use services::ReviewService;
