//! Business logic services.
//!
//! `review` orchestrates the team, user and pull request use cases;
//! `selection` is the deterministic reviewer picker they share.
//!
//! Services depend only on the storage traits and can be tested against
//! the in-memory store.

pub mod review;
pub mod selection;

pub use review::ReviewService;
pub use selection::{select_candidates, REVIEWERS_PER_PR};
