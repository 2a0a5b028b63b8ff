//! SQLite persistence for clients, deals and stage history.
//!
//! - `init_db` opens the pool with foreign keys and WAL enabled, then applies
//!   the schema
//! - `Repository` holds every query, including the version-checked writes
//!   that guard stage and commission updates

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{Repository, SnapshotWrite};
