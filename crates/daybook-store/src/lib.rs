//! # daybook-store
//!
//! Document storage for Daybook, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for users, diary
//! entries and profiles. Callers in async code are expected to drive it from a
//! blocking task.

pub mod database;
pub mod entries;
pub mod migrations;
pub mod models;
pub mod profiles;
pub mod users;

mod error;
mod timestamps;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
