//! # daybook-shared
//!
//! Types shared by the Daybook store and server: identifiers, constants,
//! validation errors, entry-date handling and the JSON bodies exchanged with
//! the web client.

pub mod api;
pub mod constants;
pub mod dates;
pub mod error;
pub mod types;

pub use error::ValidationError;
pub use types::{EntryId, UserId};
