//! SQLite backend for the accommodation lifecycle engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. A commit runs inside one SQLite
//! transaction, so entity updates and their lifecycle events land together.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
