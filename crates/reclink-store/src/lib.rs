//! reclink-store: durable state for targets and recordings.
//!
//! The engine only talks to [`LifecycleRepository`]; [`SqliteRepository`] is
//! the production adapter. Schema creation lives in [`db::init_db`] and is
//! safe to run on every startup.

pub mod db;
pub mod error;
pub mod repository;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use repository::LifecycleRepository;
pub use sqlite::SqliteRepository;
