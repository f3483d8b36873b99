//! Embedded SQLite behind one interface, on either of two engines:
//!
//! - **native**: `rusqlite` with the bundled SQLite amalgamation (feature `sqlite`)
//! - **portable**: `turso`, a pure-Rust SQLite-compatible engine (feature `turso`)
//!
//! A [`Database`] owns one backend and adds a prepared-statement cache (LRU with optional
//! idle expiry), nested transactions through savepoints, bulk inserts, and pragma tuning.
//! Databases move in and out as standard SQLite file images via [`Database::export_db`] and
//! [`Database::open_from_bytes`]; an image written by one engine opens in the other.
//!
//! ```rust,no_run
//! use sqlite_dual::prelude::*;
//!
//! # async fn demo() -> Result<(), SqliteDualError> {
//! let registry = BackendRegistry::new();
//! let mut db = Database::open(&registry, DatabaseOptions::default()).await?;
//! db.exec_sql("CREATE TABLE symbols (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")?;
//!
//! let rows: Vec<Vec<RowValues>> = (1..=3)
//!     .map(|i| vec![RowValues::Int(i), RowValues::Text(format!("sym{i}"))])
//!     .collect();
//! db.bulk_insert("INSERT INTO symbols (id, name) VALUES (?, ?)", &rows)?;
//!
//! let inserted = db.transaction(|db| {
//!     db.run("INSERT INTO symbols (name) VALUES (?)", vec![RowValues::from("late")])
//! })?;
//! assert_eq!(inserted, 1);
//!
//! let image = db.export_db()?;
//! let copy = Database::open_from_bytes(&registry, DatabaseOptions::default(), &image).await?;
//! # drop(copy);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod batch;
pub mod cache;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod hash;
pub mod image;
#[cfg(feature = "sqlite")]
pub mod native;
#[cfg(feature = "turso")]
pub mod portable;
pub mod pragma;
pub mod prelude;
pub mod results;
pub mod sql_text;
pub mod statement;
pub mod transaction;
pub mod types;

pub use backend::{Backend, BackendRegistry, BackendType, NativeStatement};
pub use cache::{CacheStats, StatementCache, StatementId};
pub use config::{DatabaseOptions, DatabaseOptionsBuilder};
pub use database::Database;
pub use error::SqliteDualError;
pub use results::{QueryExecResult, Row, RowObject};
pub use statement::{Statement, StatementState};
pub use types::{Params, RowValues};
