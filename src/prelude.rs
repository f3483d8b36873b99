//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::backend::{Backend, BackendRegistry, BackendType};
pub use crate::batch::{BatchProcessor, StatementSource};
pub use crate::cache::{CacheStats, StatementCache, StatementId};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{DatabaseOptions, DatabaseOptionsBuilder};
pub use crate::database::Database;
pub use crate::error::SqliteDualError;
pub use crate::hash::{djb2_hash, normalize_sql, sql_cache_key};
pub use crate::pragma::{PragmaConfig, PragmaOptimizer, TempStore};
pub use crate::results::{QueryExecResult, Row, RowObject};
pub use crate::statement::{Statement, StatementState};
pub use crate::transaction::{TransactionHost, TransactionManager};
pub use crate::types::{Params, RowValues};
