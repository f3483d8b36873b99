mod result_set;
mod row;

pub use result_set::QueryExecResult;
pub use row::{Row, RowObject};
