pub mod batch;
pub mod cursor;
pub mod modified;

pub use batch::{BatchOrder, BatchResult, BatchSortField, execute_query_batch};
pub use cursor::QueryBatchCursor;
pub use modified::{ModifiedResult, execute_query_modified};
