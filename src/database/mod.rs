pub mod manager;
pub mod schema;
pub mod handlers;
pub mod export;

pub use manager::DatabaseManager;
pub use handlers::StoreHandle;
pub use export::csv_lines;

use crate::error::StoreError;
use crate::types::{Sample, StoreRecord};

/// Append-only sample log with newest-first queries.
///
/// Implementations must make each `append` a single atomic insert and hand out
/// strictly increasing ids, so that `recent` can order by id alone.
pub trait SampleStore: Send + Sync {
    fn append(&self, sample: &Sample) -> Result<i64, StoreError>;

    /// Newest first, at most `limit` records.
    fn recent(&self, limit: usize) -> Result<Vec<StoreRecord>, StoreError>;

    /// Every record in insertion order.
    fn all(&self) -> Result<Vec<StoreRecord>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}
