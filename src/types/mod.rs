pub mod sample;
pub mod results;
pub mod tasks;

pub use sample::{format_timestamp, Reading, Sample, SampleUpdate, StoreRecord};
pub use results::{ack_for, IngestOutcome};
pub use tasks::DatabaseTask;
