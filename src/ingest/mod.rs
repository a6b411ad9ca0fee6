pub mod alert;
pub mod cache;
pub mod gate;
pub mod pipeline;

pub use alert::AlertEvaluator;
pub use cache::LatestCache;
pub use gate::RateGate;
pub use pipeline::IngestPipeline;
