use crossbeam_channel::Sender;

use super::{Sample, StoreRecord};
use crate::error::StoreError;

/// Database task enumeration, executed in order by the store worker thread
pub enum DatabaseTask {
    Append {
        sample: Sample,
        response_sender: Sender<Result<i64, StoreError>>,
    },
    Recent {
        limit: usize,
        response_sender: Sender<Result<Vec<StoreRecord>, StoreError>>,
    },
    All {
        response_sender: Sender<Result<Vec<StoreRecord>, StoreError>>,
    },
    Count {
        response_sender: Sender<Result<usize, StoreError>>,
    },
}

impl DatabaseTask {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Append { .. } => "append",
            Self::Recent { .. } => "recent",
            Self::All { .. } => "all",
            Self::Count { .. } => "count",
        }
    }
}
