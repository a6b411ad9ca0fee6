use std::sync::RwLock;

use crate::types::Sample;

/// 最新样本缓存：单槽位，整体覆盖，读者只会看到旧值或新值
#[derive(Debug, Default)]
pub struct LatestCache {
    slot: RwLock<Option<Sample>>,
}

impl LatestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, sample: Sample) {
        let mut slot = self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(sample);
    }

    pub fn get(&self) -> Option<Sample> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
