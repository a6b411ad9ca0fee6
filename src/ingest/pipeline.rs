use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde_json::Value;

use super::{AlertEvaluator, LatestCache, RateGate};
use crate::broadcast::Broadcaster;
use crate::database::SampleStore;
use crate::error::IngestError;
use crate::types::{IngestOutcome, Reading, Sample};

/// Accept → gate → persist → cache → broadcast.
///
/// One pipeline per process. `last_accepted` doubles as the critical section:
/// it is held from the gate check until the broadcast is queued, so store ids,
/// the cache and subscriber delivery all follow the same acceptance order.
pub struct IngestPipeline {
    store: Arc<dyn SampleStore>,
    cache: Arc<LatestCache>,
    broadcaster: Arc<Broadcaster>,
    evaluator: AlertEvaluator,
    gate: RateGate,
    last_accepted: Mutex<Option<DateTime<Utc>>>,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn SampleStore>,
        cache: Arc<LatestCache>,
        broadcaster: Arc<Broadcaster>,
        evaluator: AlertEvaluator,
        gate: RateGate,
    ) -> Self {
        Self {
            store,
            cache,
            broadcaster,
            evaluator,
            gate,
            last_accepted: Mutex::new(None),
        }
    }

    pub fn accept(&self, raw: &Value, arrival: DateTime<Utc>) -> Result<IngestOutcome, IngestError> {
        let reading = Reading::from_value(raw).map_err(log_invalid)?;
        self.accept_reading(reading, arrival)
    }

    pub fn accept_bytes(&self, payload: &[u8], arrival: DateTime<Utc>) -> Result<IngestOutcome, IngestError> {
        let reading = Reading::from_slice(payload).map_err(log_invalid)?;
        self.accept_reading(reading, arrival)
    }

    pub fn accept_reading(&self, reading: Reading, arrival: DateTime<Utc>) -> Result<IngestOutcome, IngestError> {
        let mut last_accepted = self
            .last_accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !self.gate.admits(*last_accepted, arrival) {
            debug!("Reading at {} inside gate interval, skipped", arrival);
            return Ok(IngestOutcome::Skipped);
        }

        let sample = Sample::new(reading, arrival);

        // 写库失败时不推进限流时间，也不更新缓存和广播
        let id = self.store.append(&sample).map_err(|e| {
            error!("Failed to persist IMU sample: {}", e);
            IngestError::Persistence(e)
        })?;

        *last_accepted = Some(arrival);
        self.cache.set(sample.clone());

        let alert = self.evaluator.evaluate(&sample);
        let report = self.broadcaster.publish(&sample, alert);
        if report.dropped > 0 || report.removed > 0 {
            debug!(
                "Broadcast #{}: delivered {}, dropped {}, removed {}",
                id, report.delivered, report.dropped, report.removed
            );
        }

        info!(
            "IMU #{} -> ax:{:.2} ay:{:.2} az:{:.2} | MAG:{:.2}{}",
            id,
            sample.ax(),
            sample.ay(),
            sample.az(),
            sample.magnitude(),
            if alert { " [ALERT]" } else { "" }
        );

        Ok(IngestOutcome::Accepted { id, sample, alert })
    }
}

fn log_invalid(e: IngestError) -> IngestError {
    warn!("Rejected IMU reading: {}", e);
    e
}
