use chrono::{DateTime, Utc};
use std::time::Duration;

/// Minimum spacing between accepted samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateGate {
    min_interval: Duration,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn admits(&self, last_accepted: Option<DateTime<Utc>>, arrival: DateTime<Utc>) -> bool {
        admits(last_accepted, arrival, self.min_interval)
    }
}

/// 纯函数形式的限流判断，便于不依赖计时器直接测试。
/// 墙钟回拨时差值为负，同样会被拒绝
pub fn admits(last_accepted: Option<DateTime<Utc>>, arrival: DateTime<Utc>, min_interval: Duration) -> bool {
    let Some(last) = last_accepted else {
        return true;
    };

    match (arrival - last).to_std() {
        Ok(elapsed) => elapsed >= min_interval,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + ChronoDuration::milliseconds(ms)
    }

    #[test]
    fn first_reading_always_passes() {
        assert!(admits(None, t(0), Duration::from_millis(100)));
    }

    #[test]
    fn readings_inside_interval_are_rejected() {
        let gate = RateGate::new(Duration::from_millis(100));
        assert!(!gate.admits(Some(t(0)), t(10)));
        assert!(!gate.admits(Some(t(0)), t(99)));
        assert!(!gate.admits(Some(t(0)), t(0)));
    }

    #[test]
    fn interval_boundary_is_inclusive() {
        let gate = RateGate::new(Duration::from_millis(100));
        assert!(gate.admits(Some(t(0)), t(100)));
        assert!(gate.admits(Some(t(0)), t(200)));
    }

    #[test]
    fn clock_going_backwards_is_rejected() {
        assert!(!admits(Some(t(500)), t(100), Duration::from_millis(100)));
    }

    #[test]
    fn zero_interval_admits_everything_forward() {
        assert!(admits(Some(t(5)), t(5), Duration::ZERO));
    }
}
