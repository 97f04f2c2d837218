use std::time::{Duration, Instant};

/// Hard ceiling on light writes per second, whatever the configuration asks for.
pub const MAX_UPDATES_PER_SECOND: u32 = 30;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Minimum spacing between two writes for a requested rate. The rate is
/// clamped to `1..=MAX_UPDATES_PER_SECOND`; the interval is rounded up to
/// the next nanosecond so `rate` intervals never fit inside one second.
pub fn update_interval(max_updates_per_second: u32) -> Duration {
    let rate = max_updates_per_second.clamp(1, MAX_UPDATES_PER_SECOND);
    Duration::from_nanos(NANOS_PER_SECOND.div_ceil(u64::from(rate)))
}

/// Decouples analysis cadence from light-write cadence.
#[derive(Debug, Default, Clone)]
pub struct RateLimiter {
    last_update: Option<Instant>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a write at `now` keeps within the configured rate.
    pub fn is_ready(&self, now: Instant, max_updates_per_second: u32) -> bool {
        match self.last_update {
            None => true,
            Some(last) => {
                now.saturating_duration_since(last) >= update_interval(max_updates_per_second)
            }
        }
    }

    /// Records a write performed at `now`.
    pub fn record(&mut self, now: Instant) {
        self.last_update = Some(now);
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_clamped() {
        assert_eq!(update_interval(60), update_interval(30));
        assert_eq!(update_interval(0), Duration::from_secs(1));
        assert_eq!(update_interval(10), Duration::from_millis(100));
        assert_eq!(update_interval(30), Duration::from_nanos(33_333_334));
    }

    #[test]
    fn back_to_back_writes_at_the_interval_stay_within_rate() {
        let start = Instant::now();
        let interval = update_interval(30);
        let mut limiter = RateLimiter::new();

        let mut in_first_second = 0;
        for k in 0..=40u32 {
            let now = start + interval * k;
            if limiter.is_ready(now, 30) {
                limiter.record(now);
                if now.duration_since(start) < Duration::from_secs(1) {
                    in_first_second += 1;
                }
            }
        }
        assert_eq!(in_first_second, 30);
    }

    #[test]
    fn first_write_is_always_allowed() {
        assert!(RateLimiter::new().is_ready(Instant::now(), 1));
    }

    #[test]
    fn never_exceeds_thirty_writes_per_second() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new();
        let mut writes = Vec::new();

        // 5 ms analysis cadence for three seconds, asking for 60 updates/s.
        for tick in 0..600u64 {
            let now = start + Duration::from_millis(tick * 5);
            if limiter.is_ready(now, 60) {
                limiter.record(now);
                writes.push(now);
            }
        }

        for (i, window_start) in writes.iter().enumerate() {
            let in_window = writes[i..]
                .iter()
                .take_while(|t| t.duration_since(*window_start) < Duration::from_secs(1))
                .count();
            assert!(in_window <= 30, "{in_window} writes within one second");
        }
        assert!(writes.len() >= 60);
    }
}
