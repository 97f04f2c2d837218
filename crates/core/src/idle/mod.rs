use std::time::{Duration, Instant};

/// What the dispatch loop should do with the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleDecision {
    /// Gate passed: forward the mapped color.
    Active,
    /// Gate failed but the timeout has not elapsed yet: write nothing.
    Waiting,
    /// The idle timeout has elapsed and the idle color is still owed.
    EmitIdle,
    /// The idle color was already written for this episode.
    Suppress,
}

/// Tracks how long the gate has been continuously closed.
///
/// An idle episode starts with the first gated-out frame and ends with the
/// next active one. The idle color is owed once per episode; it stays owed
/// until [`IdleDetector::mark_idle_written`] confirms a write, so a rate-limited
/// cycle cannot swallow it.
#[derive(Debug, Default, Clone)]
pub struct IdleDetector {
    idle_since: Option<Instant>,
    idle_written: bool,
}

impl IdleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, active: bool, now: Instant, timeout: Duration) -> IdleDecision {
        if active {
            if self.idle_since.is_some() {
                tracing::debug!("signal back, leaving idle");
            }
            self.idle_since = None;
            self.idle_written = false;
            return IdleDecision::Active;
        }

        let since = *self.idle_since.get_or_insert(now);
        if self.idle_written {
            IdleDecision::Suppress
        } else if now.saturating_duration_since(since) >= timeout {
            IdleDecision::EmitIdle
        } else {
            IdleDecision::Waiting
        }
    }

    pub fn mark_idle_written(&mut self) {
        self.idle_written = true;
    }

    pub fn idle_since(&self) -> Option<Instant> {
        self.idle_since
    }

    pub fn is_idle(&self) -> bool {
        self.idle_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn active_frames_reset_the_timer() {
        let start = Instant::now();
        let mut idle = IdleDetector::new();

        assert_eq!(idle.observe(false, start, TIMEOUT), IdleDecision::Waiting);
        assert_eq!(idle.idle_since(), Some(start));
        assert_eq!(
            idle.observe(true, start + Duration::from_secs(1), TIMEOUT),
            IdleDecision::Active
        );
        assert_eq!(idle.idle_since(), None);
        assert_eq!(
            idle.observe(false, start + Duration::from_millis(2_500), TIMEOUT),
            IdleDecision::Waiting
        );
    }

    #[test]
    fn idle_color_is_owed_until_written() {
        let start = Instant::now();
        let mut idle = IdleDetector::new();

        idle.observe(false, start, TIMEOUT);
        assert_eq!(idle.observe(false, start + TIMEOUT, TIMEOUT), IdleDecision::EmitIdle);
        // Not written yet (e.g. rate limited): still owed.
        assert_eq!(
            idle.observe(false, start + TIMEOUT + Duration::from_millis(10), TIMEOUT),
            IdleDecision::EmitIdle
        );

        idle.mark_idle_written();
        assert!(idle.is_idle());
        for secs in 3..10 {
            assert_eq!(
                idle.observe(false, start + Duration::from_secs(secs), TIMEOUT),
                IdleDecision::Suppress
            );
        }
    }

    #[test]
    fn new_episode_owes_a_new_idle_write() {
        let start = Instant::now();
        let mut idle = IdleDetector::new();

        idle.observe(false, start, TIMEOUT);
        idle.observe(false, start + TIMEOUT, TIMEOUT);
        idle.mark_idle_written();

        idle.observe(true, start + Duration::from_secs(3), TIMEOUT);
        idle.observe(false, start + Duration::from_secs(4), TIMEOUT);
        assert_eq!(
            idle.observe(false, start + Duration::from_secs(6), TIMEOUT),
            IdleDecision::EmitIdle
        );
    }

    #[test]
    fn zero_timeout_idles_immediately() {
        let mut idle = IdleDetector::new();
        assert_eq!(idle.observe(false, Instant::now(), Duration::ZERO), IdleDecision::EmitIdle);
    }
}
