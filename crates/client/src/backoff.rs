//! Retry policy and exponential backoff for transient repository errors.

use crate::error::FetchResult;
use async_trait::async_trait;
use onekey_core::config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// Source of delays, injectable so tests can observe backoff without waiting.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        match self.sleeps.lock() {
            Ok(mut sleeps) => sleeps.push(duration),
            Err(e) => e.into_inner().push(duration),
        }
        tokio::task::yield_now().await;
    }
}

/// Progress through a retry sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Retries performed so far.
    pub attempt: u32,
    /// Delay chosen before the most recent retry.
    pub next_delay: Duration,
}

/// Bounded exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Draw each delay uniformly from `[delay/2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Un-jittered delay before retry number `attempt` (0-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Advance `state` after a transient failure.
    ///
    /// Returns the delay to wait before retrying, or `None` once the retry
    /// budget is spent. `retry_after` raises the delay up to `max_delay`.
    pub fn advance(&self, state: &mut RetryState, retry_after: Option<Duration>) -> Option<Duration> {
        if state.attempt >= self.max_retries {
            return None;
        }

        let base = self.base_delay(state.attempt);
        let mut delay = if self.jitter {
            let max = base.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(max / 2..=max))
        } else {
            base
        };
        if let Some(requested) = retry_after {
            delay = delay.max(requested).min(self.max_delay);
        }

        state.attempt += 1;
        state.next_delay = delay;
        Some(delay)
    }

    /// Run `op` until it succeeds, fails permanently or exhausts the retry budget.
    pub async fn retry<T, F, Fut>(&self, clock: &dyn Clock, what: &str, mut op: F) -> FetchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let mut state = RetryState::default();
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => match self.advance(&mut state, e.retry_after()) {
                    Some(delay) => {
                        tracing::warn!(
                            request = what,
                            attempt = state.attempt,
                            max_retries = self.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Transient failure, retrying"
                        );
                        clock.sleep(delay).await;
                    }
                    None => {
                        tracing::warn!(request = what, retries = state.attempt, error = %e, "Giving up");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32, jitter: bool) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter,
        }
    }

    #[test]
    fn test_delays_double_and_cap() {
        let p = policy(10, false);
        let delays: Vec<u64> = (0..6).map(|n| p.base_delay(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(p.base_delay(200), Duration::from_millis(1000));
    }

    #[test]
    fn test_advance_stops_after_max_retries() {
        let p = policy(3, false);
        let mut state = RetryState::default();
        assert_eq!(p.advance(&mut state, None), Some(Duration::from_millis(100)));
        assert_eq!(p.advance(&mut state, None), Some(Duration::from_millis(200)));
        assert_eq!(p.advance(&mut state, None), Some(Duration::from_millis(400)));
        assert_eq!(p.advance(&mut state, None), None);
        assert_eq!(state.attempt, 3);
        assert_eq!(state.next_delay, Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_stays_within_half_to_full_delay() {
        let p = policy(1, true);
        for _ in 0..200 {
            let mut state = RetryState::default();
            let d = p.advance(&mut state, None).unwrap();
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100), "{d:?}");
        }
    }

    #[test]
    fn test_retry_after_raises_delay_but_respects_cap() {
        let p = policy(2, false);
        let mut state = RetryState::default();
        assert_eq!(
            p.advance(&mut state, Some(Duration::from_millis(700))),
            Some(Duration::from_millis(700))
        );
        assert_eq!(
            p.advance(&mut state, Some(Duration::from_secs(60))),
            Some(Duration::from_millis(1000))
        );
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let p = policy(3, false);
        let clock = RecordingClock::new();
        let calls = &AtomicU32::new(0);

        let result: FetchResult<()> = p
            .retry(&clock, "test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::RateLimited { retry_after: None })
            })
            .await;

        assert_eq!(result, Err(FetchError::RateLimited { retry_after: None }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let clock = RecordingClock::new();
        let calls = &AtomicU32::new(0);

        let result: FetchResult<()> = policy(5, false)
            .retry(&clock, "test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::AuthRequired("token rejected".into()))
            })
            .await;

        assert!(matches!(result, Err(FetchError::AuthRequired(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let clock = RecordingClock::new();
        let calls = &AtomicU32::new(0);

        let result = policy(3, false)
            .retry(&clock, "test", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Network("connection reset".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(clock.sleeps().len(), 2);
    }
}
