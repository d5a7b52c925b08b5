//! Sliding-window request limiter with a hard per-session ceiling.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_max_session_calls")]
    pub max_session_calls: u64,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_max_session_calls() -> u64 {
    1000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            max_session_calls: default_max_session_calls(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error(
        "session limit of {limit} model calls reached; start a new session or raise max_session_calls"
    )]
    SessionLimitExceeded { limit: u64 },
}

#[derive(Debug, Default)]
struct Window {
    admitted: VecDeque<Instant>,
    total_calls: u64,
}

impl Window {
    fn prune(&mut self, now: Instant) {
        while self
            .admitted
            .front()
            .is_some_and(|&t| t + WINDOW <= now)
        {
            self.admitted.pop_front();
        }
    }
}

/// Gate in front of every model call.
///
/// At most `requests_per_minute` calls are admitted in any rolling 60 second window; callers
/// beyond that wait. Once `max_session_calls` calls have been admitted every further call
/// fails immediately.
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: usize,
    session_limit: u64,
    state: Mutex<Window>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            per_minute: usize::try_from(config.requests_per_minute.max(1)).unwrap_or(usize::MAX),
            session_limit: config.max_session_calls,
            state: Mutex::new(Window::default()),
        }
    }

    /// Wait for a free slot, then record the call.
    ///
    /// The lock is held while sleeping so concurrent callers are admitted in order.
    ///
    /// # Errors
    ///
    /// Returns `SessionLimitExceeded` once the session ceiling has been reached.
    pub async fn admit(&self) -> Result<(), RateLimitError> {
        let mut window = self.state.lock().await;
        if window.total_calls >= self.session_limit {
            tracing::warn!(limit = self.session_limit, "session call limit reached");
            return Err(RateLimitError::SessionLimitExceeded {
                limit: self.session_limit,
            });
        }

        window.prune(Instant::now());
        if window.admitted.len() >= self.per_minute
            && let Some(&oldest) = window.admitted.front()
        {
            let wake = oldest + WINDOW;
            tracing::info!(
                wait_ms = wake.saturating_duration_since(Instant::now()).as_millis(),
                "rate limit reached, waiting"
            );
            tokio::time::sleep_until(wake).await;
            window.prune(Instant::now());
        }

        window.admitted.push_back(Instant::now());
        window.total_calls += 1;
        Ok(())
    }

    pub async fn total_calls(&self) -> u64 {
        self.state.lock().await.total_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rpm: u32, session: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            requests_per_minute: rpm,
            max_session_calls: session,
        })
    }

    #[test]
    fn config_defaults() {
        let cfg: RateLimitConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, RateLimitConfig::default());
        assert_eq!(cfg.requests_per_minute, 60);
        assert_eq!(cfg.max_session_calls, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_limit_without_waiting() {
        let rl = limiter(3, 100);
        let start = Instant::now();
        for _ in 0..3 {
            rl.admit().await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(rl.total_calls().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_oldest_to_leave_window() {
        let rl = limiter(2, 100);
        let start = Instant::now();
        rl.admit().await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        rl.admit().await.unwrap();
        rl.admit().await.unwrap();
        assert_eq!(start.elapsed(), WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides() {
        let rl = limiter(1, 100);
        rl.admit().await.unwrap();
        tokio::time::advance(WINDOW).await;
        let before = Instant::now();
        rl.admit().await.unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn session_limit_is_hard() {
        let rl = limiter(100, 2);
        rl.admit().await.unwrap();
        rl.admit().await.unwrap();
        let err = rl.admit().await.unwrap_err();
        assert_eq!(err, RateLimitError::SessionLimitExceeded { limit: 2 });
        assert!(err.to_string().contains("max_session_calls"));
        assert_eq!(rl.total_calls().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rpm_is_clamped() {
        let rl = limiter(0, 10);
        rl.admit().await.unwrap();
        assert_eq!(rl.total_calls().await, 1);
    }
}
