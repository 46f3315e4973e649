use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::Response;
use tokio::time::sleep;

const WINDOW: Duration = Duration::from_secs(60);

/// Client-side throttle shared by every request issued through one `GitHubClient`.
///
/// Tracks the `x-ratelimit-*` headers of the hosting API and, optionally, a
/// softer per-minute request budget.
pub struct RateLimiter {
    state: Mutex<RateLimitState>,
    per_minute: Option<u32>,
}

struct RateLimitState {
    remaining: Option<u32>,
    reset_at: Option<Instant>,
    requests_in_window: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_soft_limit(Some(90))
    }

    pub fn with_soft_limit(per_minute: Option<u32>) -> Self {
        Self {
            state: Mutex::new(RateLimitState {
                remaining: None,
                reset_at: None,
                requests_in_window: 0,
                window_start: Instant::now(),
            }),
            per_minute,
        }
    }

    /// Sleeps until the next request is allowed, then records it.
    pub async fn wait(&self) {
        loop {
            let delay = self.reserve();
            match delay {
                Some(delay) => {
                    tracing::debug!("Rate limited, waiting {:?}", delay);
                    sleep(delay).await;
                }
                None => return,
            }
        }
    }

    /// Returns the delay to wait, or records the request and returns `None`.
    fn reserve(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if state.remaining == Some(0) {
            match state.reset_at {
                Some(reset_at) if reset_at > now => return Some(reset_at - now),
                _ => state.remaining = None,
            }
        }

        if now.duration_since(state.window_start) >= WINDOW {
            state.requests_in_window = 0;
            state.window_start = now;
        }

        if let Some(limit) = self.per_minute {
            if state.requests_in_window >= limit {
                return Some(WINDOW - now.duration_since(state.window_start));
            }
        }

        state.requests_in_window += 1;
        None
    }

    pub fn update_from_response(&self, response: &Response) {
        let headers = response.headers();
        let remaining = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());
        let reset = headers
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if let Some(remaining) = remaining {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.remaining = Some(remaining);
            state.reset_at = reset.map(|ts| Instant::now() + seconds_until(ts));
        }
    }

    /// Seconds until the primary limit resets, if the API reported exhaustion.
    pub fn reset_in(&self) -> Option<u64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.remaining != Some(0) {
            return None;
        }
        state
            .reset_at
            .map(|at| at.saturating_duration_since(Instant::now()).as_secs())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn seconds_until(unix_timestamp: u64) -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Duration::from_secs(unix_timestamp.saturating_sub(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_limit_reserves_until_budget_spent() {
        let limiter = RateLimiter::with_soft_limit(Some(2));
        assert!(limiter.reserve().is_none());
        assert!(limiter.reserve().is_none());
        let delay = limiter.reserve().expect("third request should be delayed");
        assert!(delay <= WINDOW);
    }

    #[test]
    fn test_unlimited_never_waits() {
        let limiter = RateLimiter::with_soft_limit(None);
        for _ in 0..500 {
            assert!(limiter.reserve().is_none());
        }
        assert_eq!(limiter.reset_in(), None);
    }
}
