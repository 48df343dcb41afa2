//! Keyed minimum-interval rate limiter for outbound LLM requests.
//!
//! Each key (the orchestrator uses the session id) remembers when its last
//! request was released. [`RateLimiter::wait_if_needed`] suspends the caller
//! until `min_interval` has elapsed since then. The per-key lock is held
//! across the sleep, so concurrent callers for one key are released one
//! interval apart instead of racing past a stale timestamp.
//!
//! Timestamps come from `tokio::time::Instant`, which lets tests drive the
//! limiter with a paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::debug;

/// Release timestamps kept per key for statistics.
pub const HISTORY_CAPACITY: usize = 10;

#[derive(Default)]
struct KeyState {
    last: Option<Instant>,
    history: VecDeque<Instant>,
}

impl KeyState {
    fn record(&mut self, now: Instant) {
        self.last = Some(now);
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(now);
    }
}

/// Request statistics for one key, computed from the retained history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub total_requests: usize,
    /// Mean seconds between retained releases.
    pub avg_interval: f64,
    /// Shortest observed gap in seconds.
    pub min_interval: f64,
}

impl RateLimitStats {
    fn zeroed() -> Self {
        Self {
            total_requests: 0,
            avg_interval: 0.0,
            min_interval: 0.0,
        }
    }
}

pub struct RateLimiter {
    min_interval: Duration,
    keys: Mutex<HashMap<String, Arc<AsyncMutex<KeyState>>>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self::new(Duration::from_secs_f64(secs.max(0.0)))
    }

    fn state(&self, key: &str) -> Arc<AsyncMutex<KeyState>> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(keys.entry(key.to_string()).or_default())
    }

    /// Suspends until `min_interval` has passed since the key's previous
    /// release, then records this release. The first call for a key
    /// returns immediately.
    ///
    /// Dropping the future mid-wait leaves the key's state untouched.
    pub async fn wait_if_needed(&self, key: &str) {
        let state = self.state(key);
        let mut state = state.lock().await;

        if let Some(last) = state.last {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(key, wait_ms = wait.as_millis() as u64, "rate limiter suspending");
                tokio::time::sleep(wait).await;
            }
        }
        state.record(Instant::now());
    }

    /// Statistics for `key`; zeroed when fewer than two releases are known.
    pub async fn stats(&self, key: &str) -> RateLimitStats {
        let state = {
            let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
            match keys.get(key) {
                Some(s) => Arc::clone(s),
                None => return RateLimitStats::zeroed(),
            }
        };
        let state = state.lock().await;
        let history = &state.history;
        if history.len() < 2 {
            return RateLimitStats::zeroed();
        }

        let gaps: Vec<f64> = history
            .iter()
            .zip(history.iter().skip(1))
            .map(|(a, b)| b.duration_since(*a).as_secs_f64())
            .collect();
        let avg = gaps.iter().sum::<f64>() / gaps.len() as f64;
        let min = gaps.iter().copied().fold(f64::INFINITY, f64::min);
        RateLimitStats {
            total_requests: history.len(),
            avg_interval: avg,
            min_interval: min,
        }
    }
}
