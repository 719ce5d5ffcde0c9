/// Per-caller request quota.
///
/// Sliding-window log: for each identity, the instants of its admitted
/// requests inside the current window. A request is admitted while the log
/// holds fewer than `max_requests` entries; otherwise the caller is told how
/// long until the oldest entry ages out.
///
/// All state sits behind one mutex. Identities whose whole log has expired
/// are pruned on every check, so memory is bounded by the number of callers
/// active within one window.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::clock::Clock;
use crate::config::RateLimitSection;

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Set only when rejected: time until the next request would be admitted.
    pub retry_after: Option<std::time::Duration>,
}

impl RateDecision {
    const ALLOWED: RateDecision = RateDecision {
        allowed: true,
        retry_after: None,
    };
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    log: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_requests,
            window,
            clock,
            log: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitSection, clock: Arc<dyn Clock>) -> Self {
        // clamp to a year; anything longer is a misconfiguration
        let window = Duration::seconds(config.window_secs.min(365 * 86_400) as i64);
        Self::new(config.max_requests, window, clock)
    }

    /// Records the request if admitted. Rejected requests do not extend the
    /// caller's window.
    pub fn check(&self, identity: &str) -> RateDecision {
        let now = self.clock.now();
        let cutoff = now - self.window;
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());

        log.retain(|_, entries| {
            while entries.front().is_some_and(|t| *t <= cutoff) {
                entries.pop_front();
            }
            !entries.is_empty()
        });

        let entries = log.entry(identity.to_string()).or_default();
        if entries.len() < self.max_requests {
            entries.push_back(now);
            return RateDecision::ALLOWED;
        }

        // Full log: the oldest entry is still inside the window.
        let retry_after = entries
            .front()
            .map(|oldest| (*oldest + self.window - now).to_std().unwrap_or_default())
            .unwrap_or_default();
        debug!(identity, retry_after_secs = retry_after.as_secs(), "rate limited");
        RateDecision {
            allowed: false,
            retry_after: Some(retry_after),
        }
    }

    /// Identities currently holding log entries.
    pub fn tracked_identities(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
