//! Rate limiter — three independent gates in front of the executor.
//!
//! In order: a self-identity bar (a bot must never process its own
//! output), per-requester limits (cooldown, concurrency, sliding
//! window), then global limits (concurrency, sliding window). A
//! requester that fills its window earns a cooldown, so repeat
//! offenders are penalized beyond the window itself.
//!
//! State is process-wide and serialized behind one mutex; pruning of
//! the sliding windows happens inside the critical section on access.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::RejectReason;

/// A refusal from `check`, with a retry hint where one is knowable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub retry_after: Option<Duration>,
}

/// Construction parameters for [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_requests_per_window: usize,
    pub max_global_requests_per_window: usize,
    pub max_concurrent: usize,
    pub max_global_concurrent: usize,
    pub cooldown: Duration,
    pub window: Duration,
    /// Identities of the bot itself, compared case-insensitively.
    pub self_ids: Vec<String>,
}

impl RateLimiterConfig {
    /// Profile for a public-facing deployment.
    pub fn default_public() -> Self {
        Self {
            max_requests_per_window: 10,
            max_global_requests_per_window: 100,
            max_concurrent: 2,
            max_global_concurrent: 10,
            cooldown: Duration::from_secs(30),
            window: Duration::from_secs(60),
            self_ids: Vec::new(),
        }
    }

    /// Tighter profile for hostile environments.
    pub fn strict() -> Self {
        Self {
            max_requests_per_window: 5,
            max_global_requests_per_window: 30,
            max_concurrent: 1,
            max_global_concurrent: 5,
            cooldown: Duration::from_secs(60),
            window: Duration::from_secs(60),
            self_ids: Vec::new(),
        }
    }

    pub fn self_id(mut self, id: impl Into<String>) -> Self {
        self.self_ids.push(id.into());
        self
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::default_public()
    }
}

#[derive(Default)]
struct RequesterState {
    requests: VecDeque<Instant>,
    concurrent: usize,
    cooldown_until: Option<Instant>,
}

struct LimiterState {
    requesters: HashMap<String, RequesterState>,
    global_requests: VecDeque<Instant>,
    global_concurrent: usize,
    self_ids: HashSet<String>,
}

/// Statistics snapshot for the administrative surface.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub global_concurrent: usize,
    pub global_window_len: usize,
    pub tracked_requesters: usize,
    pub requesters_in_cooldown: usize,
}

/// Sliding-window rate limiter with per-requester cooldowns.
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<LimiterState>,
}

fn prune(window: &mut VecDeque<Instant>, horizon: Duration, now: Instant) {
    while let Some(front) = window.front() {
        if now.duration_since(*front) >= horizon {
            window.pop_front();
        } else {
            break;
        }
    }
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let self_ids = config.self_ids.iter().map(|s| s.to_lowercase()).collect();
        Self {
            config,
            state: Mutex::new(LimiterState {
                requesters: HashMap::new(),
                global_requests: VecDeque::new(),
                global_concurrent: 0,
                self_ids,
            }),
        }
    }

    /// Admission check; first failing gate wins. Does not record the
    /// request — a caller that proceeds must bracket the work with
    /// `record_start` and `record_end`.
    pub fn check(&self, id: &str) -> Result<(), Rejection> {
        let now = Instant::now();
        let mut state = self.state.lock();

        if state.self_ids.contains(&id.to_lowercase()) {
            debug!(id, "rejected self-identified request");
            return Err(Rejection {
                reason: RejectReason::SelfMessage,
                retry_after: None,
            });
        }

        let requester = state.requesters.entry(id.to_string()).or_default();
        match requester.cooldown_until {
            Some(until) if until > now => {
                return Err(Rejection {
                    reason: RejectReason::RequesterCooldown,
                    retry_after: Some(until.duration_since(now)),
                });
            }
            Some(_) => requester.cooldown_until = None,
            None => {}
        }

        if requester.concurrent >= self.config.max_concurrent {
            return Err(Rejection {
                reason: RejectReason::RequesterConcurrent,
                retry_after: None,
            });
        }

        prune(&mut requester.requests, self.config.window, now);
        if requester.requests.len() >= self.config.max_requests_per_window {
            warn!(id, "request window filled, opening cooldown");
            requester.cooldown_until = Some(now + self.config.cooldown);
            return Err(Rejection {
                reason: RejectReason::RequesterRateLimit,
                retry_after: Some(self.config.cooldown),
            });
        }

        if state.global_concurrent >= self.config.max_global_concurrent {
            return Err(Rejection {
                reason: RejectReason::GlobalConcurrent,
                retry_after: None,
            });
        }

        prune(&mut state.global_requests, self.config.window, now);
        if state.global_requests.len() >= self.config.max_global_requests_per_window {
            let retry_after = state
                .global_requests
                .front()
                .map(|t| self.config.window.saturating_sub(now.duration_since(*t)));
            return Err(Rejection {
                reason: RejectReason::GlobalRateLimit,
                retry_after,
            });
        }

        Ok(())
    }

    /// Records the start of an admitted request.
    pub fn record_start(&self, id: &str) {
        let now = Instant::now();
        let mut state = self.state.lock();
        let requester = state.requesters.entry(id.to_string()).or_default();
        requester.concurrent += 1;
        requester.requests.push_back(now);
        state.global_requests.push_back(now);
        state.global_concurrent += 1;
    }

    /// Records the end of an admitted request. Must run exactly once per
    /// `record_start`, on every exit path.
    pub fn record_end(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(requester) = state.requesters.get_mut(id) {
            requester.concurrent = requester.concurrent.saturating_sub(1);
        }
        state.global_concurrent = state.global_concurrent.saturating_sub(1);
    }

    // ── administrative surface ──────────────────────────────────

    pub fn add_self_id(&self, id: &str) {
        self.state.lock().self_ids.insert(id.to_lowercase());
    }

    pub fn remove_self_id(&self, id: &str) {
        self.state.lock().self_ids.remove(&id.to_lowercase());
    }

    /// Clears an active cooldown for one requester.
    pub fn clear_cooldown(&self, id: &str) {
        if let Some(requester) = self.state.lock().requesters.get_mut(id) {
            requester.cooldown_until = None;
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        let now = Instant::now();
        let mut state = self.state.lock();
        prune(&mut state.global_requests, self.config.window, now);
        let in_cooldown = state
            .requesters
            .values()
            .filter(|r| r.cooldown_until.is_some_and(|until| until > now))
            .count();
        RateLimiterStats {
            global_concurrent: state.global_concurrent,
            global_window_len: state.global_requests.len(),
            tracked_requesters: state.requesters.len(),
            requesters_in_cooldown: in_cooldown,
        }
    }
}

// ── token-bucket variant ────────────────────────────────────────────

/// Construction parameters for [`TokenBucketLimiter`].
#[derive(Debug, Clone)]
pub struct TokenBucketConfig {
    pub requester_capacity: f64,
    pub requester_refill_per_sec: f64,
    pub global_capacity: f64,
    pub global_refill_per_sec: f64,
    pub self_ids: Vec<String>,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            requester_capacity: 10.0,
            requester_refill_per_sec: 10.0 / 60.0,
            global_capacity: 100.0,
            global_refill_per_sec: 100.0 / 60.0,
            self_ids: Vec::new(),
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, rate: f64, capacity: f64, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }
}

struct BucketState {
    requesters: HashMap<String, Bucket>,
    global: Bucket,
    self_ids: HashSet<String>,
}

/// Token-bucket limiter for bursty workloads: a burst may drain the
/// bucket, then requests trickle in at the refill rate. Preserves the
/// self-identity bar.
pub struct TokenBucketLimiter {
    config: TokenBucketConfig,
    state: Mutex<BucketState>,
}

impl TokenBucketLimiter {
    pub fn new(config: TokenBucketConfig) -> Self {
        let self_ids = config.self_ids.iter().map(|s| s.to_lowercase()).collect();
        let global = Bucket::full(config.global_capacity);
        Self {
            config,
            state: Mutex::new(BucketState {
                requesters: HashMap::new(),
                global,
                self_ids,
            }),
        }
    }

    /// Denies when either bucket is below one token.
    pub fn check(&self, id: &str) -> Result<(), Rejection> {
        let now = Instant::now();
        let mut state = self.state.lock();

        if state.self_ids.contains(&id.to_lowercase()) {
            return Err(Rejection {
                reason: RejectReason::SelfMessage,
                retry_after: None,
            });
        }

        let capacity = self.config.requester_capacity;
        let rate = self.config.requester_refill_per_sec;
        let requester = state
            .requesters
            .entry(id.to_string())
            .or_insert_with(|| Bucket::full(capacity));
        requester.refill(rate, capacity, now);
        if requester.tokens < 1.0 {
            let wait = (1.0 - requester.tokens) / rate;
            return Err(Rejection {
                reason: RejectReason::RequesterRateLimit,
                retry_after: Some(Duration::from_secs_f64(wait)),
            });
        }

        state.global.refill(
            self.config.global_refill_per_sec,
            self.config.global_capacity,
            now,
        );
        if state.global.tokens < 1.0 {
            let wait = (1.0 - state.global.tokens) / self.config.global_refill_per_sec;
            return Err(Rejection {
                reason: RejectReason::GlobalRateLimit,
                retry_after: Some(Duration::from_secs_f64(wait)),
            });
        }

        Ok(())
    }

    /// Debits one token from both buckets.
    pub fn consume(&self, id: &str) {
        let now = Instant::now();
        let mut state = self.state.lock();
        let capacity = self.config.requester_capacity;
        let rate = self.config.requester_refill_per_sec;
        let requester = state
            .requesters
            .entry(id.to_string())
            .or_insert_with(|| Bucket::full(capacity));
        requester.refill(rate, capacity, now);
        requester.tokens = (requester.tokens - 1.0).max(0.0);
        state.global.refill(
            self.config.global_refill_per_sec,
            self.config.global_capacity,
            now,
        );
        state.global.tokens = (state.global.tokens - 1.0).max(0.0);
    }
}
