// Control plane: admission control and per-venue circuit breakers
//
// Inbound routing requests pass through a concurrency + rate gate. Each
// quoting venue has a sliding-window breaker; an open breaker means the venue
// is skipped for the request (and reported as failed) without issuing I/O.

use crate::metrics::ADMISSION_THROTTLED;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;

#[derive(Clone)]
pub struct AdmissionControl {
    max_inflight: Arc<Semaphore>,
    inner: Arc<Mutex<RateLimiter>>,
}

struct RateLimiter {
    rate_per_sec: u32,
    timestamps: VecDeque<Instant>,
    window: Duration,
}

impl AdmissionControl {
    pub fn new(max_inflight: usize, rate_per_sec: Option<u32>) -> Self {
        let rl = RateLimiter {
            rate_per_sec: rate_per_sec.unwrap_or(100),
            timestamps: VecDeque::with_capacity(256),
            window: Duration::from_secs(1),
        };
        Self {
            max_inflight: Arc::new(Semaphore::new(max_inflight)),
            inner: Arc::new(Mutex::new(rl)),
        }
    }

    /// Acquire an admission permit respecting max inflight and rate limit.
    /// A throttled acquisition waits; it is never rejected.
    pub async fn acquire(&self) -> AdmissionPermit {
        let mut rate_throttled = false;
        loop {
            let mut guard = self.inner.lock().await;
            let now = Instant::now();
            while let Some(front) = guard.timestamps.front() {
                if now.duration_since(*front) > guard.window {
                    guard.timestamps.pop_front();
                } else {
                    break;
                }
            }
            if (guard.timestamps.len() as u32) < guard.rate_per_sec {
                guard.timestamps.push_back(now);
                break;
            }
            if !rate_throttled {
                rate_throttled = true;
                ADMISSION_THROTTLED.with_label_values(&["rate"]).inc();
                debug!("admission waiting on rate window");
            }
            drop(guard);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if self.max_inflight.available_permits() == 0 {
            ADMISSION_THROTTLED.with_label_values(&["inflight"]).inc();
            debug!("admission waiting on inflight cap");
        }
        let permit = self
            .max_inflight
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore not closed");
        AdmissionPermit { _permit: permit }
    }
}

pub struct AdmissionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Sliding-window failure tracking per venue. Breakers only ever skip a
/// venue; they never fail the overall request.
#[derive(Clone, Default)]
pub struct VenueBreakers {
    inner: Arc<Mutex<HashMap<String, Breaker>>>,
}

struct Breaker {
    window: VecDeque<bool>, // true=failure
    max_window: usize,
    threshold: f32,
    min_samples: usize,
    open_until: Option<Instant>,
    open_cooldown: Duration,
}

impl Default for Breaker {
    fn default() -> Self {
        Self {
            window: VecDeque::with_capacity(50),
            max_window: 50,
            threshold: 0.5,
            min_samples: 10,
            open_until: None,
            open_cooldown: Duration::from_secs(15),
        }
    }
}

impl VenueBreakers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_open(&self, venue: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let b = inner.entry(venue.to_string()).or_default();
        if let Some(until) = b.open_until {
            if Instant::now() < until {
                return true;
            }
            b.open_until = None;
        }
        false
    }

    pub async fn record_success(&self, venue: &str) {
        self.record(venue, false).await;
    }

    pub async fn record_failure(&self, venue: &str) {
        self.record(venue, true).await;
    }

    async fn record(&self, venue: &str, failure: bool) {
        let mut inner = self.inner.lock().await;
        let b = inner.entry(venue.to_string()).or_default();
        if b.window.len() == b.max_window {
            b.window.pop_front();
        }
        b.window.push_back(failure);

        let samples = b.window.len();
        if samples >= b.min_samples {
            let fails = b.window.iter().filter(|x| **x).count();
            let rate = fails as f32 / samples as f32;
            if rate >= b.threshold && b.open_until.is_none() {
                b.open_until = Some(Instant::now() + b.open_cooldown);
                debug!(venue = %venue, rate = rate, samples = samples, "venue breaker opened");
            }
        }
    }
}
