//! Upstream backend selection
//!
//! The primary resolver is preferred unconditionally while healthy. Once
//! `failure_threshold` consecutive failures accumulate it is marked down
//! for `down_ttl`; during that window queries go to the lowest-scored
//! fallback. The down state self-heals: the first selection past the
//! deadline returns the primary and clears the flag, no timer task
//! involved.
//!
//! # State machine
//!
//! ```text
//! Healthy ──[threshold consecutive failures]──> Down(until)
//!    ^                                             │
//!    └──────────[any select at now >= until]───────┘
//! ```
//!
//! A single success on the primary resets the failure counter at any
//! time, independently of the down deadline.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::score::ScoreBoard;
use super::unix_nanos;

/// Tie-break jitter bound. Orders of magnitude below any realistic
/// nanosecond score; only distinguishes exactly equal scores.
const JITTER: f64 = 1e-6;

/// Which upstream a query was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// The primary resolver
    Primary,
    /// A fallback resolver, by index into the configured list
    Fallback(usize),
}

/// A selected backend: resolved address plus how to charge the outcome.
#[derive(Debug, Clone, Copy)]
pub struct Backend {
    pub addr: SocketAddr,
    pub kind: BackendKind,
}

/// Chooses between the primary and the scored fallbacks.
///
/// Thread-safe; every field on the selection path is atomic.
#[derive(Debug)]
pub struct UpstreamSelector {
    primary_addr: SocketAddr,
    /// Resolved once at startup, never mutated.
    fallback_addrs: Vec<SocketAddr>,
    scores: Arc<ScoreBoard>,

    primary_down: AtomicBool,
    down_until_ns: AtomicU64,
    failure_count: AtomicU32,

    failure_threshold: u32,
    down_ttl: Duration,
}

impl UpstreamSelector {
    /// Create a selector over a resolved primary and fallback set.
    pub fn new(
        primary_addr: SocketAddr,
        fallback_addrs: Vec<SocketAddr>,
        scores: Arc<ScoreBoard>,
        failure_threshold: u32,
        down_ttl: Duration,
    ) -> Self {
        debug_assert_eq!(fallback_addrs.len(), scores.len());
        Self {
            primary_addr,
            fallback_addrs,
            scores,
            primary_down: AtomicBool::new(false),
            down_until_ns: AtomicU64::new(0),
            failure_count: AtomicU32::new(0),
            failure_threshold,
            down_ttl,
        }
    }

    /// The scoring store shared with the forwarding pipeline.
    pub fn scores(&self) -> &ScoreBoard {
        &self.scores
    }

    /// The resolved primary address.
    pub fn primary_addr(&self) -> SocketAddr {
        self.primary_addr
    }

    /// The resolved fallback addresses.
    pub fn fallback_addrs(&self) -> &[SocketAddr] {
        &self.fallback_addrs
    }

    /// Whether the primary is currently bypassed.
    pub fn is_primary_down(&self) -> bool {
        self.primary_down.load(Ordering::Acquire)
    }

    /// Current consecutive primary failure count.
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Pick the backend for the next query.
    pub fn choose_backend(&self) -> Backend {
        self.choose_backend_at(unix_nanos())
    }

    fn choose_backend_at(&self, now_ns: u64) -> Backend {
        if !self.primary_down.load(Ordering::Acquire) {
            return Backend {
                addr: self.primary_addr,
                kind: BackendKind::Primary,
            };
        }

        // Acquire pairs with the Release in mark_primary_down_at: a
        // visible down flag implies a populated deadline.
        if now_ns > self.down_until_ns.load(Ordering::Acquire) {
            self.primary_down.store(false, Ordering::Release);
            self.failure_count.store(0, Ordering::Release);
            info!(primary = %self.primary_addr, "primary down TTL expired, restoring");
            return Backend {
                addr: self.primary_addr,
                kind: BackendKind::Primary,
            };
        }

        let index = self.choose_best_fallback();
        Backend {
            addr: self.fallback_addrs[index],
            kind: BackendKind::Fallback(index),
        }
    }

    /// Index of the lowest-scored fallback.
    ///
    /// Each candidate's score is nudged down by an independent jitter
    /// sample in `[0, 1e-6)` so that freshly initialized fallbacks with
    /// identical scores are picked evenly instead of always index 0.
    pub fn choose_best_fallback(&self) -> usize {
        let n = self.fallback_addrs.len();
        if n == 1 {
            return 0;
        }

        let mut rng = rand::thread_rng();
        let mut best = 0;
        let mut best_score = self.scores.score(0) - rng.gen::<f64>() * JITTER;
        for i in 1..n {
            let score = self.scores.score(i) - rng.gen::<f64>() * JITTER;
            if score < best_score {
                best_score = score;
                best = i;
            }
        }
        best
    }

    /// Charge a failed forwarding attempt against the primary.
    ///
    /// The threshold keeps a single lost packet from flipping the primary
    /// out of rotation.
    pub fn record_primary_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            primary = %self.primary_addr,
            failures,
            threshold = self.failure_threshold,
            "primary forwarding failure"
        );
        if failures >= self.failure_threshold {
            self.mark_primary_down();
            self.failure_count.store(0, Ordering::Release);
        }
    }

    /// Record a successful primary exchange; resets the failure streak.
    pub fn record_primary_success(&self) {
        if self.failure_count.load(Ordering::Relaxed) != 0 {
            self.failure_count.store(0, Ordering::Release);
        }
    }

    /// Bypass the primary for the configured TTL.
    pub fn mark_primary_down(&self) {
        self.mark_primary_down_at(unix_nanos());
    }

    #[allow(clippy::cast_possible_truncation)]
    fn mark_primary_down_at(&self, now_ns: u64) {
        let until = now_ns + self.down_ttl.as_nanos() as u64;
        // Deadline first, flag second: a reader that acquires the flag
        // must also see the deadline.
        self.down_until_ns.store(until, Ordering::Release);
        self.primary_down.store(true, Ordering::Release);
        warn!(
            primary = %self.primary_addr,
            down_ttl = ?self.down_ttl,
            "primary marked down"
        );
    }
}
