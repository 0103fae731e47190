//! Fallback scoring store
//!
//! One record per fallback: a smoothed RTT estimate and a decaying
//! penalty, both in nanoseconds. Scores are read on every fallback
//! selection and written on every completed forwarding attempt, so all
//! three fields are lock-free atomics. Stored values are integer
//! nanoseconds; the score arithmetic itself runs in `f64`.
//!
//! Concurrent updates are last-writer-wins: `update_rtt` retries through
//! CAS, `add_penalty` stores unconditionally. The score is a heuristic,
//! so a reader observing a penalty and its timestamp from two different
//! writes at worst produces a one-step-stale score.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::unix_nanos;
use crate::config::ScoringConfig;

/// Runtime scoring state for a single fallback.
#[derive(Debug)]
struct FallbackScore {
    /// Exponentially smoothed round-trip estimate, nanoseconds
    rtt_ns: AtomicU64,
    /// Magnitude of the current penalty, nanoseconds
    penalty_ns: AtomicU64,
    /// Wall-clock nanos at which the penalty was installed; 0 = never
    penalty_at_ns: AtomicU64,
}

/// Scoring store for all fallbacks.
///
/// Constructed once at startup with one entry per configured fallback and
/// shared behind an `Arc`.
#[derive(Debug)]
pub struct ScoreBoard {
    entries: Vec<FallbackScore>,
    penalty_add_ns: u64,
    half_life_ns: u64,
    ema_alpha: f64,
}

impl ScoreBoard {
    /// Create a scoring store with `count` entries, each starting at the
    /// configured initial RTT and no penalty.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(count: usize, scoring: &ScoringConfig) -> Self {
        let initial_rtt_ns = scoring.initial_rtt.as_nanos() as u64;
        let entries = (0..count)
            .map(|_| FallbackScore {
                rtt_ns: AtomicU64::new(initial_rtt_ns),
                penalty_ns: AtomicU64::new(0),
                penalty_at_ns: AtomicU64::new(0),
            })
            .collect();

        Self {
            entries,
            penalty_add_ns: scoring.penalty_add.as_nanos() as u64,
            half_life_ns: scoring.penalty_half_life.as_nanos() as u64,
            ema_alpha: scoring.rtt_ema_alpha,
        }
    }

    /// Number of fallback entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current score for a fallback: smoothed RTT plus decayed penalty.
    /// Lower is better.
    pub fn score(&self, index: usize) -> f64 {
        self.score_at(index, unix_nanos())
    }

    /// Current RTT estimate for a fallback.
    pub fn rtt(&self, index: usize) -> Duration {
        Duration::from_nanos(self.entries[index].rtt_ns.load(Ordering::Relaxed))
    }

    /// Fold an RTT sample into the smoothed estimate:
    /// `new = old * alpha + sample * (1 - alpha)`.
    ///
    /// Called only on successful forwardings through this fallback. CAS
    /// retry keeps concurrent samples last-writer-wins without a lock.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn update_rtt(&self, index: usize, sample: Duration) {
        let sample_ns = sample.as_nanos() as f64;
        let rtt = &self.entries[index].rtt_ns;

        let mut current = rtt.load(Ordering::Relaxed);
        loop {
            let next =
                (current as f64 * self.ema_alpha + sample_ns * (1.0 - self.ema_alpha)) as u64;
            match rtt.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Install a fresh penalty on a fallback.
    ///
    /// The penalty replaces any decayed residue rather than adding to it,
    /// which caps the steady-state penalty at `penalty_add`.
    pub fn add_penalty(&self, index: usize) {
        self.add_penalty_at(index, unix_nanos());
    }

    fn add_penalty_at(&self, index: usize, now_ns: u64) {
        let entry = &self.entries[index];
        entry.penalty_ns.store(self.penalty_add_ns, Ordering::Relaxed);
        entry.penalty_at_ns.store(now_ns, Ordering::Relaxed);
    }

    #[allow(clippy::cast_precision_loss)]
    fn score_at(&self, index: usize, now_ns: u64) -> f64 {
        let entry = &self.entries[index];
        entry.rtt_ns.load(Ordering::Relaxed) as f64
            + decayed_penalty(
                entry.penalty_ns.load(Ordering::Relaxed),
                entry.penalty_at_ns.load(Ordering::Relaxed),
                now_ns,
                self.half_life_ns,
            )
    }
}

/// Penalty remaining after exponential decay.
///
/// Returns 0 when no penalty was ever installed. A zero half-life
/// disables decay. Elapsed time is clamped to zero, so a backwards clock
/// step yields the un-decayed penalty rather than an inflated one.
#[allow(clippy::cast_precision_loss)]
fn decayed_penalty(penalty_ns: u64, penalty_at_ns: u64, now_ns: u64, half_life_ns: u64) -> f64 {
    if penalty_ns == 0 || penalty_at_ns == 0 {
        return 0.0;
    }
    if half_life_ns == 0 {
        return penalty_ns as f64;
    }
    let elapsed = now_ns.saturating_sub(penalty_at_ns);
    if elapsed == 0 {
        return penalty_ns as f64;
    }
    penalty_ns as f64 * 0.5_f64.powf(elapsed as f64 / half_life_ns as f64)
}
