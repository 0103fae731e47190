//! Upstream selection and health tracking
//!
//! The selector prefers the primary resolver until it accumulates enough
//! consecutive failures, then bypasses it for a fixed TTL and routes to
//! the lowest-scored fallback. Fallback scores combine a smoothed RTT
//! estimate with an exponentially decaying failure penalty. All shared
//! state is atomic; the hot path takes no locks.

mod score;
mod selector;

pub use score::ScoreBoard;
pub use selector::{Backend, BackendKind, UpstreamSelector};

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock nanoseconds since the Unix epoch.
///
/// Penalty timestamps and the primary down-deadline are wall-clock so the
/// arithmetic matches the half-life and TTL durations from the config.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
