//! dns-proxy: stateless UDP DNS forwarding proxy with adaptive upstream
//! selection
//!
//! Clients send DNS queries to the listening UDP endpoint; each datagram
//! is forwarded verbatim to one upstream resolver and the response is
//! relayed back unchanged. The proxy never parses the payload; the
//! engineering lives in upstream selection: a primary/fallback failover
//! scheme with a consecutive-failure threshold and down TTL, per-fallback
//! RTT+penalty scoring with exponential decay, and a lock-free request
//! pipeline across per-CPU `SO_REUSEPORT` receivers.
//!
//! # Architecture
//!
//! ```text
//! Client ──► reuseport worker (1 per CPU) ──► forwarding task
//!                                                  │
//!                                         upstream selector
//!                                          │            │
//!                                      primary      best-scored
//!                                     (liveness)     fallback
//! ```
//!
//! # Modules
//!
//! - [`config`]: YAML configuration types and loading
//! - [`error`]: Error types
//! - [`logging`]: Log sink selection (stderr / file / syslog)
//! - [`pidfile`]: PID-file acquisition and release
//! - [`proxy`]: Receive fabric and per-query forwarding pipeline
//! - [`upstream`]: Scoring store and backend selector

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod logging;
pub mod pidfile;
pub mod proxy;
pub mod upstream;

pub use config::{load_config, load_config_str, Config, FallbackConfig, PrimaryConfig, ScoringConfig};
pub use error::{ConfigError, PidFileError, ProxyError, Result, SocketError};
pub use logging::LogSink;
pub use pidfile::PidFile;
pub use proxy::{
    bind_reuseport, forward_query, resolve_host, ForwardContext, Proxy, WorkerPool,
    WorkerPoolStats, WorkerPoolStatsSnapshot, READ_BUFFER_SIZE,
};
pub use upstream::{Backend, BackendKind, ScoreBoard, UpstreamSelector};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
