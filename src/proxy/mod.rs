//! Proxy wiring: address resolution, shared state, worker startup
//!
//! `Proxy::new` turns a validated [`Config`](crate::config::Config) into
//! runtime state: every upstream host is resolved exactly once, the
//! scoring store is initialized, and the selector is built around them.
//! `Proxy::start` binds the listener group and spawns the receive tasks.

mod forwarder;
mod socket;
mod worker;

pub use forwarder::{forward_query, ForwardContext, READ_BUFFER_SIZE};
pub use socket::bind_reuseport;
pub use worker::{WorkerPool, WorkerPoolStats, WorkerPoolStatsSnapshot};

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::{ConfigError, ProxyError};
use crate::upstream::{ScoreBoard, UpstreamSelector};

/// Port assumed when an upstream host omits one.
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Fully resolved proxy state, ready to start.
pub struct Proxy {
    listen_addr: SocketAddr,
    ctx: Arc<ForwardContext>,
}

impl Proxy {
    /// Resolve all addresses and build the runtime state.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if the listen address or any upstream
    /// host cannot be resolved.
    pub fn new(config: &Config) -> Result<Self, ProxyError> {
        let listen_addr = resolve_host(&config.listen)?;
        let primary_addr = resolve_host(&config.primary.host)?;

        let fallback_addrs = config
            .fallback
            .iter()
            .map(|fb| resolve_host(&fb.host))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            primary = %primary_addr,
            fallbacks = ?fallback_addrs,
            "resolved upstream addresses"
        );

        let scores = Arc::new(ScoreBoard::new(fallback_addrs.len(), &config.scoring));
        let selector = Arc::new(UpstreamSelector::new(
            primary_addr,
            fallback_addrs,
            scores,
            config.primary.failure_threshold,
            config.primary.down_ttl,
        ));

        Ok(Self {
            listen_addr,
            ctx: Arc::new(ForwardContext {
                selector,
                read_deadline: config.read_deadline,
            }),
        })
    }

    /// The resolved listen address.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// The upstream selector (shared with all forwarding tasks).
    pub fn selector(&self) -> &Arc<UpstreamSelector> {
        &self.ctx.selector
    }

    /// Bind the listener group and start `num_workers` receive tasks.
    ///
    /// # Errors
    ///
    /// Returns `SocketError` if binding fails.
    pub fn start(&self, num_workers: usize) -> Result<WorkerPool, ProxyError> {
        let pool = WorkerPool::spawn(self.listen_addr, num_workers, Arc::clone(&self.ctx))?;
        Ok(pool)
    }
}

/// Resolve a `host:port` string to one socket address.
///
/// A bare IP or hostname without a port gets the DNS default of 53.
///
/// # Errors
///
/// Returns `ConfigError::UnresolvableHost` if nothing resolves.
pub fn resolve_host(host: &str) -> Result<SocketAddr, ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::validation("empty host"));
    }

    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_DNS_PORT));
    }

    let first = |s: &str| s.to_socket_addrs().ok().and_then(|mut addrs| addrs.next());
    first(host)
        .or_else(|| first(&format!("{host}:{DEFAULT_DNS_PORT}")))
        .ok_or_else(|| ConfigError::unresolvable(host))
}
