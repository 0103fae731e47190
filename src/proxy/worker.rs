//! Receive fabric: the UDP worker pool
//!
//! Binds N sockets to the same listening address in one `SO_REUSEPORT`
//! group and drains each with an independent receive task. The kernel
//! distributes datagrams across the group by connection hash, so there is
//! no central queue and no lock between workers. Every received datagram
//! fans out into its own forwarding task; forwarders reply over the
//! worker's socket, relying on UDP sends being atomic at the datagram
//! level.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::forwarder::{forward_query, ForwardContext, READ_BUFFER_SIZE};
use super::socket::bind_reuseport;
use crate::error::SocketError;

/// Statistics shared by all workers in the pool.
#[derive(Debug, Default)]
pub struct WorkerPoolStats {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    recv_errors: AtomicU64,
    workers_active: AtomicU32,
}

impl WorkerPoolStats {
    fn record_packet(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.recv_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn worker_started(&self) {
        self.workers_active.fetch_add(1, Ordering::Relaxed);
    }

    fn worker_stopped(&self) {
        self.workers_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get total packets received
    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    /// Get number of currently active workers
    pub fn workers_active(&self) -> u32 {
        self.workers_active.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> WorkerPoolStatsSnapshot {
        WorkerPoolStatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            workers_active: self.workers_active.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the pool counters.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolStatsSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub recv_errors: u64,
    pub workers_active: u32,
}

/// A group of receive tasks sharing one listening port.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
    stats: Arc<WorkerPoolStats>,
    running: AtomicBool,
    local_addr: SocketAddr,
}

impl WorkerPool {
    /// Bind `num_workers` reuseport sockets to `listen` and start one
    /// receive task per socket.
    ///
    /// With a port of 0 the first socket picks the concrete port and the
    /// rest of the group joins it.
    ///
    /// # Errors
    ///
    /// Returns `SocketError` if any socket fails to bind.
    pub fn spawn(
        listen: SocketAddr,
        num_workers: usize,
        ctx: Arc<ForwardContext>,
    ) -> Result<Self, SocketError> {
        let num_workers = num_workers.max(1);
        let (shutdown_tx, _) = broadcast::channel(1);
        let stats = Arc::new(WorkerPoolStats::default());

        let first = bind_reuseport(listen)?;
        let local_addr = first.local_addr().map_err(SocketError::IoError)?;

        let mut sockets = Vec::with_capacity(num_workers);
        sockets.push(first);
        for _ in 1..num_workers {
            sockets.push(bind_reuseport(local_addr)?);
        }

        info!(
            listen = %local_addr,
            workers = num_workers,
            "UDP reuseport listener group bound"
        );

        let mut workers = Vec::with_capacity(num_workers);
        for (id, socket) in sockets.into_iter().enumerate() {
            let ctx = Arc::clone(&ctx);
            let shutdown_rx = shutdown_tx.subscribe();
            let stats = Arc::clone(&stats);
            workers.push(tokio::spawn(async move {
                worker_loop(id, Arc::new(socket), ctx, shutdown_rx, stats).await;
            }));
        }

        Ok(Self {
            workers,
            shutdown_tx,
            stats,
            running: AtomicBool::new(true),
            local_addr,
        })
    }

    /// The concrete listening address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Pool statistics.
    pub fn stats(&self) -> &Arc<WorkerPoolStats> {
        &self.stats
    }

    /// Get a stats snapshot
    pub fn stats_snapshot(&self) -> WorkerPoolStatsSnapshot {
        self.stats.snapshot()
    }

    /// Signal all workers and wait for them to exit.
    ///
    /// In-flight forwarding tasks are not cancelled; each finishes within
    /// its own upstream read deadline.
    pub async fn shutdown(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("shutting down UDP worker pool");
        let _ = self.shutdown_tx.send(());

        for (id, worker) in self.workers.drain(..).enumerate() {
            match worker.await {
                Ok(()) => debug!(worker = id, "worker joined"),
                Err(e) => warn!(worker = id, error = %e, "worker join error"),
            }
        }

        let snapshot = self.stats.snapshot();
        info!(
            packets = snapshot.packets_received,
            bytes = snapshot.bytes_received,
            recv_errors = snapshot.recv_errors,
            "UDP worker pool stopped"
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.running.load(Ordering::Relaxed) {
            let _ = self.shutdown_tx.send(());
        }
    }
}

/// One receive task: drain a socket until shutdown.
///
/// The shutdown branch is biased first so cancellation wins over a ready
/// datagram. Transient read errors are logged and the loop continues.
async fn worker_loop(
    id: usize,
    socket: Arc<UdpSocket>,
    ctx: Arc<ForwardContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
    stats: Arc<WorkerPoolStats>,
) {
    stats.worker_started();
    debug!(worker = id, "receive loop started");

    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                debug!(worker = id, "received shutdown signal");
                break;
            }

            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, client)) => {
                        stats.record_packet(len);
                        trace!(worker = id, %client, len, "received datagram");
                        tokio::spawn(forward_query(
                            Arc::clone(&ctx),
                            Arc::clone(&socket),
                            buf[..len].to_vec(),
                            client,
                        ));
                    }
                    Err(e) => {
                        stats.record_error();
                        warn!(worker = id, error = %e, "listener read error");
                    }
                }
            }
        }
    }

    stats.worker_stopped();
    debug!(worker = id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::upstream::{ScoreBoard, UpstreamSelector};
    use std::time::Duration;

    fn test_context(primary: SocketAddr) -> Arc<ForwardContext> {
        let scores = Arc::new(ScoreBoard::new(1, &ScoringConfig::default()));
        let selector = Arc::new(UpstreamSelector::new(
            primary,
            vec!["127.0.0.1:1".parse().unwrap()],
            scores,
            3,
            Duration::from_secs(300),
        ));
        Arc::new(ForwardContext {
            selector,
            read_deadline: Duration::from_millis(200),
        })
    }

    #[tokio::test]
    async fn test_pool_binds_requested_worker_count() {
        let ctx = test_context("127.0.0.1:1".parse().unwrap());
        let mut pool = WorkerPool::spawn("127.0.0.1:0".parse().unwrap(), 4, ctx).unwrap();

        assert_eq!(pool.num_workers(), 4);
        assert_ne!(pool.local_addr().port(), 0);

        pool.shutdown().await;
        assert_eq!(pool.stats().workers_active(), 0);
    }

    #[tokio::test]
    async fn test_pool_zero_workers_clamped_to_one() {
        let ctx = test_context("127.0.0.1:1".parse().unwrap());
        let mut pool = WorkerPool::spawn("127.0.0.1:0".parse().unwrap(), 0, ctx).unwrap();
        assert_eq!(pool.num_workers(), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_pool_counts_received_packets() {
        // Upstream that echoes, so the full pipeline completes.
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                if let Ok((len, src)) = upstream.recv_from(&mut buf).await {
                    let _ = upstream.send_to(&buf[..len], src).await;
                }
            }
        });

        let ctx = test_context(upstream_addr);
        let mut pool = WorkerPool::spawn("127.0.0.1:0".parse().unwrap(), 2, ctx).unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"hello", pool.local_addr()).await.unwrap();

        let mut buf = [0u8; READ_BUFFER_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .expect("no response")
            .unwrap();
        assert_eq!(&buf[..len], b"hello");
        assert!(pool.stats_snapshot().packets_received >= 1);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let ctx = test_context("127.0.0.1:1".parse().unwrap());
        let mut pool = WorkerPool::spawn("127.0.0.1:0".parse().unwrap(), 2, ctx).unwrap();
        pool.shutdown().await;
        pool.shutdown().await;
        assert_eq!(pool.num_workers(), 0);
    }
}
