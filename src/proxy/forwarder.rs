//! Per-query forwarding pipeline
//!
//! Each received client datagram runs this pipeline once, on its own
//! task: pick a backend, open a fresh connected upstream socket, send the
//! bytes verbatim, wait for the response under the read deadline, charge
//! the outcome back into the selector or the scoring store, and relay the
//! response to the client over the listening socket.
//!
//! The ephemeral upstream socket is the request correlation: each query
//! has its own source port, so concurrent responses cannot be confused
//! and no pending-query table is needed. The socket is dropped on every
//! exit path.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::upstream::{Backend, BackendKind, UpstreamSelector};

/// Receive buffer for both the listeners and the upstream reads. Covers
/// typical UDP DNS responses including EDNS-enlarged ones; anything
/// larger truncates at the kernel boundary.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Shared state handed to every forwarding task.
#[derive(Debug)]
pub struct ForwardContext {
    pub selector: Arc<UpstreamSelector>,
    pub read_deadline: Duration,
}

/// Forward one client datagram and relay the response.
///
/// Transport failures never surface to the client; they only update the
/// scoring state. The client simply times out when no upstream answered.
pub async fn forward_query(
    ctx: Arc<ForwardContext>,
    listen_socket: Arc<UdpSocket>,
    query: Vec<u8>,
    client: SocketAddr,
) {
    let backend = ctx.selector.choose_backend();

    let upstream = match UdpSocket::bind(ephemeral_bind_addr(backend.addr)).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!(upstream = %backend.addr, error = %e, "failed to open upstream socket");
            charge_failure(&ctx, backend);
            return;
        }
    };
    if let Err(e) = upstream.connect(backend.addr).await {
        debug!(upstream = %backend.addr, error = %e, "failed to connect upstream socket");
        charge_failure(&ctx, backend);
        return;
    }

    let start = Instant::now();
    if let Err(e) = upstream.send(&query).await {
        debug!(upstream = %backend.addr, error = %e, "failed to send query upstream");
        charge_failure(&ctx, backend);
        return;
    }

    let mut buf = [0u8; READ_BUFFER_SIZE];
    let len = match timeout(ctx.read_deadline, upstream.recv(&mut buf)).await {
        Ok(Ok(0)) => {
            debug!(upstream = %backend.addr, "empty datagram from upstream");
            charge_failure(&ctx, backend);
            return;
        }
        Ok(Ok(len)) => len,
        Ok(Err(e)) => {
            debug!(upstream = %backend.addr, error = %e, "upstream read error");
            charge_failure(&ctx, backend);
            return;
        }
        Err(_) => {
            debug!(
                upstream = %backend.addr,
                deadline = ?ctx.read_deadline,
                "upstream read deadline exceeded"
            );
            charge_failure(&ctx, backend);
            return;
        }
    };

    let rtt = start.elapsed();
    match backend.kind {
        BackendKind::Primary => ctx.selector.record_primary_success(),
        BackendKind::Fallback(index) => ctx.selector.scores().update_rtt(index, rtt),
    }

    trace!(
        upstream = %backend.addr,
        %client,
        len,
        rtt_us = rtt.as_micros() as u64,
        "relaying upstream response"
    );

    // Reply over the listening socket so the source address the client
    // sees is the one it queried. Reply failures are the client's loss
    // only; nothing to charge.
    if let Err(e) = listen_socket.send_to(&buf[..len], client).await {
        debug!(%client, error = %e, "failed to write response to client");
    }
}

/// Charge a failed forwarding attempt to whichever backend served it.
fn charge_failure(ctx: &ForwardContext, backend: Backend) {
    match backend.kind {
        BackendKind::Primary => ctx.selector.record_primary_failure(),
        BackendKind::Fallback(index) => ctx.selector.scores().add_penalty(index),
    }
}

/// Unspecified local address in the backend's family, port 0.
fn ephemeral_bind_addr(backend: SocketAddr) -> SocketAddr {
    if backend.is_ipv4() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    } else {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    }
}
