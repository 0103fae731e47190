//! Listener socket construction
//!
//! Builds the UDP sockets for the reuseport listener group:
//! `SO_REUSEADDR` + `SO_REUSEPORT` so N sockets can bind the same
//! address and the kernel hashes incoming datagrams across them
//! (Linux >= 3.9 behavior).

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::SocketError;

/// Create a non-blocking UDP socket bound to `addr` with the reuseport
/// group options set.
///
/// Must be called from within a tokio runtime (the socket is registered
/// with the reactor).
///
/// # Errors
///
/// Returns `SocketError` if socket creation, option setting, or binding
/// fails.
pub fn bind_reuseport(addr: SocketAddr) -> Result<UdpSocket, SocketError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| SocketError::SocketCreation(e.to_string()))?;

    // SO_REUSEADDR for quick restart across the whole group.
    socket
        .set_reuse_address(true)
        .map_err(|e| SocketError::socket_option("SO_REUSEADDR", e.to_string()))?;

    // SO_REUSEPORT lets every worker bind the same address; the kernel
    // distributes datagrams by connection hash.
    socket
        .set_reuse_port(true)
        .map_err(|e| SocketError::socket_option("SO_REUSEPORT", e.to_string()))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| SocketError::socket_option("O_NONBLOCK", e.to_string()))?;

    socket
        .bind(&addr.into())
        .map_err(|e| SocketError::bind(addr, e.to_string()))?;

    debug!(%addr, "bound reuseport UDP socket");

    UdpSocket::from_std(socket.into()).map_err(SocketError::IoError)
}
