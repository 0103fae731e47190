//! Shared helpers for integration tests: scriptable fake upstream
//! resolvers and a one-shot test client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use dns_proxy::config::{load_config_str, Config};

const BUF_SIZE: usize = 4096;

enum Behavior {
    /// Reply with the received bytes.
    Echo,
    /// Reply with the received bytes after a delay.
    EchoAfter(Duration),
    /// Never reply.
    Silent,
    /// Reply with fixed bytes, reporting each received datagram.
    Respond(Vec<u8>, mpsc::UnboundedSender<Vec<u8>>),
}

/// A fake upstream resolver bound to a local ephemeral port.
pub struct FakeUpstream {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl FakeUpstream {
    pub async fn echo() -> Self {
        Self::spawn(Behavior::Echo).await
    }

    pub async fn echo_after(delay: Duration) -> Self {
        Self::spawn(Behavior::EchoAfter(delay)).await
    }

    /// Bound but mute: queries sent here run into the read deadline.
    pub async fn silent() -> Self {
        Self::spawn(Behavior::Silent).await
    }

    /// Replies with `reply` to every query; the receiver yields each
    /// datagram the upstream saw, byte-exact.
    pub async fn respond_with(reply: Vec<u8>) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::spawn(Behavior::Respond(reply, tx)).await, rx)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn spawn(behavior: Behavior) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; BUF_SIZE];
            loop {
                let Ok((len, src)) = socket.recv_from(&mut buf).await else {
                    continue;
                };
                match &behavior {
                    Behavior::Echo => {
                        let _ = socket.send_to(&buf[..len], src).await;
                    }
                    Behavior::EchoAfter(delay) => {
                        tokio::time::sleep(*delay).await;
                        let _ = socket.send_to(&buf[..len], src).await;
                    }
                    Behavior::Silent => {}
                    Behavior::Respond(reply, tx) => {
                        let _ = tx.send(buf[..len].to_vec());
                        let _ = socket.send_to(reply, src).await;
                    }
                }
            }
        });
        Self { addr, handle }
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Build a validated config pointing at the given upstreams, listening on
/// an ephemeral local port.
pub fn test_config(
    primary: SocketAddr,
    fallbacks: &[SocketAddr],
    read_deadline: &str,
    down_ttl: &str,
    failure_threshold: u32,
) -> Config {
    let fallback_yaml: String = fallbacks
        .iter()
        .map(|addr| format!("  - host: \"{addr}\"\n"))
        .collect();

    let yaml = format!(
        r#"listen: "127.0.0.1:0"
read_deadline: {read_deadline}
primary:
  host: "{primary}"
  down_ttl: {down_ttl}
  failure_threshold: {failure_threshold}
fallback:
{fallback_yaml}"#
    );

    load_config_str(&yaml).expect("test config must validate")
}

/// Send one datagram to the proxy and wait up to `wait` for a reply.
pub async fn query_once(server: SocketAddr, payload: &[u8], wait: Duration) -> Option<Vec<u8>> {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(payload, server).await.unwrap();

    let mut buf = [0u8; BUF_SIZE];
    match timeout(wait, client.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        _ => None,
    }
}
