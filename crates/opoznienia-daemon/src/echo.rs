//! UDP echo server answering other hosts' measurement probes.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use opoznienia_types::now_us;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace};

use crate::error::{is_transient, DaemonError};

/// Build the reply to a probe: its first 8 bytes followed by our own
/// receive timestamp. Probes shorter than 8 bytes get no reply.
pub fn echo_reply(probe: &[u8], received_at: u64) -> Option<[u8; 16]> {
    let stamp = probe.get(..8)?;
    let mut reply = [0u8; 16];
    reply[..8].copy_from_slice(stamp);
    reply[8..].copy_from_slice(&received_at.to_be_bytes());
    Some(reply)
}

/// Echo server bound on the measurement port.
#[derive(Debug)]
pub struct EchoServer {
    socket: UdpSocket,
}

impl EchoServer {
    pub async fn bind(port: u16) -> Result<Self, DaemonError> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|source| DaemonError::Bind {
                what: "UDP echo server",
                port,
                source,
            })?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Answer probes until the task is dropped.
    pub async fn run(self) {
        if let Ok(addr) = self.socket.local_addr() {
            info!(%addr, "UDP echo server listening");
        }
        let mut buf = [0u8; 512];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) if is_transient(&e) => {
                    debug!(error = %e, "echo receive error");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "UDP echo server stopped");
                    return;
                }
            };
            let Some(reply) = echo_reply(&buf[..len], now_us()) else {
                trace!(%from, len, "short probe dropped");
                continue;
            };
            if let Err(e) = self.socket.send_to(&reply, from).await {
                debug!(%from, error = %e, "echo send error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_keeps_probe_stamp_and_appends_ours() {
        let probe = 42u64.to_be_bytes();
        let reply = echo_reply(&probe, 77).unwrap();
        assert_eq!(&reply[..8], &probe);
        assert_eq!(u64::from_be_bytes(reply[8..].try_into().unwrap()), 77);
    }

    #[test]
    fn short_probe_ignored() {
        assert!(echo_reply(&[1, 2, 3], 5).is_none());
    }

    #[test]
    fn extra_probe_bytes_not_echoed() {
        let reply = echo_reply(&[9; 12], 0).unwrap();
        assert_eq!(&reply[..8], &[9; 8]);
    }
}
