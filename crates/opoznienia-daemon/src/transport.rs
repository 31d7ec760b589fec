//! Sending probes and receiving their replies.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opoznienia_types::now_us;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::error::{is_transient, TransportError};
use crate::icmp::IcmpSocket;

/// Where probes leave the host.
///
/// The probe engine only talks to this trait, so it can be driven by the
/// mock transport in tests.
#[async_trait]
pub trait ProbeTransport: Send + Sync + 'static {
    /// Send the 8-byte big-endian `timestamp` to the echo server at `target`.
    async fn send_udp(&self, target: SocketAddrV4, timestamp: u64) -> Result<(), TransportError>;

    /// Send one ICMP echo request.
    async fn send_icmp(&self, target: Ipv4Addr, seq: u16) -> Result<(), TransportError>;

    /// Open and drop a TCP connection to `target`.
    async fn connect_tcp(&self, target: SocketAddrV4, timeout: Duration)
        -> Result<(), TransportError>;

    /// Whether ICMP probes can be sent at all.
    fn icmp_available(&self) -> bool;
}

/// A reply received on one of the probe sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReply {
    /// Echo of a UDP probe carrying the original send timestamp.
    Udp {
        from: Ipv4Addr,
        timestamp: u64,
        at: u64,
    },
    /// ICMP echo reply.
    Icmp { from: Ipv4Addr, seq: u16, at: u64 },
}

/// Read the echoed timestamp from a UDP reply.
///
/// Replies shorter than 8 bytes are not ours.
pub fn decode_udp_reply(payload: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = payload.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Real sockets: an ephemeral UDP client socket and an optional ICMP socket.
#[derive(Debug, Clone)]
pub struct NetTransport {
    udp: Arc<UdpSocket>,
    icmp: Option<Arc<IcmpSocket>>,
}

impl NetTransport {
    /// Bind the client sockets. ICMP is disabled if no ICMP socket can be
    /// opened.
    pub async fn bind() -> Result<Self, TransportError> {
        let udp = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
        let icmp = IcmpSocket::open_or_disable();
        Ok(Self {
            udp: Arc::new(udp),
            icmp: icmp.map(Arc::new),
        })
    }

    /// Spawn one reader task per socket, forwarding replies to `tx`.
    ///
    /// Each reply is stamped on arrival, before it is queued.
    pub fn spawn_receivers(&self, tx: mpsc::Sender<ProbeReply>) {
        let udp = Arc::clone(&self.udp);
        let udp_tx = tx.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            loop {
                let (len, from) = match udp.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) if is_transient(&e) => {
                        debug!(error = %e, "UDP probe socket receive error");
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "UDP probe socket failed, no more UDP replies");
                        break;
                    }
                };
                let at = now_us();
                let SocketAddr::V4(from) = from else {
                    continue;
                };
                let Some(timestamp) = decode_udp_reply(&buf[..len]) else {
                    trace!(%from, len, "short UDP reply dropped");
                    continue;
                };
                let reply = ProbeReply::Udp {
                    from: *from.ip(),
                    timestamp,
                    at,
                };
                if udp_tx.send(reply).await.is_err() {
                    break;
                }
            }
        });

        if let Some(icmp) = self.icmp.clone() {
            tokio::spawn(async move {
                let mut buf = [0u8; 1500];
                loop {
                    match icmp.recv_reply(&mut buf).await {
                        Ok((from, seq)) => {
                            let reply = ProbeReply::Icmp {
                                from,
                                seq,
                                at: now_us(),
                            };
                            if tx.send(reply).await.is_err() {
                                break;
                            }
                        }
                        Err(e) if is_transient(&e) => {
                            debug!(error = %e, "ICMP receive error");
                        }
                        Err(e) => {
                            error!(error = %e, "ICMP socket failed, no more ICMP replies");
                            break;
                        }
                    }
                }
            });
        }
    }
}

#[async_trait]
impl ProbeTransport for NetTransport {
    async fn send_udp(&self, target: SocketAddrV4, timestamp: u64) -> Result<(), TransportError> {
        self.udp.send_to(&timestamp.to_be_bytes(), target).await?;
        Ok(())
    }

    async fn send_icmp(&self, target: Ipv4Addr, seq: u16) -> Result<(), TransportError> {
        let icmp = self.icmp.as_ref().ok_or(TransportError::IcmpUnavailable)?;
        icmp.send_echo(target, seq).await?;
        Ok(())
    }

    async fn connect_tcp(
        &self,
        target: SocketAddrV4,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Connect {
                target,
                reason: e.to_string(),
            }),
            Err(_) => Err(TransportError::Timeout(target)),
        }
    }

    fn icmp_available(&self) -> bool {
        self.icmp.is_some()
    }
}
