//! ICMP echo packets and the socket they travel on.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Identifier put in every echo request.
pub const ECHO_IDENTIFIER: u16 = 0;

/// Payload of every echo request: the digits `34686203` packed as BCD.
pub const ECHO_PAYLOAD: [u8; 4] = [0x34, 0x68, 0x62, 0x03];

const ECHO_REQUEST: u8 = 8;
const ECHO_REPLY: u8 = 0;
const ICMP_HEADER_LEN: usize = 8;

/// RFC 1071 internet checksum.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = 0u32;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u32::from(u16::from_be_bytes([chunk[0], chunk[1]])));
    }
    if let Some(&last) = chunks.remainder().first() {
        sum = sum.wrapping_add(u32::from(last) << 8);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    #[allow(clippy::cast_possible_truncation)]
    let folded = sum as u16;
    !folded
}

/// Echo request with the session identifier, `seq` and the fixed payload.
pub fn echo_request(seq: u16) -> Vec<u8> {
    let mut packet = Vec::with_capacity(ICMP_HEADER_LEN + ECHO_PAYLOAD.len());
    packet.extend_from_slice(&[ECHO_REQUEST, 0, 0, 0]);
    packet.extend_from_slice(&ECHO_IDENTIFIER.to_be_bytes());
    packet.extend_from_slice(&seq.to_be_bytes());
    packet.extend_from_slice(&ECHO_PAYLOAD);
    let sum = checksum(&packet);
    packet[2..4].copy_from_slice(&sum.to_be_bytes());
    packet
}

/// Identifier and sequence number of an echo reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub identifier: u16,
    pub seq: u16,
}

/// Parse an ICMP message, returning it only if it is an echo reply.
pub fn parse_echo_reply(icmp: &[u8]) -> Option<EchoReply> {
    if icmp.len() < ICMP_HEADER_LEN || icmp[0] != ECHO_REPLY || icmp[1] != 0 {
        return None;
    }
    Some(EchoReply {
        identifier: u16::from_be_bytes([icmp[4], icmp[5]]),
        seq: u16::from_be_bytes([icmp[6], icmp[7]]),
    })
}

/// Strip the IPv4 header a raw socket delivers in front of the ICMP message.
pub fn strip_ipv4_header(packet: &[u8]) -> Option<&[u8]> {
    let first = *packet.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let header_len = usize::from(first & 0x0F) * 4;
    packet.get(header_len..)
}

/// How the ICMP socket was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpMode {
    /// `SOCK_RAW`: replies include the IP header, identifiers are ours.
    Raw,
    /// Unprivileged `SOCK_DGRAM`: the kernel owns the identifier and strips
    /// the IP header.
    Datagram,
}

/// Socket for sending echo requests and receiving replies.
#[derive(Debug)]
pub struct IcmpSocket {
    socket: UdpSocket,
    mode: IcmpMode,
}

impl IcmpSocket {
    /// Open a raw ICMP socket, falling back to a datagram one.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open() -> io::Result<Self> {
        let (socket, mode) = match Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)) {
            Ok(socket) => (socket, IcmpMode::Raw),
            Err(raw_err) => {
                debug!(error = %raw_err, "raw ICMP socket denied, trying datagram ICMP");
                let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4))?;
                (socket, IcmpMode::Datagram)
            }
        };
        socket.set_nonblocking(true)?;
        let std_socket: StdUdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        debug!(?mode, "ICMP socket open");
        Ok(Self { socket, mode })
    }

    /// Like [`IcmpSocket::open`], but logs and returns `None` on failure.
    pub fn open_or_disable() -> Option<Self> {
        match Self::open() {
            Ok(socket) => Some(socket),
            Err(e) => {
                warn!(error = %e, "ICMP sockets unavailable, ICMP probing disabled");
                None
            }
        }
    }

    pub async fn send_echo(&self, target: Ipv4Addr, seq: u16) -> io::Result<()> {
        let packet = echo_request(seq);
        self.socket
            .send_to(&packet, SocketAddr::new(target.into(), 0))
            .await?;
        Ok(())
    }

    /// Wait for the next echo reply to one of our requests.
    ///
    /// Other ICMP traffic seen by a raw socket is skipped.
    pub async fn recv_reply(&self, buf: &mut [u8]) -> io::Result<(Ipv4Addr, u16)> {
        loop {
            let (len, from) = self.socket.recv_from(buf).await?;
            let SocketAddr::V4(from) = from else {
                continue;
            };
            let packet = &buf[..len];
            let icmp = match self.mode {
                IcmpMode::Raw => match strip_ipv4_header(packet) {
                    Some(icmp) => icmp,
                    None => continue,
                },
                IcmpMode::Datagram => packet,
            };
            let Some(reply) = parse_echo_reply(icmp) else {
                continue;
            };
            if self.mode == IcmpMode::Raw && reply.identifier != ECHO_IDENTIFIER {
                continue;
            }
            return Ok((*from.ip(), reply.seq));
        }
    }
}
