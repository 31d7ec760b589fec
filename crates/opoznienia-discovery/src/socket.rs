//! The multicast DNS socket.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket};

use opoznienia_mdns::Message;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::error::DiscoveryError;

/// Link-local multicast group for mDNS.
pub const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// Standard mDNS port.
pub const MDNS_PORT: u16 = 5353;

/// A UDP socket joined to the mDNS group, sending to it by default.
///
/// All methods take `&self`, so one socket can be shared between a
/// reader task and the sender behind an `Arc`.
#[derive(Debug)]
pub struct MdnsSocket {
    socket: UdpSocket,
    group: SocketAddrV4,
}

impl MdnsSocket {
    /// Bind `0.0.0.0:port` with address reuse and join `group`.
    ///
    /// Other responders (avahi, mDNSResponder) usually hold the same port,
    /// so `SO_REUSEADDR` and, on unix, `SO_REUSEPORT` are set before bind.
    /// Must be called inside a tokio runtime.
    pub fn bind(group: Ipv4Addr, port: u16) -> Result<Self, DiscoveryError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket.bind(&bind_addr.into())?;
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_multicast_ttl_v4(255)?;
        socket.set_nonblocking(true)?;

        let std_socket: StdUdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        debug!(%group, port, "joined mDNS group");

        Ok(Self {
            socket,
            group: SocketAddrV4::new(group, port),
        })
    }

    /// Encode `message` and multicast it to the group.
    pub async fn send(&self, message: &Message) -> Result<(), DiscoveryError> {
        let bytes = message.encode()?;
        self.socket.send_to(&bytes, self.group).await?;
        trace!(kind = message.kind().as_str(), len = bytes.len(), "sent mDNS packet");
        Ok(())
    }

    /// Receive one raw packet.
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// The local IPv4 address the kernel would use to reach `target`.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn local_ipv4(target: SocketAddrV4) -> io::Result<Ipv4Addr> {
    let probe = StdUdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
    probe.connect(target)?;
    match probe.local_addr()? {
        SocketAddr::V4(addr) => Ok(*addr.ip()),
        SocketAddr::V6(addr) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("route to {target} uses IPv6 source {addr}"),
        )),
    }
}
