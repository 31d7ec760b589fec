//! Mock probe transport for testing.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::transport::ProbeTransport;

/// A probe the engine asked the transport to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentProbe {
    Udp { target: SocketAddrV4, timestamp: u64 },
    Icmp { target: Ipv4Addr, seq: u16 },
    Tcp { target: SocketAddrV4 },
}

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<SentProbe>,
    refuse_tcp: HashSet<Ipv4Addr>,
    hang_tcp: HashSet<Ipv4Addr>,
    fail_udp: bool,
}

/// Records every probe instead of sending it.
///
/// Clones share state, so a test keeps one handle and gives another to
/// the engine.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    icmp: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            icmp: true,
        }
    }

    /// A transport reporting ICMP as unavailable.
    pub fn without_icmp() -> Self {
        Self {
            icmp: false,
            ..Self::new()
        }
    }

    /// Make TCP connects to `addr` fail immediately.
    pub fn refuse_tcp(&self, addr: Ipv4Addr) {
        self.state.lock().unwrap().refuse_tcp.insert(addr);
    }

    /// Make TCP connects to `addr` never complete.
    pub fn hang_tcp(&self, addr: Ipv4Addr) {
        self.state.lock().unwrap().hang_tcp.insert(addr);
    }

    /// Make every UDP send fail.
    pub fn fail_udp(&self) {
        self.state.lock().unwrap().fail_udp = true;
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentProbe> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Forget recorded probes.
    pub fn clear(&self) {
        self.state.lock().unwrap().sent.clear();
    }
}

#[async_trait]
impl ProbeTransport for MockTransport {
    async fn send_udp(&self, target: SocketAddrV4, timestamp: u64) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(SentProbe::Udp { target, timestamp });
        if state.fail_udp {
            return Err(TransportError::Send(std::io::Error::new(
                std::io::ErrorKind::NetworkUnreachable,
                "mock UDP failure",
            )));
        }
        Ok(())
    }

    async fn send_icmp(&self, target: Ipv4Addr, seq: u16) -> Result<(), TransportError> {
        if !self.icmp {
            return Err(TransportError::IcmpUnavailable);
        }
        self.state
            .lock()
            .unwrap()
            .sent
            .push(SentProbe::Icmp { target, seq });
        Ok(())
    }

    async fn connect_tcp(
        &self,
        target: SocketAddrV4,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let (refuse, hang) = {
            let mut state = self.state.lock().unwrap();
            state.sent.push(SentProbe::Tcp { target });
            (
                state.refuse_tcp.contains(target.ip()),
                state.hang_tcp.contains(target.ip()),
            )
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if refuse {
            return Err(TransportError::Connect {
                target,
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn icmp_available(&self) -> bool {
        self.icmp
    }
}
