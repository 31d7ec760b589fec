//! Shared types for opoznienia.
//!
//! This crate contains the types shared across the opoznienia workspace:
//! measurement protocols, advertised services, per-protocol records, the
//! read-only latency snapshot consumed by user interfaces, and the
//! microsecond clock every measurement is stamped with.

pub mod clock;
pub mod protocol;
pub mod snapshot;

pub use clock::now_us;
pub use protocol::{PerProtocol, Protocol, Service};
pub use snapshot::{HostSnapshot, Snapshot};

/// Number of completed measurements averaged per protocol.
pub const AVERAGED_MEASUREMENTS: usize = 10;

/// Number of in-flight probes remembered per protocol.
pub const MAX_DELAYED_QUERIES: usize = 10;

/// Microseconds in one second.
pub const USEC_PER_SEC: u64 = 1_000_000;
