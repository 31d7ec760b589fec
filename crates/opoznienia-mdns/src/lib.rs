//! Multicast DNS wire codec for opoznienia.
//!
//! This crate encodes and decodes the subset of DNS used for service
//! discovery: the 12-byte header, label-encoded domain names, questions,
//! and PTR/A resource records. It is pure and performs no I/O; sockets
//! live in `opoznienia-discovery`.
//!
//! All integers are big-endian on the wire.

pub mod error;
pub mod header;
pub mod message;
pub mod name;
pub mod record;
mod wire;

pub use error::WireError;
pub use header::{Header, MessageKind, HEADER_LEN};
pub use message::{Message, Query, Response, MAX_PACKET_SIZE};
pub use name::DomainName;
pub use record::{Answer, QType, Question, RecordData, RecordType, ResourceRecord, CLASS_IN};
