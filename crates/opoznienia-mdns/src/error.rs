//! Wire codec errors.

use thiserror::Error;

/// A protocol violation found while encoding or decoding a message.
///
/// Every variant means the packet must be dropped; none is fatal to the
/// receiver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("truncated message: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("domain name has more than {max} labels")]
    TooDeep { max: usize },

    #[error("label of {len} bytes exceeds {max}")]
    LabelTooLong { len: usize, max: usize },

    #[error("empty label inside domain name")]
    EmptyLabel,

    #[error("encoded domain name of {len} bytes exceeds {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("unsupported label type byte {0:#04x}")]
    BadLabelType(u8),

    #[error("compression pointer to offset {target} from offset {at} does not point backwards")]
    BadPointer { at: usize, target: usize },

    #[error("unknown resource record type {0}")]
    UnknownRRType(u16),

    #[error("record length mismatch: declared {declared}, payload {actual}")]
    LengthMismatch { declared: u16, actual: usize },

    #[error("payload does not match record type {0}")]
    WrongPayload(&'static str),

    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    #[error("expected a {expected}, got a {got}")]
    UnexpectedKind {
        expected: &'static str,
        got: &'static str,
    },

    #[error("too many {0} for one message")]
    TooManyEntries(&'static str),
}
