//! The fixed 12-byte message header.

use crate::error::WireError;
use crate::wire::Reader;

/// Encoded header size.
pub const HEADER_LEN: usize = 12;

const QR_BIT: u8 = 0x80;
const OPCODE_SHIFT: u8 = 3;
const OPCODE_MASK: u8 = 0x0F;
const AA_BIT: u8 = 0x04;
const TC_BIT: u8 = 0x02;
const RCODE_MASK: u8 = 0x0F;

/// Whether a message asks or answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Query,
    Response,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Response => "response",
        }
    }
}

/// Decoded header fields.
///
/// Byte 2 carries QR (bit 7), OPCODE (bits 6-3), AA (bit 2) and TC
/// (bit 1); the low nibble of byte 3 is RCODE. RD, RA and the reserved
/// bits are written as zero and ignored on receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub id: u16,
    pub response: bool,
    pub opcode: u8,
    pub authoritative: bool,
    pub truncated: bool,
    pub rcode: u8,
    pub questions: u16,
    pub answers: u16,
    pub authority: u16,
    pub additional: u16,
}

impl Header {
    /// Header for a standard query with `questions` entries.
    pub fn query(id: u16, questions: u16) -> Self {
        Self {
            id,
            questions,
            ..Self::default()
        }
    }

    /// Header for an authoritative response with `answers` entries.
    pub fn response(id: u16, answers: u16) -> Self {
        Self {
            id,
            response: true,
            authoritative: true,
            answers,
            ..Self::default()
        }
    }

    /// Classify the message, rejecting non-zero opcode or rcode.
    ///
    /// Must succeed before any question or answer is read: the counts of a
    /// header of the wrong kind cannot be trusted.
    pub fn kind(&self) -> Result<MessageKind, WireError> {
        if self.opcode != 0 {
            return Err(WireError::InvalidHeader("non-zero opcode"));
        }
        if self.rcode != 0 {
            return Err(WireError::InvalidHeader("non-zero rcode"));
        }
        Ok(if self.response {
            MessageKind::Response
        } else {
            MessageKind::Query
        })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut flags_hi = (self.opcode & OPCODE_MASK) << OPCODE_SHIFT;
        if self.response {
            flags_hi |= QR_BIT;
        }
        if self.authoritative {
            flags_hi |= AA_BIT;
        }
        if self.truncated {
            flags_hi |= TC_BIT;
        }
        let flags_lo = self.rcode & RCODE_MASK;

        out.extend_from_slice(&self.id.to_be_bytes());
        out.push(flags_hi);
        out.push(flags_lo);
        for count in [self.questions, self.answers, self.authority, self.additional] {
            out.extend_from_slice(&count.to_be_bytes());
        }
    }

    pub(crate) fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let id = reader.u16()?;
        let flags_hi = reader.u8()?;
        let flags_lo = reader.u8()?;
        Ok(Self {
            id,
            response: flags_hi & QR_BIT != 0,
            opcode: (flags_hi >> OPCODE_SHIFT) & OPCODE_MASK,
            authoritative: flags_hi & AA_BIT != 0,
            truncated: flags_hi & TC_BIT != 0,
            rcode: flags_lo & RCODE_MASK,
            questions: reader.u16()?,
            answers: reader.u16()?,
            authority: reader.u16()?,
            additional: reader.u16()?,
        })
    }

    /// Decode only the header of a packet.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        Self::decode(&mut Reader::new(buf))
    }
}
