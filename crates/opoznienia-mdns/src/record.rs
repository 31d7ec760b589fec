//! Questions and resource records.

use std::net::Ipv4Addr;

use crate::error::WireError;
use crate::name::DomainName;
use crate::wire::Reader;

/// The INTERNET class.
pub const CLASS_IN: u16 = 1;

const TYPE_A: u16 = 1;
const TYPE_PTR: u16 = 12;

/// Record types this codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ptr,
}

impl RecordType {
    pub fn code(self) -> u16 {
        match self {
            Self::A => TYPE_A,
            Self::Ptr => TYPE_PTR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Ptr => "PTR",
        }
    }
}

impl TryFrom<u16> for RecordType {
    type Error = WireError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            TYPE_A => Ok(Self::A),
            TYPE_PTR => Ok(Self::Ptr),
            other => Err(WireError::UnknownRRType(other)),
        }
    }
}

/// Type asked for by a question.
///
/// Other hosts ask for types this codec cannot answer (SRV, TXT, AAAA,
/// ...); those decode as [`QType::Other`] so the rest of the query is
/// still usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QType {
    Known(RecordType),
    Other(u16),
}

impl QType {
    pub const A: QType = QType::Known(RecordType::A);
    pub const PTR: QType = QType::Known(RecordType::Ptr);

    pub fn code(self) -> u16 {
        match self {
            Self::Known(t) => t.code(),
            Self::Other(code) => code,
        }
    }
}

impl From<u16> for QType {
    fn from(code: u16) -> Self {
        RecordType::try_from(code).map_or(Self::Other(code), Self::Known)
    }
}

/// One entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: DomainName,
    pub qtype: QType,
    pub qclass: u16,
}

impl Question {
    pub fn new(name: DomainName, qtype: RecordType) -> Self {
        Self {
            name,
            qtype: QType::Known(qtype),
            qclass: CLASS_IN,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.name.encode(out);
        out.extend_from_slice(&self.qtype.code().to_be_bytes());
        out.extend_from_slice(&self.qclass.to_be_bytes());
    }

    pub(crate) fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            name: DomainName::decode(reader)?,
            qtype: QType::from(reader.u16()?),
            qclass: reader.u16()?,
        })
    }
}

/// Record payload; the variant is the record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    Ptr(DomainName),
    A(Ipv4Addr),
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Ptr(_) => RecordType::Ptr,
            Self::A(_) => RecordType::A,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::Ptr(name) => name.encoded_len(),
            Self::A(_) => 4,
        }
    }
}

/// Class, TTL and typed payload of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    class: u16,
    ttl: u32,
    data: RecordData,
}

impl ResourceRecord {
    /// Build a record whose payload must match the declared type.
    pub fn new(
        rtype: RecordType,
        class: u16,
        ttl: u32,
        data: RecordData,
    ) -> Result<Self, WireError> {
        if data.record_type() != rtype {
            return Err(WireError::WrongPayload(rtype.as_str()));
        }
        Ok(Self { class, ttl, data })
    }

    pub fn ptr(ttl: u32, target: DomainName) -> Self {
        Self {
            class: CLASS_IN,
            ttl,
            data: RecordData::Ptr(target),
        }
    }

    pub fn a(ttl: u32, addr: Ipv4Addr) -> Self {
        Self {
            class: CLASS_IN,
            ttl,
            data: RecordData::A(addr),
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.data.record_type()
    }

    pub fn class(&self) -> u16 {
        self.class
    }

    /// Advertised validity in seconds.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        let len = u16::try_from(self.data.encoded_len())
            .map_err(|_| WireError::TooManyEntries("record bytes"))?;
        out.extend_from_slice(&self.record_type().code().to_be_bytes());
        out.extend_from_slice(&self.class.to_be_bytes());
        out.extend_from_slice(&self.ttl.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        match &self.data {
            RecordData::Ptr(name) => name.encode(out),
            RecordData::A(addr) => out.extend_from_slice(&addr.octets()),
        }
        Ok(())
    }

    /// Decode the fixed fields and payload following an owner name.
    pub(crate) fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let rtype = RecordType::try_from(reader.u16()?)?;
        let class = reader.u16()?;
        let ttl = reader.u32()?;
        let declared = reader.u16()?;
        let start = reader.position();
        // The whole payload must be present before it is interpreted.
        reader.peek_at(start, usize::from(declared))?;

        let data = match rtype {
            RecordType::A => {
                if declared != 4 {
                    return Err(WireError::LengthMismatch {
                        declared,
                        actual: 4,
                    });
                }
                let b = reader.bytes(4)?;
                RecordData::A(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
            }
            RecordType::Ptr => {
                let target = DomainName::decode(reader)?;
                let actual = reader.position() - start;
                if actual != usize::from(declared) {
                    return Err(WireError::LengthMismatch { declared, actual });
                }
                RecordData::Ptr(target)
            }
        };
        Ok(Self { class, ttl, data })
    }
}

/// One entry of the answer section: owner name plus record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub name: DomainName,
    pub record: ResourceRecord,
}

impl Answer {
    pub fn new(name: DomainName, record: ResourceRecord) -> Self {
        Self { name, record }
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), WireError> {
        self.name.encode(out);
        self.record.encode(out)
    }

    pub(crate) fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            name: DomainName::decode(reader)?,
            record: ResourceRecord::decode(reader)?,
        })
    }
}
