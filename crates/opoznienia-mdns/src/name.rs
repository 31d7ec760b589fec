//! Domain names as sequences of labels.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::WireError;
use crate::wire::Reader;

/// Longest label a length byte may announce.
pub const MAX_LABEL_LEN: usize = 63;

/// Longest encoded name, terminator included.
pub const MAX_NAME_LEN: usize = 255;

/// Most labels accepted in a single name.
pub const MAX_LABELS: usize = 10;

const POINTER_MASK: u8 = 0xC0;

/// An immutable, validated domain name.
///
/// Labels are raw bytes as on the wire and are compared byte for byte;
/// `Local` and `local` are different names. Ordering puts shorter names
/// first and compares labels in order otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DomainName {
    labels: Vec<Vec<u8>>,
}

impl DomainName {
    /// The root name (no labels).
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a name from labels, enforcing the label, length and depth limits.
    pub fn from_labels<I, S>(labels: I) -> Result<Self, WireError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let labels: Vec<Vec<u8>> = labels.into_iter().map(|l| l.as_ref().to_vec()).collect();
        if labels.len() > MAX_LABELS {
            return Err(WireError::TooDeep { max: MAX_LABELS });
        }
        for label in &labels {
            if label.is_empty() {
                return Err(WireError::EmptyLabel);
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(WireError::LabelTooLong {
                    len: label.len(),
                    max: MAX_LABEL_LEN,
                });
            }
        }
        let name = Self { labels };
        let len = name.encoded_len();
        if len > MAX_NAME_LEN {
            return Err(WireError::NameTooLong {
                len,
                max: MAX_NAME_LEN,
            });
        }
        Ok(name)
    }

    /// A new name with `label` in front, e.g. an instance under a service type.
    pub fn prepend(&self, label: &str) -> Result<Self, WireError> {
        Self::from_labels(
            std::iter::once(label.as_bytes()).chain(self.labels.iter().map(Vec::as_slice)),
        )
    }

    pub fn labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Size of the uncompressed wire form.
    pub fn encoded_len(&self) -> usize {
        self.labels.iter().map(|l| 1 + l.len()).sum::<usize>() + 1
    }

    /// Append the uncompressed wire form to `out`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self, out: &mut Vec<u8>) {
        for label in &self.labels {
            // Length checked at construction.
            out.push(label.len() as u8);
            out.extend_from_slice(label);
        }
        out.push(0);
    }

    /// Decode a name at the reader's cursor.
    ///
    /// Compression pointers are followed only backwards, so decoding always
    /// terminates. Labels reached through pointers count toward
    /// [`MAX_LABELS`].
    pub(crate) fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let mut labels = Vec::new();
        let mut pos = reader.position();
        let mut resume = None;

        loop {
            let len = reader.peek_at(pos, 1)?[0];
            match len & POINTER_MASK {
                0x00 if len == 0 => {
                    pos += 1;
                    break;
                }
                0x00 => {
                    if labels.len() == MAX_LABELS {
                        return Err(WireError::TooDeep { max: MAX_LABELS });
                    }
                    labels.push(reader.peek_at(pos + 1, usize::from(len))?.to_vec());
                    pos += 1 + usize::from(len);
                }
                POINTER_MASK => {
                    let low = reader.peek_at(pos + 1, 1)?[0];
                    let target = (usize::from(len & !POINTER_MASK) << 8) | usize::from(low);
                    if target >= pos {
                        return Err(WireError::BadPointer { at: pos, target });
                    }
                    resume.get_or_insert(pos + 2);
                    pos = target;
                }
                _ => return Err(WireError::BadLabelType(len)),
            }
        }

        reader.seek(resume.unwrap_or(pos));
        let name = Self { labels };
        let len = name.encoded_len();
        if len > MAX_NAME_LEN {
            return Err(WireError::NameTooLong {
                len,
                max: MAX_NAME_LEN,
            });
        }
        Ok(name)
    }
}

impl Ord for DomainName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels
            .len()
            .cmp(&other.labels.len())
            .then_with(|| self.labels.cmp(&other.labels))
    }
}

impl PartialOrd for DomainName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for DomainName {
    type Err = WireError;

    /// Parse a dotted name; the trailing root dot is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::from_labels(trimmed.split('.'))
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return f.write_str(".");
        }
        for label in &self.labels {
            write!(f, "{}.", String::from_utf8_lossy(label))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn decode(buf: &[u8]) -> Result<DomainName, WireError> {
        DomainName::decode(&mut Reader::new(buf))
    }

    #[test]
    fn parse_and_display() {
        let name: DomainName = "_opoznienia._udp.local.".parse().unwrap();
        assert_eq!(name.labels(), [b"_opoznienia".to_vec(), b"_udp".to_vec(), b"local".to_vec()]);
        assert_eq!(name.to_string(), "_opoznienia._udp.local.");
        let no_dot: DomainName = "_opoznienia._udp.local".parse().unwrap();
        assert_eq!(name, no_dot);
        assert!(".".parse::<DomainName>().unwrap().is_root());
    }

    #[test]
    fn encode_decode_roundtrip() {
        for text in ["host1.delay.local.", "_ssh._tcp.local.", ".", "a.b.c.d.e.f.g.h.i.j."] {
            let name: DomainName = text.parse().unwrap();
            let mut buf = Vec::new();
            name.encode(&mut buf);
            assert_eq!(buf.len(), name.encoded_len());
            assert_eq!(decode(&buf).unwrap(), name, "{text}");
        }
    }

    #[test]
    fn wire_layout_is_length_prefixed() {
        let name: DomainName = "ab.c".parse().unwrap();
        let mut buf = Vec::new();
        name.encode(&mut buf);
        assert_eq!(buf, [2, b'a', b'b', 1, b'c', 0]);
    }

    #[test]
    fn eleven_labels_are_too_deep() {
        let mut buf = Vec::new();
        for _ in 0..11 {
            buf.extend_from_slice(&[1, b'x']);
        }
        buf.push(0);
        assert_eq!(decode(&buf), Err(WireError::TooDeep { max: MAX_LABELS }));
        assert!(DomainName::from_labels(vec!["x"; 11]).is_err());
    }

    #[test]
    fn missing_terminator_is_truncated() {
        assert!(matches!(
            decode(&[3, b'a', b'b', b'c']),
            Err(WireError::Truncated { .. })
        ));
        assert!(matches!(
            decode(&[5, b'a']),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn reserved_label_types_rejected() {
        assert_eq!(decode(&[0x40, 0]), Err(WireError::BadLabelType(0x40)));
        assert_eq!(decode(&[0x80, 0]), Err(WireError::BadLabelType(0x80)));
    }

    #[test]
    fn follows_backward_pointer() {
        // "local." at 0, then "host" + pointer to 0 at 7.
        let buf = [5, b'l', b'o', b'c', b'a', b'l', 0, 4, b'h', b'o', b's', b't', 0xC0, 0, 0xFF];
        let mut reader = Reader::new(&buf);
        reader.seek(7);
        let name = DomainName::decode(&mut reader).unwrap();
        assert_eq!(name.to_string(), "host.local.");
        // The cursor resumes right after the pointer.
        assert_eq!(reader.position(), 14);
    }

    #[test]
    fn self_pointer_rejected() {
        assert_eq!(
            decode(&[0xC0, 0]),
            Err(WireError::BadPointer { at: 0, target: 0 })
        );
    }

    #[test]
    fn label_limits_at_construction() {
        let long = "x".repeat(64);
        assert!(matches!(
            DomainName::from_labels([long.as_str()]),
            Err(WireError::LabelTooLong { len: 64, .. })
        ));
        assert_eq!(DomainName::from_labels(["a", ""]), Err(WireError::EmptyLabel));
        let label = "y".repeat(63);
        // 5 * 64 + 1 = 321 bytes encoded.
        assert!(matches!(
            DomainName::from_labels(vec![label.as_str(); 5]),
            Err(WireError::NameTooLong { .. })
        ));
    }

    #[test]
    fn ordering_is_length_then_labels() {
        let short: DomainName = "z.local".parse().unwrap();
        let long: DomainName = "a.b.local".parse().unwrap();
        assert!(short < long);
        let a: DomainName = "a.local".parse().unwrap();
        assert!(a < short);
        let upper: DomainName = "A.local".parse().unwrap();
        assert_ne!(upper, a);
    }

    #[test]
    fn prepend_builds_instance_name() {
        let service: DomainName = "_opoznienia._udp.local.".parse().unwrap();
        let instance = service.prepend("host1").unwrap();
        assert_eq!(instance.to_string(), "host1._opoznienia._udp.local.");
    }

    #[test]
    fn non_utf8_label_decodes() {
        let buf = [2, 0xFF, 0xFE, 5, b'l', b'o', b'c', b'a', b'l', 0];
        let name = decode(&buf).unwrap();
        assert_eq!(name.labels()[0], [0xFF, 0xFE]);
        let mut out = Vec::new();
        name.encode(&mut out);
        assert_eq!(out, buf);
        assert_eq!(name.to_string(), "\u{FFFD}\u{FFFD}.local.");
    }

    /// Up to ten labels of 1-63 arbitrary bytes, cut to fit 255 bytes.
    fn valid_labels() -> impl Strategy<Value = Vec<Vec<u8>>> {
        let label = prop::collection::vec(any::<u8>(), 1..=MAX_LABEL_LEN);
        prop::collection::vec(label, 0..=MAX_LABELS).prop_map(|labels| {
            let mut len = 1;
            labels
                .into_iter()
                .take_while(|label| {
                    len += 1 + label.len();
                    len <= MAX_NAME_LEN
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_encode_decode_roundtrip(labels in valid_labels()) {
            let name = DomainName::from_labels(&labels).unwrap();
            let mut buf = Vec::new();
            name.encode(&mut buf);
            prop_assert_eq!(buf.len(), name.encoded_len());
            prop_assert!(buf.len() <= MAX_NAME_LEN);

            let mut reader = Reader::new(&buf);
            let decoded = DomainName::decode(&mut reader).unwrap();
            prop_assert_eq!(reader.position(), buf.len());
            prop_assert_eq!(decoded.labels(), labels.as_slice());
            prop_assert_eq!(decoded, name);
        }

        #[test]
        fn prop_too_many_labels_rejected(count in (MAX_LABELS + 1)..40usize, len in 1..=5usize) {
            let labels = vec![vec![b'x'; len]; count];
            prop_assert_eq!(
                DomainName::from_labels(&labels),
                Err(WireError::TooDeep { max: MAX_LABELS })
            );

            let mut buf = Vec::new();
            for label in &labels {
                buf.push(u8::try_from(len).unwrap());
                buf.extend_from_slice(label);
            }
            buf.push(0);
            prop_assert_eq!(decode(&buf), Err(WireError::TooDeep { max: MAX_LABELS }));
        }

        #[test]
        fn prop_long_label_rejected(len in (MAX_LABEL_LEN + 1)..=255usize) {
            let label = vec![b'y'; len];
            let result = DomainName::from_labels([label.as_slice()]);
            prop_assert!(
                matches!(result, Err(WireError::LabelTooLong { .. })),
                "label of {} bytes accepted", len
            );
        }

        #[test]
        fn prop_long_name_rejected(labels in prop::collection::vec(
            prop::collection::vec(any::<u8>(), 40..=MAX_LABEL_LEN),
            7..=MAX_LABELS,
        )) {
            // At least 7 * 41 + 1 bytes encoded.
            let result = DomainName::from_labels(&labels);
            prop_assert!(
                matches!(result, Err(WireError::NameTooLong { .. })),
                "name of {} labels accepted", labels.len()
            );
        }
    }
}
