//! The authorization model: typed (tag, value) pairs and ordered sets of them.
//!
//! An [`AuthorizationSet`] is the declarative policy attached to a key. It is
//! an ordered, duplicate-preserving sequence: repeated occurrences of a
//! repeatable tag mean "any of these values is authorized", and append never
//! replaces an earlier entry.
//!
//! On the wire a set is `[u32 indirect_len][indirect bytes][u32 count]
//! [entries…]`. Fixed-width values are stored inline in their entry;
//! variable-length values (bytes, bignum) are stored in the indirect-data
//! area and their entry carries `(length, offset)` into it, which keeps the
//! encoding position-independent. In memory every value is owned outright —
//! offsets exist only on the wire.

use bytes::{Buf, BufMut};

use crate::coding::{self, BufExt, BufMutExt, Codec, WireError};
use crate::error::ErrorCode;
use crate::tag::{Tag, TagType};

/// The value half of an authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Enumerated value (`Enum` and `EnumRep` tags)
    Enumerated(u32),
    /// Unsigned 32-bit integer (`Uint` and `UintRep` tags)
    Integer(u32),
    /// Unsigned 64-bit integer (`Ulong` tags)
    LongInteger(u64),
    /// Milliseconds since the Unix epoch (`Date` tags)
    DateTime(i64),
    /// Boolean; a present `Bool` tag always means true
    Bool,
    /// Owned byte string (`Bytes` and `Bignum` tags)
    Blob(Vec<u8>),
}

impl ParamValue {
    fn matches(&self, ty: TagType) -> bool {
        match self {
            ParamValue::Enumerated(_) => matches!(ty, TagType::Enum | TagType::EnumRep),
            ParamValue::Integer(_) => matches!(ty, TagType::Uint | TagType::UintRep),
            ParamValue::LongInteger(_) => ty == TagType::Ulong,
            ParamValue::DateTime(_) => ty == TagType::Date,
            ParamValue::Bool => ty == TagType::Bool,
            ParamValue::Blob(_) => ty.is_blob(),
        }
    }

    fn inline_size(&self) -> usize {
        match self {
            ParamValue::Enumerated(_) | ParamValue::Integer(_) => 4,
            ParamValue::LongInteger(_) | ParamValue::DateTime(_) => 8,
            ParamValue::Bool => 1,
            // length + offset into the indirect-data area
            ParamValue::Blob(_) => 8,
        }
    }
}

/// A single (tag, value) authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParam {
    pub tag: Tag,
    pub value: ParamValue,
}

impl KeyParam {
    pub fn enumerated(tag: Tag, value: u32) -> Self {
        KeyParam {
            tag,
            value: ParamValue::Enumerated(value),
        }
    }

    pub fn integer(tag: Tag, value: u32) -> Self {
        KeyParam {
            tag,
            value: ParamValue::Integer(value),
        }
    }

    pub fn long_integer(tag: Tag, value: u64) -> Self {
        KeyParam {
            tag,
            value: ParamValue::LongInteger(value),
        }
    }

    pub fn date_time(tag: Tag, value: i64) -> Self {
        KeyParam {
            tag,
            value: ParamValue::DateTime(value),
        }
    }

    pub fn boolean(tag: Tag) -> Self {
        KeyParam {
            tag,
            value: ParamValue::Bool,
        }
    }

    pub fn blob(tag: Tag, data: impl Into<Vec<u8>>) -> Self {
        KeyParam {
            tag,
            value: ParamValue::Blob(data.into()),
        }
    }
}

/// Ordered, duplicate-preserving set of authorizations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationSet {
    params: Vec<KeyParam>,
}

impl AuthorizationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyParam> {
        self.params.iter()
    }

    /// Append an authorization. The value must agree with the tag's declared
    /// type; a mismatch (only reachable through [`Tag::from_raw`]) is
    /// rejected rather than stored, so a set can always be serialized.
    pub fn push(&mut self, param: KeyParam) -> Result<(), ErrorCode> {
        if param.tag.tag_type() == TagType::Invalid || !param.value.matches(param.tag.tag_type()) {
            return Err(ErrorCode::InvalidTag);
        }
        self.params.push(param);
        Ok(())
    }

    /// Append every authorization from `other`, preserving order
    pub fn extend(&mut self, other: &AuthorizationSet) {
        self.params.extend(other.params.iter().cloned());
    }

    /// First occurrence of `tag`
    pub fn get(&self, tag: Tag) -> Option<&KeyParam> {
        self.params.iter().find(|p| p.tag == tag)
    }

    /// Index of the first occurrence of `tag` at or after `start`, for
    /// iterating repeatable tags
    pub fn find_from(&self, tag: Tag, start: usize) -> Option<usize> {
        self.params[start.min(self.params.len())..]
            .iter()
            .position(|p| p.tag == tag)
            .map(|i| start + i)
    }

    pub fn param_at(&self, index: usize) -> Option<&KeyParam> {
        self.params.get(index)
    }

    pub fn enum_value(&self, tag: Tag) -> Option<u32> {
        match self.get(tag)?.value {
            ParamValue::Enumerated(v) => Some(v),
            _ => None,
        }
    }

    pub fn int_value(&self, tag: Tag) -> Option<u32> {
        match self.get(tag)?.value {
            ParamValue::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn long_value(&self, tag: Tag) -> Option<u64> {
        match self.get(tag)?.value {
            ParamValue::LongInteger(v) => Some(v),
            _ => None,
        }
    }

    pub fn date_value(&self, tag: Tag) -> Option<i64> {
        match self.get(tag)?.value {
            ParamValue::DateTime(v) => Some(v),
            _ => None,
        }
    }

    /// Whether a boolean tag is present (presence means true)
    pub fn bool_value(&self, tag: Tag) -> bool {
        self.get(tag).is_some()
    }

    pub fn blob_value(&self, tag: Tag) -> Option<&[u8]> {
        match &self.get(tag)?.value {
            ParamValue::Blob(data) => Some(data),
            _ => None,
        }
    }

    /// Whether any occurrence of an enumerated tag carries `value`
    pub fn contains_enum(&self, tag: Tag, value: u32) -> bool {
        self.params
            .iter()
            .any(|p| p.tag == tag && p.value == ParamValue::Enumerated(value))
    }

    /// Whether any occurrence of an integer tag carries `value`
    pub fn contains_int(&self, tag: Tag, value: u32) -> bool {
        self.params
            .iter()
            .any(|p| p.tag == tag && p.value == ParamValue::Integer(value))
    }

    fn indirect_size(&self) -> usize {
        self.params
            .iter()
            .map(|p| match &p.value {
                ParamValue::Blob(data) => data.len(),
                _ => 0,
            })
            .sum()
    }

    /// Exact number of bytes [`encode`](Self::encode) will write. Computable
    /// without allocating.
    pub fn serialized_size(&self) -> usize {
        4 + self.indirect_size()
            + 4
            + self
                .params
                .iter()
                .map(|p| 4 + p.value.inline_size())
                .sum::<usize>()
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u32>(self.indirect_size() as u32);
        for param in &self.params {
            if let ParamValue::Blob(data) = &param.value {
                buf.put_slice(data);
            }
        }

        buf.write::<u32>(self.params.len() as u32);
        let mut offset = 0u32;
        for param in &self.params {
            param.tag.encode(buf);
            match &param.value {
                ParamValue::Enumerated(v) | ParamValue::Integer(v) => buf.write::<u32>(*v),
                ParamValue::LongInteger(v) => buf.write::<u64>(*v),
                ParamValue::DateTime(v) => buf.write::<i64>(*v),
                ParamValue::Bool => buf.write::<u8>(1),
                ParamValue::Blob(data) => {
                    buf.write::<u32>(data.len() as u32);
                    buf.write::<u32>(offset);
                    offset += data.len() as u32;
                }
            }
        }
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.encode(&mut buf);
        buf
    }

    /// Decode a set, validating every blob's (offset, length) window against
    /// the indirect-data area. On any failure the result carries no partial
    /// state.
    pub fn decode<B: Buf>(buf: &mut B) -> coding::Result<Self> {
        let indirect = buf.get_byte_string()?;

        let count = buf.get::<u32>()? as usize;
        // The smallest possible entry is a bool: tag plus one byte.
        if count.checked_mul(5).map_or(true, |n| n > buf.remaining()) {
            return Err(WireError::UnexpectedEnd);
        }

        let mut params = Vec::with_capacity(count);
        let mut covered = 0usize;
        for _ in 0..count {
            let tag = Tag::decode(buf)?;
            let value = match tag.tag_type() {
                TagType::Invalid => return Err(WireError::Malformed("tag type")),
                TagType::Enum | TagType::EnumRep => ParamValue::Enumerated(buf.get::<u32>()?),
                TagType::Uint | TagType::UintRep => ParamValue::Integer(buf.get::<u32>()?),
                TagType::Ulong => ParamValue::LongInteger(buf.get::<u64>()?),
                TagType::Date => ParamValue::DateTime(buf.get::<i64>()?),
                TagType::Bool => {
                    if buf.get::<u8>()? != 1 {
                        return Err(WireError::Malformed("bool param"));
                    }
                    ParamValue::Bool
                }
                TagType::Bignum | TagType::Bytes => {
                    let len = buf.get::<u32>()? as usize;
                    let offset = buf.get::<u32>()? as usize;
                    let end = offset
                        .checked_add(len)
                        .ok_or(WireError::Malformed("blob bounds"))?;
                    if end > indirect.len() {
                        return Err(WireError::Malformed("blob bounds"));
                    }
                    covered += len;
                    ParamValue::Blob(indirect[offset..end].to_vec())
                }
            };
            params.push(KeyParam { tag, value });
        }

        // Every indirect byte must belong to exactly one blob entry.
        if covered != indirect.len() {
            return Err(WireError::Malformed("indirect data"));
        }

        Ok(AuthorizationSet { params })
    }
}

impl FromIterator<KeyParam> for AuthorizationSet {
    fn from_iter<I: IntoIterator<Item = KeyParam>>(iter: I) -> Self {
        let mut set = AuthorizationSet::new();
        for param in iter {
            // Typed constructors cannot produce a mismatched value.
            let _ = set.push(param);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Cursor;

    fn sample_set() -> AuthorizationSet {
        [
            KeyParam::enumerated(Tag::ALGORITHM, 1),
            KeyParam::enumerated(Tag::PURPOSE, 2),
            KeyParam::enumerated(Tag::PURPOSE, 3),
            KeyParam::integer(Tag::KEY_SIZE, 2048),
            KeyParam::long_integer(Tag::RSA_PUBLIC_EXPONENT, 65537),
            KeyParam::date_time(Tag::CREATION_DATETIME, 1_400_000_000_000),
            KeyParam::boolean(Tag::CALLER_NONCE),
            KeyParam::blob(Tag::APPLICATION_ID, &b"app_id"[..]),
            KeyParam::blob(Tag::DSA_P, &b"\x01\x02\x03"[..]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn roundtrip() {
        let set = sample_set();
        let encoded = set.encode_to_vec();
        assert_eq!(encoded.len(), set.serialized_size());
        let mut r = Cursor::new(&encoded[..]);
        let decoded = AuthorizationSet::decode(&mut r).unwrap();
        assert_eq!(decoded, set);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn append_preserves_duplicates_in_order() {
        let set = sample_set();
        assert_eq!(set.find_from(Tag::PURPOSE, 0), Some(1));
        assert_eq!(set.find_from(Tag::PURPOSE, 2), Some(2));
        assert_eq!(set.find_from(Tag::PURPOSE, 3), None);
        assert!(set.contains_enum(Tag::PURPOSE, 2));
        assert!(set.contains_enum(Tag::PURPOSE, 3));
        assert!(!set.contains_enum(Tag::PURPOSE, 0));
    }

    #[test]
    fn typed_lookups() {
        let set = sample_set();
        assert_eq!(set.enum_value(Tag::ALGORITHM), Some(1));
        assert_eq!(set.int_value(Tag::KEY_SIZE), Some(2048));
        assert_eq!(set.long_value(Tag::RSA_PUBLIC_EXPONENT), Some(65537));
        assert_eq!(set.date_value(Tag::CREATION_DATETIME), Some(1_400_000_000_000));
        assert!(set.bool_value(Tag::CALLER_NONCE));
        assert!(!set.bool_value(Tag::ROLLBACK_RESISTANT));
        assert_eq!(set.blob_value(Tag::APPLICATION_ID), Some(&b"app_id"[..]));
        assert_eq!(set.enum_value(Tag::DIGEST), None);
    }

    #[test]
    fn push_rejects_mismatched_type() {
        let mut set = AuthorizationSet::new();
        let bogus = KeyParam {
            tag: Tag::KEY_SIZE,
            value: ParamValue::Blob(vec![1]),
        };
        assert_eq!(set.push(bogus), Err(ErrorCode::InvalidTag));
        assert!(set.is_empty());
    }

    #[test]
    fn push_rejects_invalid_tag_type() {
        let mut set = AuthorizationSet::new();
        let bogus = KeyParam {
            tag: Tag::from_raw(0xf000_0001),
            value: ParamValue::Integer(1),
        };
        assert_eq!(set.push(bogus), Err(ErrorCode::InvalidTag));
    }

    #[test]
    fn decode_rejects_blob_outside_indirect_area() {
        let mut set = AuthorizationSet::new();
        set.push(KeyParam::blob(Tag::APPLICATION_ID, &b"abc"[..]))
            .unwrap();
        let mut encoded = set.encode_to_vec();
        // Entry layout: indirect(4+3) count(4) tag(4) len(4) offset(4).
        // Push the offset past the indirect area.
        let offset_pos = encoded.len() - 4;
        encoded[offset_pos] = 2;
        let mut r = Cursor::new(&encoded[..]);
        assert_matches!(
            AuthorizationSet::decode(&mut r),
            Err(WireError::Malformed(_))
        );
    }

    #[test]
    fn decode_rejects_uncovered_indirect_bytes() {
        let mut set = AuthorizationSet::new();
        set.push(KeyParam::blob(Tag::APPLICATION_ID, &b"abc"[..]))
            .unwrap();
        let mut encoded = set.encode_to_vec();
        // Shrink the blob length so one indirect byte is unclaimed.
        let len_pos = encoded.len() - 8;
        encoded[len_pos] = 2;
        let mut r = Cursor::new(&encoded[..]);
        assert_matches!(
            AuthorizationSet::decode(&mut r),
            Err(WireError::Malformed(_))
        );
    }

    #[test]
    fn decode_rejects_truncation() {
        let set = sample_set();
        let encoded = set.encode_to_vec();
        for cut in 0..encoded.len() {
            let mut r = Cursor::new(&encoded[..cut]);
            assert!(AuthorizationSet::decode(&mut r).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn decode_rejects_entry_count_past_buffer() {
        let mut buf = Vec::new();
        buf.write_byte_string(b"");
        buf.write::<u32>(u32::MAX);
        let mut r = Cursor::new(&buf[..]);
        assert_eq!(
            AuthorizationSet::decode(&mut r),
            Err(WireError::UnexpectedEnd)
        );
    }

    #[test]
    fn empty_set_roundtrip() {
        let set = AuthorizationSet::new();
        let encoded = set.encode_to_vec();
        assert_eq!(encoded.len(), 8);
        let mut r = Cursor::new(&encoded[..]);
        assert_eq!(AuthorizationSet::decode(&mut r).unwrap(), set);
    }
}
