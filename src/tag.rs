//! Authorization tags.
//!
//! A tag is a 32-bit identifier whose top 4 bits carry the type of the value
//! it pairs with. The type nibble is authoritative: a tag whose nibble does
//! not name a known type is invalid, and a value stored under a tag must
//! agree with the tag's type or serialization refuses it.

use std::fmt;

use bytes::{Buf, BufMut};

use crate::coding::{self, BufExt, BufMutExt, Codec};

/// Value type carried in the top 4 bits of a tag
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TagType {
    /// Unrecognized type nibble
    Invalid,
    /// Enumerated `u32`, at most one occurrence per set
    Enum,
    /// Enumerated `u32`, repeatable
    EnumRep,
    /// Unsigned 32-bit integer
    Uint,
    /// Unsigned 32-bit integer, repeatable
    UintRep,
    /// Unsigned 64-bit integer
    Ulong,
    /// Milliseconds since the Unix epoch, signed
    Date,
    /// Boolean; presence means true
    Bool,
    /// Variable-length big-endian integer
    Bignum,
    /// Variable-length byte string
    Bytes,
}

impl TagType {
    const SHIFT: u32 = 28;

    fn from_nibble(nibble: u32) -> Self {
        match nibble {
            1 => TagType::Enum,
            2 => TagType::EnumRep,
            3 => TagType::Uint,
            4 => TagType::UintRep,
            5 => TagType::Ulong,
            6 => TagType::Date,
            7 => TagType::Bool,
            8 => TagType::Bignum,
            9 => TagType::Bytes,
            _ => TagType::Invalid,
        }
    }

    const fn nibble(self) -> u32 {
        match self {
            TagType::Invalid => 0,
            TagType::Enum => 1,
            TagType::EnumRep => 2,
            TagType::Uint => 3,
            TagType::UintRep => 4,
            TagType::Ulong => 5,
            TagType::Date => 6,
            TagType::Bool => 7,
            TagType::Bignum => 8,
            TagType::Bytes => 9,
        }
    }

    /// Whether values of this type live in the indirect-data area
    pub fn is_blob(self) -> bool {
        matches!(self, TagType::Bignum | TagType::Bytes)
    }

    /// Whether more than one occurrence of the tag is meaningful
    pub fn is_repeatable(self) -> bool {
        matches!(self, TagType::EnumRep | TagType::UintRep)
    }
}

/// A 32-bit authorization tag
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Tag(u32);

macro_rules! tags {
    {$($name:ident = $ty:ident | $num:expr,)*} => {
        impl Tag {
            $(pub const $name: Tag = Tag((TagType::$ty.nibble() << TagType::SHIFT) | $num);)*
        }

        impl fmt::Debug for Tag {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match *self {
                    $(Tag::$name => f.write_str(stringify!($name)),)*
                    Tag(raw) => write!(f, "Tag({:#010x})", raw),
                }
            }
        }
    }
}

tags! {
    PURPOSE = EnumRep | 1,
    ALGORITHM = Enum | 2,
    KEY_SIZE = Uint | 3,
    BLOCK_MODE = Enum | 4,
    DIGEST = Enum | 5,
    MAC_LENGTH = Uint | 6,
    PADDING = Enum | 7,
    CALLER_NONCE = Bool | 8,
    CHUNK_LENGTH = Uint | 9,
    NONCE = Bytes | 10,
    RSA_PUBLIC_EXPONENT = Ulong | 200,
    DSA_GENERATOR = Bignum | 201,
    DSA_P = Bignum | 202,
    DSA_Q = Bignum | 203,
    USER_ID = Uint | 501,
    USER_AUTH_ID = UintRep | 502,
    AUTH_TIMEOUT = Uint | 503,
    APPLICATION_ID = Bytes | 601,
    APPLICATION_DATA = Bytes | 700,
    CREATION_DATETIME = Date | 701,
    ORIGIN = Enum | 702,
    ROLLBACK_RESISTANT = Bool | 703,
    ROOT_OF_TRUST = Bytes | 704,
}

impl Tag {
    /// Reconstruct a tag from its wire representation. The result may have an
    /// invalid type nibble; callers dispatching on [`Tag::tag_type`] must
    /// treat that as malformed input.
    pub fn from_raw(raw: u32) -> Self {
        Tag(raw)
    }

    /// The wire representation
    pub fn raw(self) -> u32 {
        self.0
    }

    /// The value type encoded in the top 4 bits
    pub fn tag_type(self) -> TagType {
        TagType::from_nibble(self.0 >> TagType::SHIFT)
    }
}

impl Codec for Tag {
    fn decode<B: Buf>(buf: &mut B) -> coding::Result<Self> {
        Ok(Tag(buf.get::<u32>()?))
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write::<u32>(self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_nibble() {
        assert_eq!(Tag::PURPOSE.tag_type(), TagType::EnumRep);
        assert_eq!(Tag::ALGORITHM.tag_type(), TagType::Enum);
        assert_eq!(Tag::KEY_SIZE.tag_type(), TagType::Uint);
        assert_eq!(Tag::RSA_PUBLIC_EXPONENT.tag_type(), TagType::Ulong);
        assert_eq!(Tag::CREATION_DATETIME.tag_type(), TagType::Date);
        assert_eq!(Tag::CALLER_NONCE.tag_type(), TagType::Bool);
        assert_eq!(Tag::DSA_P.tag_type(), TagType::Bignum);
        assert_eq!(Tag::APPLICATION_ID.tag_type(), TagType::Bytes);
    }

    #[test]
    fn invalid_nibble() {
        assert_eq!(Tag::from_raw(0x0000_0001).tag_type(), TagType::Invalid);
        assert_eq!(Tag::from_raw(0xa000_0001).tag_type(), TagType::Invalid);
    }

    #[test]
    fn raw_roundtrip() {
        let raw = Tag::USER_AUTH_ID.raw();
        assert_eq!(Tag::from_raw(raw), Tag::USER_AUTH_ID);
    }

    #[test]
    fn blob_classification() {
        assert!(Tag::ROOT_OF_TRUST.tag_type().is_blob());
        assert!(Tag::DSA_GENERATOR.tag_type().is_blob());
        assert!(!Tag::KEY_SIZE.tag_type().is_blob());
    }
}
