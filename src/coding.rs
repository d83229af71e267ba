//! Primitive wire codecs.
//!
//! Every multi-byte integer on the wire is little-endian and fixed width.
//! Variable-length data is length-prefixed with a `u32`. Readers never trust
//! a length prefix: a prefix that would run past the end of the buffer is an
//! error, not an allocation.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Error produced when decoding runs off the end of the buffer or a field
/// fails structural validation.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum WireError {
    /// The buffer ended before the field did
    #[error("unexpected end of buffer")]
    UnexpectedEnd,
    /// The bytes were present but did not form a valid value
    #[error("malformed {0}")]
    Malformed(&'static str),
}

/// Coding result type
pub type Result<T> = ::std::result::Result<T, WireError>;

/// Infallible encoding and bounds-checked decoding of wire primitives
pub trait Codec: Sized {
    /// Decode a `Self` from the provided buffer, if the buffer is large enough
    fn decode<B: Buf>(buf: &mut B) -> Result<Self>;
    /// Append the encoding of `self` to the provided buffer
    fn encode<B: BufMut>(&self, buf: &mut B);
}

impl Codec for u8 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(WireError::UnexpectedEnd);
        }
        Ok(buf.get_u8())
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(*self);
    }
}

impl Codec for u32 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(WireError::UnexpectedEnd);
        }
        Ok(buf.get_u32_le())
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(*self);
    }
}

impl Codec for u64 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 8 {
            return Err(WireError::UnexpectedEnd);
        }
        Ok(buf.get_u64_le())
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64_le(*self);
    }
}

impl Codec for i64 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 8 {
            return Err(WireError::UnexpectedEnd);
        }
        Ok(buf.get_i64_le())
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i64_le(*self);
    }
}

impl Codec for bool {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        match u8::decode(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(WireError::Malformed("bool")),
        }
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(u8::from(*self));
    }
}

/// Extension trait for reading from buffers
pub trait BufExt {
    /// Read and decode a value from the buffer
    fn get<T: Codec>(&mut self) -> Result<T>;
    /// Read a `u32`-length-prefixed byte string
    fn get_byte_string(&mut self) -> Result<Vec<u8>>;
    /// Read a `u32`-count-prefixed array of `u32` values
    fn get_u32_array(&mut self) -> Result<Vec<u32>>;
    /// Read exactly `dst.len()` bytes
    fn copy_exact(&mut self, dst: &mut [u8]) -> Result<()>;
}

impl<B: Buf> BufExt for B {
    fn get<T: Codec>(&mut self) -> Result<T> {
        T::decode(self)
    }

    fn get_byte_string(&mut self) -> Result<Vec<u8>> {
        let len = self.get::<u32>()? as usize;
        if len > self.remaining() {
            return Err(WireError::UnexpectedEnd);
        }
        let mut data = vec![0; len];
        self.copy_to_slice(&mut data);
        Ok(data)
    }

    fn get_u32_array(&mut self) -> Result<Vec<u32>> {
        let count = self.get::<u32>()? as usize;
        if count.checked_mul(4).map_or(true, |n| n > self.remaining()) {
            return Err(WireError::UnexpectedEnd);
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.get_u32_le());
        }
        Ok(values)
    }

    fn copy_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        if dst.len() > self.remaining() {
            return Err(WireError::UnexpectedEnd);
        }
        self.copy_to_slice(dst);
        Ok(())
    }
}

/// Extension trait for writing to buffers
pub trait BufMutExt {
    /// Write and encode a value to the buffer
    fn write<T: Codec>(&mut self, x: T);
    /// Write a `u32`-length-prefixed byte string
    fn write_byte_string(&mut self, x: &[u8]);
    /// Write a `u32`-count-prefixed array of `u32` values
    fn write_u32_array(&mut self, x: &[u32]);
}

impl<B: BufMut> BufMutExt for B {
    fn write<T: Codec>(&mut self, x: T) {
        x.encode(self);
    }

    fn write_byte_string(&mut self, x: &[u8]) {
        self.write::<u32>(x.len() as u32);
        self.put_slice(x);
    }

    fn write_u32_array(&mut self, x: &[u32]) {
        self.write::<u32>(x.len() as u32);
        for &v in x {
            self.write::<u32>(v);
        }
    }
}

/// Serialized size of a length-prefixed byte string
pub fn byte_string_size(data: &[u8]) -> usize {
    4 + data.len()
}

/// Serialized size of a count-prefixed `u32` array
pub fn u32_array_size(values: &[u32]) -> usize {
    4 + 4 * values.len()
}
