//! Growable byte buffer with explicit read and write cursors.

use bytes::{Buf, BufMut};

use crate::coding::{self, BufExt, BufMutExt};

/// A byte container holding `read_position ≤ write_position ≤ buffer_size`.
///
/// Bytes between the cursors are "unread"; [`reserve`](Buffer::reserve)
/// compacts them to the front before growing so the read cursor rebases to
/// zero. The wire form is the unread region, length-prefixed.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    data: Vec<u8>,
    read_position: usize,
    write_position: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(size: usize) -> Self {
        Buffer {
            data: vec![0; size],
            read_position: 0,
            write_position: 0,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.data.len()
    }

    pub fn available_read(&self) -> usize {
        self.write_position - self.read_position
    }

    pub fn available_write(&self) -> usize {
        self.data.len() - self.write_position
    }

    /// Ensure at least `additional` bytes can be written. Unread bytes are
    /// moved to the front of the store and the read cursor rebases to zero.
    pub fn reserve(&mut self, additional: usize) {
        if self.available_write() >= additional {
            return;
        }
        self.data.copy_within(self.read_position..self.write_position, 0);
        self.write_position -= self.read_position;
        self.read_position = 0;
        let needed = self.write_position + additional;
        if needed > self.data.len() {
            self.data.resize(needed, 0);
        }
    }

    /// Append `src` if it fits in the reserved space
    pub fn write(&mut self, src: &[u8]) -> bool {
        if src.len() > self.available_write() {
            return false;
        }
        self.data[self.write_position..self.write_position + src.len()].copy_from_slice(src);
        self.write_position += src.len();
        true
    }

    /// Copy the next unread bytes into `dst`, consuming them
    pub fn read(&mut self, dst: &mut [u8]) -> bool {
        if dst.len() > self.available_read() {
            return false;
        }
        dst.copy_from_slice(&self.data[self.read_position..self.read_position + dst.len()]);
        self.read_position += dst.len();
        true
    }

    /// The unread region, without consuming it
    pub fn peek_read(&self) -> &[u8] {
        &self.data[self.read_position..self.write_position]
    }

    /// Consume `count` unread bytes
    pub fn advance_read(&mut self, count: usize) {
        assert!(count <= self.available_read());
        self.read_position += count;
    }

    pub fn clear(&mut self) {
        self.read_position = 0;
        self.write_position = 0;
    }

    pub fn serialized_size(&self) -> usize {
        coding::byte_string_size(self.peek_read())
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write_byte_string(self.peek_read());
    }

    pub fn decode<B: Buf>(buf: &mut B) -> coding::Result<Self> {
        Ok(Buffer::from(buf.get_byte_string()?))
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        let write_position = data.len();
        Buffer {
            data,
            read_position: 0,
            write_position,
        }
    }
}

impl From<&[u8]> for Buffer {
    fn from(data: &[u8]) -> Self {
        Buffer::from(data.to_vec())
    }
}

/// Buffers compare by unread contents; consumed bytes are forgotten
impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.peek_read() == other.peek_read()
    }
}

impl Eq for Buffer {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cursor_discipline() {
        let mut buffer = Buffer::with_capacity(8);
        assert_eq!(buffer.available_read(), 0);
        assert_eq!(buffer.available_write(), 8);

        assert!(buffer.write(b"abcd"));
        assert_eq!(buffer.available_read(), 4);
        assert_eq!(buffer.available_write(), 4);

        let mut out = [0; 2];
        assert!(buffer.read(&mut out));
        assert_eq!(&out, b"ab");
        assert_eq!(buffer.peek_read(), b"cd");
    }

    #[test]
    fn write_does_not_overflow() {
        let mut buffer = Buffer::with_capacity(2);
        assert!(!buffer.write(b"abc"));
        assert_eq!(buffer.available_read(), 0);
    }

    #[test]
    fn read_past_write_position_fails() {
        let mut buffer = Buffer::with_capacity(4);
        buffer.write(b"ab");
        let mut out = [0; 3];
        assert!(!buffer.read(&mut out));
    }

    #[test]
    fn reserve_compacts_and_rebases() {
        let mut buffer = Buffer::with_capacity(4);
        buffer.write(b"abcd");
        let mut out = [0; 3];
        buffer.read(&mut out);

        buffer.reserve(3);
        assert_eq!(buffer.peek_read(), b"d");
        assert!(buffer.available_write() >= 3);
        assert!(buffer.write(b"efg"));
        assert_eq!(buffer.peek_read(), b"defg");
    }

    #[test]
    fn wire_roundtrip() {
        let mut buffer = Buffer::with_capacity(6);
        buffer.write(b"123456");
        buffer.advance_read(2);

        let mut encoded = Vec::new();
        buffer.encode(&mut encoded);
        assert_eq!(encoded.len(), buffer.serialized_size());

        let mut r = Cursor::new(&encoded[..]);
        let decoded = Buffer::decode(&mut r).unwrap();
        assert_eq!(decoded.peek_read(), b"3456");
        assert_eq!(decoded, buffer);
    }
}
