//! Fixed-capacity byte buffer with an explicit read/write cursor.
//!
//! Every message is encoded into, and decoded from, a `Buffer` sized exactly
//! for the frame. Any read or write that would cross the buffer boundary
//! fails instead of succeeding partially, which is the primary defense
//! against malformed length fields in untrusted input.

use bytes::{Bytes, BytesMut};

use crate::error::{PgError, PgResult};

const NUL: u8 = 0;

#[derive(Debug)]
pub struct Buffer {
    data: BytesMut,
    position: usize,
}

impl Buffer {
    /// Allocate a zero-filled buffer of exactly `size` bytes.
    pub fn of_size(size: usize) -> Buffer {
        Buffer {
            data: BytesMut::zeroed(size),
            position: 0,
        }
    }

    /// Wrap existing bytes, cursor at the start.
    pub fn from_bytes(data: impl AsRef<[u8]>) -> Buffer {
        Buffer {
            data: BytesMut::from(data.as_ref()),
            position: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) -> PgResult<()> {
        if position > self.data.len() {
            return Err(PgError::BufferEof("seek"));
        }
        self.position = position;
        Ok(())
    }

    pub fn at_end(&self) -> bool {
        self.position == self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Consume the buffer, returning its full content regardless of the
    /// cursor.
    pub fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }

    fn check_read(&self, n: usize) -> PgResult<()> {
        if self.position + n > self.data.len() {
            Err(PgError::BufferEof("read"))
        } else {
            Ok(())
        }
    }

    fn check_write(&self, n: usize) -> PgResult<()> {
        if self.position + n > self.data.len() {
            Err(PgError::BufferEof("write"))
        } else {
            Ok(())
        }
    }

    pub fn read_byte(&mut self) -> PgResult<u8> {
        self.check_read(1)?;
        let byte = self.data[self.position];
        self.position += 1;
        Ok(byte)
    }

    /// Look at the next byte without advancing the cursor.
    pub fn peek_byte(&self) -> PgResult<u8> {
        self.check_read(1)?;
        Ok(self.data[self.position])
    }

    pub fn read_i16(&mut self) -> PgResult<i16> {
        self.check_read(2)?;
        let raw = [self.data[self.position], self.data[self.position + 1]];
        self.position += 2;
        Ok(i16::from_be_bytes(raw))
    }

    pub fn read_i32(&mut self) -> PgResult<i32> {
        self.check_read(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[self.position..self.position + 4]);
        self.position += 4;
        Ok(i32::from_be_bytes(raw))
    }

    pub fn read_bytes(&mut self, n: usize) -> PgResult<Bytes> {
        self.check_read(n)?;
        let bytes = Bytes::copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(bytes)
    }

    /// Read everything between the cursor and the end of the buffer.
    pub fn read_rest(&mut self) -> PgResult<Bytes> {
        self.read_bytes(self.remaining())
    }

    /// Scan forward for a NUL terminator, return the bytes before it and
    /// advance the cursor past the NUL. Fails when no NUL exists before the
    /// buffer end.
    pub fn read_cstring(&mut self) -> PgResult<String> {
        let nul_pos = self.data[self.position..]
            .iter()
            .position(|b| *b == NUL)
            .ok_or(PgError::Parse("cstring is missing its NUL terminator"))?;
        let raw = &self.data[self.position..self.position + nul_pos];
        let string = std::str::from_utf8(raw)
            .map_err(|_| PgError::Parse("cstring is not valid utf-8"))?
            .to_owned();
        self.position += nul_pos + 1;
        Ok(string)
    }

    pub fn write_byte(&mut self, byte: u8) -> PgResult<()> {
        self.check_write(1)?;
        self.data[self.position] = byte;
        self.position += 1;
        Ok(())
    }

    pub fn write_i16(&mut self, value: i16) -> PgResult<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> PgResult<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> PgResult<()> {
        self.check_write(bytes.len())?;
        self.data[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        Ok(())
    }

    /// Write a NUL-terminated string. An embedded NUL in the input is a
    /// caller error, not something to silently truncate at.
    pub fn write_cstring(&mut self, string: &str) -> PgResult<()> {
        if string.as_bytes().contains(&NUL) {
            return Err(PgError::Dump("cstring contains an embedded NUL"));
        }
        self.write_bytes(string.as_bytes())?;
        self.write_byte(NUL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_past_end_fails() {
        let mut buf = Buffer::from_bytes(b"ab");
        assert!(buf.read_i32().is_err());
        // a failed read must not move the cursor
        assert_eq!(0, buf.position());
        assert_eq!(b'a', buf.read_byte().unwrap());
        assert_eq!(b'b', buf.read_byte().unwrap());
        assert!(buf.at_end());
        assert!(buf.read_byte().is_err());
    }

    #[test]
    fn test_signed_big_endian_integers() {
        let mut buf = Buffer::from_bytes([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(-1, buf.read_i16().unwrap());
        assert_eq!(-1, buf.read_i32().unwrap());

        let mut buf = Buffer::from_bytes([0x01, 0x02, 0x80, 0x00, 0x00, 0x00]);
        assert_eq!(0x0102, buf.read_i16().unwrap());
        assert_eq!(i32::MIN, buf.read_i32().unwrap());
    }

    #[test]
    fn test_integer_write_read_round_trip() {
        let mut buf = Buffer::of_size(6);
        buf.write_i16(-2).unwrap();
        buf.write_i32(-1).unwrap();
        assert!(buf.at_end());

        buf.set_position(0).unwrap();
        assert_eq!(-2, buf.read_i16().unwrap());
        assert_eq!(-1, buf.read_i32().unwrap());
    }

    #[test]
    fn test_cstring_round_trip() {
        let mut buf = Buffer::of_size(6);
        buf.write_cstring("hello").unwrap();
        assert!(buf.at_end());

        buf.set_position(0).unwrap();
        assert_eq!("hello", buf.read_cstring().unwrap());
        assert!(buf.at_end());
    }

    #[test]
    fn test_cstring_missing_terminator() {
        let mut buf = Buffer::from_bytes(b"no terminator");
        assert!(matches!(buf.read_cstring(), Err(PgError::Parse(_))));
    }

    #[test]
    fn test_cstring_with_embedded_nul_rejected() {
        let mut buf = Buffer::of_size(16);
        assert!(matches!(
            buf.write_cstring("a\0b"),
            Err(PgError::Dump(_))
        ));
    }

    #[test]
    fn test_empty_cstring() {
        let mut buf = Buffer::from_bytes([0u8]);
        assert_eq!("", buf.read_cstring().unwrap());
        assert!(buf.at_end());
    }

    #[test]
    fn test_set_position_bounds() {
        let mut buf = Buffer::of_size(4);
        buf.set_position(4).unwrap();
        assert!(buf.at_end());
        assert!(buf.set_position(5).is_err());
    }

    #[test]
    fn test_write_past_end_fails() {
        let mut buf = Buffer::of_size(2);
        assert!(buf.write_i32(1).is_err());
        assert_eq!(0, buf.position());
    }
}
