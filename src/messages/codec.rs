//! Frame-level reading: length-prefixed messages pulled off a blocking byte
//! stream into a bounded [`Buffer`].

use std::io::Read;

use log::trace;

use crate::buffer::Buffer;
use crate::error::{PgError, PgResult};

/// Size of the length field, which counts itself.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Read one tagged frame: `[1-byte tag][4-byte length incl. self][body]`.
///
/// The returned buffer holds the complete frame with the cursor at the
/// start; a declared length smaller than the length field itself is a
/// framing error, and a stream that ends before delivering the declared
/// body surfaces as an I/O error rather than a silent short read.
pub fn read_tagged_frame<R: Read>(stream: &mut R) -> PgResult<Buffer> {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header)?;

    let length = i32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    check_length(length)?;
    trace!("frame: tag={:?} length={}", header[0] as char, length);

    let mut frame = vec![0u8; 1 + length as usize];
    frame[..5].copy_from_slice(&header);
    stream.read_exact(&mut frame[5..])?;
    Ok(Buffer::from_bytes(frame))
}

/// Read one of the two tag-less pre-authentication frames (startup message
/// or SSL request): `[4-byte length incl. self][body]`.
pub fn read_untagged_frame<R: Read>(stream: &mut R) -> PgResult<Buffer> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header)?;

    let length = i32::from_be_bytes(header);
    check_length(length)?;
    trace!("untagged frame: length={}", length);

    let mut frame = vec![0u8; length as usize];
    frame[..4].copy_from_slice(&header);
    stream.read_exact(&mut frame[4..])?;
    Ok(Buffer::from_bytes(frame))
}

fn check_length(length: i32) -> PgResult<()> {
    if length < LENGTH_FIELD_SIZE as i32 {
        Err(PgError::InvalidMessageLength(length))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_tagged_frame() {
        let wire = [b'Z', 0, 0, 0, 5, b'I'];
        let frame = read_tagged_frame(&mut &wire[..]).unwrap();
        assert_eq!(6, frame.size());
    }

    #[test]
    fn test_length_below_minimum_is_framing_error() {
        let wire = [b'Z', 0, 0, 0, 3];
        assert!(matches!(
            read_tagged_frame(&mut &wire[..]),
            Err(PgError::InvalidMessageLength(3))
        ));

        let wire = [0, 0, 0, 0];
        assert!(matches!(
            read_untagged_frame(&mut &wire[..]),
            Err(PgError::InvalidMessageLength(0))
        ));
    }

    #[test]
    fn test_truncated_stream_is_not_a_short_read() {
        // declares 20 bytes of payload but the stream ends early
        let mut wire = vec![b'D', 0, 0, 0, 20];
        wire.extend_from_slice(&[0u8; 10]);
        match read_tagged_frame(&mut &wire[..]) {
            Err(PgError::Io(e)) => {
                assert_eq!(std::io::ErrorKind::UnexpectedEof, e.kind())
            }
            other => panic!("expected eof, got {:?}", other),
        }
    }
}
