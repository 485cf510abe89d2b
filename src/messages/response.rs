//! Backend responses that close or annotate a query cycle: command
//! completion, ready-for-query, notices and errors, and the COPY
//! announcements.

use bytes::Bytes;

use crate::buffer::Buffer;
use crate::error::{PgError, PgResult};

use super::Message;

pub const MESSAGE_TYPE_BYTE_COMMAND_COMPLETE: u8 = b'C';

/// Completion report for one SQL command, carrying the command tag
/// (e.g. `SELECT 3`).
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, new)]
pub struct CommandComplete {
    pub tag: String,
}

impl Message for CommandComplete {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_COMMAND_COMPLETE)
    }

    fn message_length(&self) -> usize {
        5 + self.tag.len()
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_cstring(&self.tag)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        Ok(CommandComplete::new(buf.read_cstring()?))
    }
}

pub const MESSAGE_TYPE_BYTE_EMPTY_QUERY_RESPONSE: u8 = b'I';

/// Sent instead of `CommandComplete` when the query string was empty.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, Default, new)]
pub struct EmptyQueryResponse;

impl Message for EmptyQueryResponse {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_EMPTY_QUERY_RESPONSE)
    }

    #[inline]
    fn message_length(&self) -> usize {
        4
    }

    fn encode_body(&self, _: &mut Buffer) -> PgResult<()> {
        Ok(())
    }

    fn decode_body(_: &mut Buffer) -> PgResult<Self> {
        Ok(EmptyQueryResponse)
    }
}

pub const MESSAGE_TYPE_BYTE_READY_FOR_QUERY: u8 = b'Z';

/// Ends a message cycle (handshake or query) and reports the backend
/// transaction status indicator: `'I'` idle, `'T'` in transaction, `'E'`
/// failed transaction.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, new)]
pub struct ReadyForQuery {
    pub status: u8,
}

impl Message for ReadyForQuery {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_READY_FOR_QUERY)
    }

    #[inline]
    fn message_length(&self) -> usize {
        5
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_byte(self.status)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        Ok(ReadyForQuery::new(buf.read_byte()?))
    }
}

// Notice and error responses share one body shape: a field-type byte, and
// when that byte is nonzero, NUL-terminated field values closed by a zero
// byte. A field type of zero means "no fields" and nothing may follow it.

fn response_fields_length(field_type: u8, field_values: &[String]) -> usize {
    let mut size = 4 + 1;
    if field_type != 0 {
        size += field_values.iter().map(|v| v.len() + 1).sum::<usize>() + 1;
    }
    size
}

fn encode_response_fields(
    buf: &mut Buffer,
    field_type: u8,
    field_values: &[String],
) -> PgResult<()> {
    if field_type == 0 && !field_values.is_empty() {
        return Err(PgError::Dump("field values present without a field type"));
    }

    buf.write_byte(field_type)?;
    if field_type == 0 {
        return Ok(());
    }
    for value in field_values {
        buf.write_cstring(value)?;
    }
    buf.write_byte(0)
}

fn decode_response_fields(buf: &mut Buffer) -> PgResult<(u8, Vec<String>)> {
    let field_type = buf.read_byte()?;
    let mut field_values = Vec::new();

    if field_type != 0 {
        while buf.peek_byte()? != 0 {
            field_values.push(buf.read_cstring()?);
        }
        buf.read_byte()?;
    }

    Ok((field_type, field_values))
}

pub const MESSAGE_TYPE_BYTE_NOTICE_RESPONSE: u8 = b'N';

/// A warning or informational report. Routed to the notice callback; never
/// interrupts control flow.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, new)]
pub struct NoticeResponse {
    pub field_type: u8,
    pub field_values: Vec<String>,
}

impl Message for NoticeResponse {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_NOTICE_RESPONSE)
    }

    fn message_length(&self) -> usize {
        response_fields_length(self.field_type, &self.field_values)
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        encode_response_fields(buf, self.field_type, &self.field_values)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        let (field_type, field_values) = decode_response_fields(buf)?;
        Ok(NoticeResponse::new(field_type, field_values))
    }
}

pub const MESSAGE_TYPE_BYTE_ERROR_RESPONSE: u8 = b'E';

/// An error reported by the server. During the handshake this is fatal
/// immediately; during a query cycle it is buffered until ready-for-query
/// so the stream stays in sync.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, new)]
pub struct ErrorResponse {
    pub field_type: u8,
    pub field_values: Vec<String>,
}

impl ErrorResponse {
    /// All field values joined for reporting, the way the legacy interface
    /// did.
    pub fn joined_fields(&self) -> String {
        self.field_values.join("\t")
    }
}

impl Message for ErrorResponse {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_ERROR_RESPONSE)
    }

    fn message_length(&self) -> usize {
        response_fields_length(self.field_type, &self.field_values)
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        encode_response_fields(buf, self.field_type, &self.field_values)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        let (field_type, field_values) = decode_response_fields(buf)?;
        Ok(ErrorResponse::new(field_type, field_values))
    }
}

pub const MESSAGE_TYPE_BYTE_COPY_IN_RESPONSE: u8 = b'G';

/// COPY FROM STDIN announcement. Decoded but not acted upon; the body is
/// kept raw.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, Default, new)]
pub struct CopyInResponse {
    pub body: Bytes,
}

impl Message for CopyInResponse {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_COPY_IN_RESPONSE)
    }

    fn message_length(&self) -> usize {
        4 + self.body.len()
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_bytes(&self.body)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        Ok(CopyInResponse::new(buf.read_rest()?))
    }
}

pub const MESSAGE_TYPE_BYTE_COPY_OUT_RESPONSE: u8 = b'H';

/// COPY TO STDOUT announcement. Decoded but not acted upon; the body is
/// kept raw.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, Default, new)]
pub struct CopyOutResponse {
    pub body: Bytes,
}

impl Message for CopyOutResponse {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_COPY_OUT_RESPONSE)
    }

    fn message_length(&self) -> usize {
        4 + self.body.len()
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_bytes(&self.body)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        Ok(CopyOutResponse::new(buf.read_rest()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_complete_round_trip() {
        let complete = CommandComplete::new("SELECT 3".to_owned());
        let bytes = complete.encode().unwrap();
        assert_eq!(b'C', bytes[0]);
        assert_eq!(
            complete,
            CommandComplete::decode(Buffer::from_bytes(&bytes)).unwrap()
        );
    }

    #[test]
    fn test_ready_for_query_layout() {
        let ready = ReadyForQuery::new(b'I');
        let bytes = ready.encode().unwrap();
        assert_eq!([b'Z', 0, 0, 0, 5, b'I'], bytes[..]);
        assert_eq!(
            ready,
            ReadyForQuery::decode(Buffer::from_bytes(&bytes)).unwrap()
        );
    }

    #[test]
    fn test_error_response_round_trip() {
        let error = ErrorResponse::new(
            b'S',
            vec!["ERROR".to_owned(), "42P01".to_owned(), "no such table".to_owned()],
        );
        let bytes = error.encode().unwrap();
        let decoded = ErrorResponse::decode(Buffer::from_bytes(&bytes)).unwrap();
        assert_eq!(error, decoded);
        assert_eq!(bytes, decoded.encode().unwrap());
        assert_eq!("ERROR\t42P01\tno such table", decoded.joined_fields());
    }

    #[test]
    fn test_notice_zero_field_type_short_form() {
        let notice = NoticeResponse::new(0, Vec::new());
        let bytes = notice.encode().unwrap();
        assert_eq!([b'N', 0, 0, 0, 5, 0], bytes[..]);
        assert_eq!(
            notice,
            NoticeResponse::decode(Buffer::from_bytes(&bytes)).unwrap()
        );
    }

    #[test]
    fn test_fields_without_type_rejected_on_encode() {
        let bogus = ErrorResponse::new(0, vec!["oops".to_owned()]);
        assert!(matches!(bogus.encode(), Err(PgError::Dump(_))));
    }

    #[test]
    fn test_error_response_missing_terminator() {
        // field type 'S', one value, but no trailing zero byte
        let bytes = [b'E', 0, 0, 0, 9, b'S', b'B', b'A', b'D', 0];
        assert!(ErrorResponse::decode(Buffer::from_bytes(&bytes)).is_err());
    }

    #[test]
    fn test_copy_responses_keep_raw_body() {
        let copy = CopyInResponse::new(Bytes::from_static(&[0, 0, 1, 0, 0]));
        let bytes = copy.encode().unwrap();
        assert_eq!(b'G', bytes[0]);
        assert_eq!(
            copy,
            CopyInResponse::decode(Buffer::from_bytes(&bytes)).unwrap()
        );

        let copy = CopyOutResponse::new(Bytes::from_static(&[0, 0, 0]));
        let bytes = copy.encode().unwrap();
        assert_eq!(b'H', bytes[0]);
        assert_eq!(
            copy,
            CopyOutResponse::decode(Buffer::from_bytes(&bytes)).unwrap()
        );
    }
}
