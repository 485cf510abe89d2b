//! Wire messages of the Postgresql v3 protocol.
//!
//! Every message type implements [`Message`], which fixes the framing
//! contract: a one-byte type tag (absent only for the two pre-authentication
//! messages), a 4-byte big-endian length that counts itself but not the tag,
//! and a body that must be produced and consumed byte-exactly. The closed
//! [`BackendMessage`] and [`FrontendMessage`] enums dispatch on the tag
//! byte; tags nobody recognizes decode to an `Unknown` placeholder so that
//! "unsupported" stays explicit instead of crashing the stream.

use std::io::Read;

use bytes::Bytes;
use log::warn;

use crate::buffer::Buffer;
use crate::error::{PgError, PgResult};

pub mod codec;
pub mod data;
pub mod extendedquery;
pub mod response;
pub mod simplequery;
pub mod startup;
pub mod terminate;

use data::{DataRow, RowDescription};
use extendedquery::{Parse, ParseComplete};
use response::{
    CommandComplete, CopyInResponse, CopyOutResponse, EmptyQueryResponse, ErrorResponse,
    NoticeResponse, ReadyForQuery,
};
use simplequery::Query;
use startup::{Authentication, BackendKeyData, ParameterStatus, Password, SslRequest, Startup};
use terminate::Terminate;

/// Symmetric encode/decode contract for one message variant.
pub trait Message: Sized {
    /// The one-byte type tag, or `None` for the two tag-less
    /// pre-authentication messages.
    fn message_type() -> Option<u8>;

    /// Serialized body size including the 4 bytes of the length field
    /// itself, i.e. exactly the value written into the length field.
    fn message_length(&self) -> usize;

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()>;

    fn decode_body(buf: &mut Buffer) -> PgResult<Self>;

    /// Encode the full frame. The buffer is sized exactly; failing to land
    /// on its end is an internal invariant violation, never a silent pad or
    /// truncate.
    fn encode(&self) -> PgResult<Bytes> {
        let length = self.message_length();
        let tag_size = usize::from(Self::message_type().is_some());

        let mut buf = Buffer::of_size(tag_size + length);
        if let Some(tag) = Self::message_type() {
            buf.write_byte(tag)?;
        }
        buf.write_i32(length as i32)?;
        self.encode_body(&mut buf)?;

        if !buf.at_end() {
            return Err(PgError::Dump("message does not fill its computed size"));
        }
        Ok(buf.into_bytes())
    }

    /// Decode from a fully-buffered frame. The body must be consumed
    /// exactly to its end; leftover bytes are a parse error.
    fn decode(mut frame: Buffer) -> PgResult<Self> {
        let header_size = usize::from(Self::message_type().is_some()) + codec::LENGTH_FIELD_SIZE;
        frame.set_position(header_size)?;

        let message = Self::decode_body(&mut frame)?;
        if !frame.at_end() {
            return Err(PgError::Parse("message body has trailing bytes"));
        }
        Ok(message)
    }
}

/// Messages the backend sends to the client.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum BackendMessage {
    Authentication(Authentication),
    ParameterStatus(ParameterStatus),
    BackendKeyData(BackendKeyData),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
    DataRow(DataRow),
    CommandComplete(CommandComplete),
    EmptyQueryResponse(EmptyQueryResponse),
    NoticeResponse(NoticeResponse),
    ErrorResponse(ErrorResponse),
    CopyInResponse(CopyInResponse),
    CopyOutResponse(CopyOutResponse),
    ParseComplete(ParseComplete),
    /// A tag no decoder is registered for; carries the complete raw frame.
    Unknown { tag: u8, frame: Bytes },
}

impl BackendMessage {
    /// Decode a fully-buffered frame, dispatching on its tag byte.
    pub fn decode(frame: Buffer) -> PgResult<BackendMessage> {
        let tag = frame.peek_byte()?;
        let message = match tag {
            startup::MESSAGE_TYPE_BYTE_AUTHENTICATION => {
                BackendMessage::Authentication(Authentication::decode(frame)?)
            }
            startup::MESSAGE_TYPE_BYTE_PARAMETER_STATUS => {
                BackendMessage::ParameterStatus(ParameterStatus::decode(frame)?)
            }
            startup::MESSAGE_TYPE_BYTE_BACKEND_KEY_DATA => {
                BackendMessage::BackendKeyData(BackendKeyData::decode(frame)?)
            }
            response::MESSAGE_TYPE_BYTE_READY_FOR_QUERY => {
                BackendMessage::ReadyForQuery(ReadyForQuery::decode(frame)?)
            }
            data::MESSAGE_TYPE_BYTE_ROW_DESCRIPTION => {
                BackendMessage::RowDescription(RowDescription::decode(frame)?)
            }
            data::MESSAGE_TYPE_BYTE_DATA_ROW => BackendMessage::DataRow(DataRow::decode(frame)?),
            response::MESSAGE_TYPE_BYTE_COMMAND_COMPLETE => {
                BackendMessage::CommandComplete(CommandComplete::decode(frame)?)
            }
            response::MESSAGE_TYPE_BYTE_EMPTY_QUERY_RESPONSE => {
                BackendMessage::EmptyQueryResponse(EmptyQueryResponse::decode(frame)?)
            }
            response::MESSAGE_TYPE_BYTE_NOTICE_RESPONSE => {
                BackendMessage::NoticeResponse(NoticeResponse::decode(frame)?)
            }
            response::MESSAGE_TYPE_BYTE_ERROR_RESPONSE => {
                BackendMessage::ErrorResponse(ErrorResponse::decode(frame)?)
            }
            response::MESSAGE_TYPE_BYTE_COPY_IN_RESPONSE => {
                BackendMessage::CopyInResponse(CopyInResponse::decode(frame)?)
            }
            response::MESSAGE_TYPE_BYTE_COPY_OUT_RESPONSE => {
                BackendMessage::CopyOutResponse(CopyOutResponse::decode(frame)?)
            }
            extendedquery::MESSAGE_TYPE_BYTE_PARSE_COMPLETE => {
                BackendMessage::ParseComplete(ParseComplete::decode(frame)?)
            }
            _ => {
                warn!("unknown backend message tag: {:?}", tag as char);
                BackendMessage::Unknown {
                    tag,
                    frame: frame.into_bytes(),
                }
            }
        };
        Ok(message)
    }

    /// Read one message off a blocking stream.
    pub fn read<R: Read>(stream: &mut R) -> PgResult<BackendMessage> {
        let frame = codec::read_tagged_frame(stream)?;
        Self::decode(frame)
    }

    pub fn encode(&self) -> PgResult<Bytes> {
        match self {
            BackendMessage::Authentication(m) => m.encode(),
            BackendMessage::ParameterStatus(m) => m.encode(),
            BackendMessage::BackendKeyData(m) => m.encode(),
            BackendMessage::ReadyForQuery(m) => m.encode(),
            BackendMessage::RowDescription(m) => m.encode(),
            BackendMessage::DataRow(m) => m.encode(),
            BackendMessage::CommandComplete(m) => m.encode(),
            BackendMessage::EmptyQueryResponse(m) => m.encode(),
            BackendMessage::NoticeResponse(m) => m.encode(),
            BackendMessage::ErrorResponse(m) => m.encode(),
            BackendMessage::CopyInResponse(m) => m.encode(),
            BackendMessage::CopyOutResponse(m) => m.encode(),
            BackendMessage::ParseComplete(m) => m.encode(),
            BackendMessage::Unknown { .. } => {
                Err(PgError::Dump("cannot encode an unknown message"))
            }
        }
    }
}

/// Messages the client sends to the backend.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum FrontendMessage {
    Startup(Startup),
    SslRequest(SslRequest),
    Password(Password),
    Query(Query),
    Parse(Parse),
    Terminate(Terminate),
    /// A tag no decoder is registered for; carries the complete raw frame.
    Unknown { tag: u8, frame: Bytes },
}

impl FrontendMessage {
    pub fn encode(&self) -> PgResult<Bytes> {
        match self {
            FrontendMessage::Startup(m) => m.encode(),
            FrontendMessage::SslRequest(m) => m.encode(),
            FrontendMessage::Password(m) => m.encode(),
            FrontendMessage::Query(m) => m.encode(),
            FrontendMessage::Parse(m) => m.encode(),
            FrontendMessage::Terminate(m) => m.encode(),
            FrontendMessage::Unknown { .. } => {
                Err(PgError::Dump("cannot encode an unknown message"))
            }
        }
    }

    /// Read one tagged frontend message off a blocking stream. This is the
    /// server-side half of the codec, exercised by the test harness.
    pub fn read<R: Read>(stream: &mut R) -> PgResult<FrontendMessage> {
        let frame = codec::read_tagged_frame(stream)?;
        let tag = frame.peek_byte()?;
        let message = match tag {
            startup::MESSAGE_TYPE_BYTE_PASSWORD_MESSAGE => {
                FrontendMessage::Password(Password::decode(frame)?)
            }
            simplequery::MESSAGE_TYPE_BYTE_QUERY => FrontendMessage::Query(Query::decode(frame)?),
            extendedquery::MESSAGE_TYPE_BYTE_PARSE => {
                FrontendMessage::Parse(Parse::decode(frame)?)
            }
            terminate::MESSAGE_TYPE_BYTE_TERMINATE => {
                FrontendMessage::Terminate(Terminate::decode(frame)?)
            }
            _ => {
                warn!("unknown frontend message tag: {:?}", tag as char);
                FrontendMessage::Unknown {
                    tag,
                    frame: frame.into_bytes(),
                }
            }
        };
        Ok(message)
    }

    /// Read the tag-less first message of a connection: a startup message,
    /// or an SSL request recognized by its magic code.
    pub fn read_startup<R: Read>(stream: &mut R) -> PgResult<FrontendMessage> {
        let mut frame = codec::read_untagged_frame(stream)?;
        if frame.size() < 8 {
            return Err(PgError::Parse("startup message too short"));
        }

        frame.set_position(codec::LENGTH_FIELD_SIZE)?;
        let code = frame.read_i32()?;

        if frame.size() == 8 && code == SslRequest::BODY_MAGIC_NUMBER {
            Ok(FrontendMessage::SslRequest(SslRequest::decode(frame)?))
        } else {
            Ok(FrontendMessage::Startup(Startup::decode(frame)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_dispatch_on_tag() {
        let wire = ReadyForQuery::new(b'T').encode().unwrap();
        let message = BackendMessage::read(&mut &wire[..]).unwrap();
        assert_eq!(
            BackendMessage::ReadyForQuery(ReadyForQuery::new(b'T')),
            message
        );
        assert_eq!(wire, message.encode().unwrap());
    }

    #[test]
    fn test_unknown_tag_decodes_to_placeholder() {
        let wire = [b'?', 0, 0, 0, 6, 1, 2];
        match BackendMessage::read(&mut &wire[..]).unwrap() {
            BackendMessage::Unknown { tag, frame } => {
                assert_eq!(b'?', tag);
                assert_eq!(&wire[..], &frame[..]);
            }
            other => panic!("expected unknown message, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_message_cannot_be_encoded() {
        let message = BackendMessage::Unknown {
            tag: b'?',
            frame: Bytes::new(),
        };
        assert!(matches!(message.encode(), Err(PgError::Dump(_))));
    }

    #[test]
    fn test_trailing_bytes_are_a_parse_error() {
        // ReadyForQuery declaring one byte too many
        let wire = [b'Z', 0, 0, 0, 6, b'I', 0];
        assert!(matches!(
            BackendMessage::read(&mut &wire[..]),
            Err(PgError::Parse(_))
        ));
    }

    #[test]
    fn test_startup_reader_distinguishes_ssl_request() {
        let wire = FrontendMessage::SslRequest(SslRequest).encode().unwrap();
        assert_eq!(
            FrontendMessage::SslRequest(SslRequest),
            FrontendMessage::read_startup(&mut &wire[..]).unwrap()
        );

        let mut startup = Startup::new();
        startup.parameters.insert("user".to_owned(), "u".to_owned());
        let wire = startup.encode().unwrap();
        match FrontendMessage::read_startup(&mut &wire[..]).unwrap() {
            FrontendMessage::Startup(decoded) => assert_eq!(startup, decoded),
            other => panic!("expected startup, got {:?}", other),
        }
    }

    #[test]
    fn test_frontend_round_trip_through_reader() {
        let query = FrontendMessage::Query(Query::new("SELECT 1".to_owned()));
        let wire = query.encode().unwrap();
        assert_eq!(query, FrontendMessage::read(&mut &wire[..]).unwrap());

        let terminate = FrontendMessage::Terminate(Terminate);
        let wire = terminate.encode().unwrap();
        assert_eq!(terminate, FrontendMessage::read(&mut &wire[..]).unwrap());
    }
}
