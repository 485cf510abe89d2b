use thiserror::Error;

use crate::messages::BackendMessage;

/// Error type shared by the codec, the message layer and the connection.
///
/// The variants follow the failure modes of the protocol: framing and parse
/// errors leave the stream position unrecoverable and should be treated as
/// fatal for the connection; `Dump` indicates an internal encoding bug.
#[derive(Error, Debug)]
pub enum PgError {
    /// A message declared a length smaller than the length field itself.
    #[error("invalid message length: {0}")]
    InvalidMessageLength(i32),
    /// A message body could not be decoded, or did not consume its declared
    /// length exactly.
    #[error("malformed message: {0}")]
    Parse(&'static str),
    /// An encoded message did not land exactly on its computed size. This is
    /// an implementation bug, not a recoverable condition.
    #[error("encode error: {0}")]
    Dump(&'static str),
    /// A read or write would cross the end of a bounded buffer.
    #[error("cannot {0} beyond the end of buffer")]
    BufferEof(&'static str),
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// Error reported by the server, with its field values concatenated.
    #[error("server error: {0}")]
    Server(String),
    /// The server sent a message that is not valid for the current
    /// connection state.
    #[error("unhandled message type for current state: {0:?}")]
    UnexpectedMessage(Box<BackendMessage>),
    #[error("connection already closed")]
    ConnectionClosed,
    #[error("unrecognized connection target (must be tcp or unix): {0}")]
    InvalidTarget(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type PgResult<T> = Result<T, PgError>;
