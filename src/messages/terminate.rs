use crate::buffer::Buffer;
use crate::error::PgResult;

use super::Message;

pub const MESSAGE_TYPE_BYTE_TERMINATE: u8 = b'X';

/// Sent by the frontend before closing its end of the connection.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, Default, new)]
pub struct Terminate;

impl Message for Terminate {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_TERMINATE)
    }

    #[inline]
    fn message_length(&self) -> usize {
        4
    }

    fn encode_body(&self, _: &mut Buffer) -> PgResult<()> {
        Ok(())
    }

    fn decode_body(_: &mut Buffer) -> PgResult<Self> {
        Ok(Terminate)
    }
}
