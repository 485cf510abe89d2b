use crate::buffer::Buffer;
use crate::error::PgResult;

use super::Message;

pub const MESSAGE_TYPE_BYTE_QUERY: u8 = b'Q';

/// Simple-query request: one SQL string, executed in a single cycle.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, new)]
pub struct Query {
    pub query: String,
}

impl Message for Query {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_QUERY)
    }

    fn message_length(&self) -> usize {
        5 + self.query.len()
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_cstring(&self.query)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        Ok(Query::new(buf.read_cstring()?))
    }
}
