//! Extended-query messages. Only `Parse`/`ParseComplete` are defined; the
//! connection layer drives the simple-query protocol exclusively, so these
//! exist for wire completeness.

use crate::buffer::Buffer;
use crate::error::{PgError, PgResult};

use super::Message;

pub const MESSAGE_TYPE_BYTE_PARSE: u8 = b'P';

/// Prepared-statement creation request.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub struct Parse {
    pub statement_name: String,
    pub query: String,
    pub parameter_oids: Vec<i32>,
}

impl Parse {
    pub fn new(query: String) -> Parse {
        Parse {
            statement_name: String::new(),
            query,
            parameter_oids: Vec::new(),
        }
    }
}

impl Message for Parse {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_PARSE)
    }

    fn message_length(&self) -> usize {
        4 + self.statement_name.len() + 1 + self.query.len() + 1 + 2
            + 4 * self.parameter_oids.len()
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_cstring(&self.statement_name)?;
        buf.write_cstring(&self.query)?;
        buf.write_i16(self.parameter_oids.len() as i16)?;
        for oid in &self.parameter_oids {
            buf.write_i32(*oid)?;
        }
        Ok(())
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        let statement_name = buf.read_cstring()?;
        let query = buf.read_cstring()?;

        let oid_count = buf.read_i16()?;
        if oid_count < 0 {
            return Err(PgError::Parse("negative parameter count"));
        }
        let mut parameter_oids = Vec::with_capacity(oid_count as usize);
        for _ in 0..oid_count {
            parameter_oids.push(buf.read_i32()?);
        }

        Ok(Parse {
            statement_name,
            query,
            parameter_oids,
        })
    }
}

pub const MESSAGE_TYPE_BYTE_PARSE_COMPLETE: u8 = b'1';

#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, Default, new)]
pub struct ParseComplete;

impl Message for ParseComplete {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_PARSE_COMPLETE)
    }

    #[inline]
    fn message_length(&self) -> usize {
        4
    }

    fn encode_body(&self, _: &mut Buffer) -> PgResult<()> {
        Ok(())
    }

    fn decode_body(_: &mut Buffer) -> PgResult<Self> {
        Ok(ParseComplete)
    }
}
