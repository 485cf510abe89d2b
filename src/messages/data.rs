//! Result-set payload messages: `RowDescription` and `DataRow`.

use bytes::Bytes;

use crate::buffer::Buffer;
use crate::error::{PgError, PgResult};

use super::Message;

/// Description of a single output column, from a `RowDescription` message.
/// Immutable once parsed.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, Clone, new)]
pub struct FieldDescription {
    /// the field name
    pub name: String,
    /// the object ID of the table, 0 if not a table column
    pub table_oid: i32,
    /// the attribute number of the column, 0 if not a table column
    pub column_attr: i16,
    /// the object ID of the data type
    pub type_oid: i32,
    /// the size of the data type, negative for variable-width types
    pub type_size: i16,
    /// the type modifier
    pub type_modifier: i32,
    /// the format code of the value, 0 (text) or 1 (binary)
    pub format_code: i16,
}

// fixed-width part of a serialized field description
const FIELD_FIXED_SIZE: usize = 18;

pub const MESSAGE_TYPE_BYTE_ROW_DESCRIPTION: u8 = b'T';

#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, Default, new)]
pub struct RowDescription {
    pub fields: Vec<FieldDescription>,
}

impl Message for RowDescription {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_ROW_DESCRIPTION)
    }

    fn message_length(&self) -> usize {
        4 + 2
            + self
                .fields
                .iter()
                .map(|f| f.name.len() + 1 + FIELD_FIXED_SIZE)
                .sum::<usize>()
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_i16(self.fields.len() as i16)?;

        for field in &self.fields {
            buf.write_cstring(&field.name)?;
            buf.write_i32(field.table_oid)?;
            buf.write_i16(field.column_attr)?;
            buf.write_i32(field.type_oid)?;
            buf.write_i16(field.type_size)?;
            buf.write_i32(field.type_modifier)?;
            buf.write_i16(field.format_code)?;
        }

        Ok(())
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        let field_count = buf.read_i16()?;
        if field_count < 0 {
            return Err(PgError::Parse("negative field count"));
        }

        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field = FieldDescription {
                name: buf.read_cstring()?,
                table_oid: buf.read_i32()?,
                column_attr: buf.read_i16()?,
                type_oid: buf.read_i32()?,
                type_size: buf.read_i16()?,
                type_modifier: buf.read_i32()?,
                format_code: buf.read_i16()?,
            };
            fields.push(field);
        }

        Ok(RowDescription { fields })
    }
}

pub const MESSAGE_TYPE_BYTE_DATA_ROW: u8 = b'D';

/// One row of a result set. A column value is either present bytes or null;
/// null is encoded on the wire as length `-1` and is distinct from an empty
/// value.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, Default, Clone, new)]
pub struct DataRow {
    pub columns: Vec<Option<Bytes>>,
}

impl Message for DataRow {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_DATA_ROW)
    }

    fn message_length(&self) -> usize {
        4 + 2
            + self
                .columns
                .iter()
                .map(|c| 4 + c.as_ref().map(|d| d.len()).unwrap_or(0))
                .sum::<usize>()
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_i16(self.columns.len() as i16)?;

        for column in &self.columns {
            match column {
                Some(data) => {
                    buf.write_i32(data.len() as i32)?;
                    buf.write_bytes(data)?;
                }
                None => buf.write_i32(-1)?,
            }
        }

        Ok(())
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        let column_count = buf.read_i16()?;
        if column_count < 0 {
            return Err(PgError::Parse("negative column count"));
        }

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let length = buf.read_i32()?;
            if length == -1 {
                columns.push(None);
            } else if length < 0 {
                return Err(PgError::Parse("negative column length"));
            } else {
                columns.push(Some(buf.read_bytes(length as usize)?));
            }
        }

        Ok(DataRow { columns })
    }
}
