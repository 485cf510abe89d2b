//! Messages that drive connection establishment: the tag-less startup and
//! SSL-request messages, the authentication request family and its replies,
//! and the session bookkeeping sent by the backend before ready-for-query.

use std::collections::BTreeMap;

use crate::buffer::Buffer;
use crate::error::{PgError, PgResult};

use super::Message;

/// Protocol major version 3, minor version 0, as a single i32 (`196608`).
pub const PROTOCOL_VERSION: i32 = 3 << 16;

/// The first message a client sends. It carries no type tag, announces the
/// protocol version and the initial session parameters as NUL-terminated
/// key/value pairs, and ends with a single NUL.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, new)]
pub struct Startup {
    #[new(value = "3")]
    pub protocol_number_major: u16,
    #[new(value = "0")]
    pub protocol_number_minor: u16,
    #[new(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Default for Startup {
    fn default() -> Startup {
        Startup::new()
    }
}

impl Message for Startup {
    #[inline]
    fn message_type() -> Option<u8> {
        None
    }

    fn message_length(&self) -> usize {
        let param_length = self
            .parameters
            .iter()
            .map(|(k, v)| k.len() + v.len() + 2)
            .sum::<usize>();
        // length:4 + version:4 + params + final nul:1
        9 + param_length
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_i16(self.protocol_number_major as i16)?;
        buf.write_i16(self.protocol_number_minor as i16)?;

        for (k, v) in self.parameters.iter() {
            buf.write_cstring(k)?;
            buf.write_cstring(v)?;
        }
        buf.write_byte(0)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        let protocol_number_major = buf.read_i16()? as u16;
        let protocol_number_minor = buf.read_i16()? as u16;

        let mut parameters = BTreeMap::new();
        while buf.peek_byte()? != 0 {
            let key = buf.read_cstring()?;
            let value = buf.read_cstring()?;
            parameters.insert(key, value);
        }
        // the final terminating nul
        buf.read_byte()?;

        Ok(Startup {
            protocol_number_major,
            protocol_number_minor,
            parameters,
        })
    }
}

/// `SslRequest` is the other tag-less message: a length and a magic code.
/// Defined for wire completeness; the connection never negotiates TLS.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, Default, new)]
pub struct SslRequest;

impl SslRequest {
    pub const BODY_MAGIC_NUMBER: i32 = 80877103;
}

impl Message for SslRequest {
    #[inline]
    fn message_type() -> Option<u8> {
        None
    }

    #[inline]
    fn message_length(&self) -> usize {
        8
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_i32(Self::BODY_MAGIC_NUMBER)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        if buf.read_i32()? != Self::BODY_MAGIC_NUMBER {
            return Err(PgError::Parse("not an ssl request"));
        }
        Ok(SslRequest)
    }
}

pub const MESSAGE_TYPE_BYTE_AUTHENTICATION: u8 = b'R';

/// Authentication request family, sent by the backend under the single tag
/// `'R'`. The first 4 body bytes select the concrete kind; the crypt and MD5
/// kinds carry a trailing salt. Unknown selectors decode to
/// [`Authentication::Unknown`] instead of failing, so the handshake layer
/// can report them as unsupported.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum Authentication {
    Ok,                               // code 0
    KerberosV4,                       // code 1
    KerberosV5,                       // code 2
    CleartextPassword,                // code 3
    CryptPassword { salt: [u8; 2] },  // code 4
    Md5Password { salt: [u8; 4] },    // code 5
    ScmCredential,                    // code 6
    Unknown(i32),
}

impl Message for Authentication {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_AUTHENTICATION)
    }

    #[inline]
    fn message_length(&self) -> usize {
        match self {
            Authentication::CryptPassword { .. } => 10,
            Authentication::Md5Password { .. } => 12,
            _ => 8,
        }
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        match self {
            Authentication::Ok => buf.write_i32(0),
            Authentication::KerberosV4 => buf.write_i32(1),
            Authentication::KerberosV5 => buf.write_i32(2),
            Authentication::CleartextPassword => buf.write_i32(3),
            Authentication::CryptPassword { salt } => {
                buf.write_i32(4)?;
                buf.write_bytes(salt)
            }
            Authentication::Md5Password { salt } => {
                buf.write_i32(5)?;
                buf.write_bytes(salt)
            }
            Authentication::ScmCredential => buf.write_i32(6),
            Authentication::Unknown(_) => {
                Err(PgError::Dump("cannot encode an unknown authentication request"))
            }
        }
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        let code = buf.read_i32()?;
        let auth = match code {
            0 => Authentication::Ok,
            1 => Authentication::KerberosV4,
            2 => Authentication::KerberosV5,
            3 => Authentication::CleartextPassword,
            4 => {
                let mut salt = [0u8; 2];
                salt.copy_from_slice(&buf.read_bytes(2)?);
                Authentication::CryptPassword { salt }
            }
            5 => {
                let mut salt = [0u8; 4];
                salt.copy_from_slice(&buf.read_bytes(4)?);
                Authentication::Md5Password { salt }
            }
            6 => Authentication::ScmCredential,
            _ => {
                // consume whatever payload the unknown kind carries
                let _ = buf.read_rest()?;
                Authentication::Unknown(code)
            }
        };
        Ok(auth)
    }
}

pub const MESSAGE_TYPE_BYTE_PASSWORD_MESSAGE: u8 = b'p';

/// Password reply sent by the frontend, either verbatim or transformed by a
/// salted scheme.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, new)]
pub struct Password {
    pub password: String,
}

impl Message for Password {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_PASSWORD_MESSAGE)
    }

    fn message_length(&self) -> usize {
        5 + self.password.len()
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_cstring(&self.password)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        Ok(Password::new(buf.read_cstring()?))
    }
}

pub const MESSAGE_TYPE_BYTE_PARAMETER_STATUS: u8 = b'S';

/// Run-time parameter report sent by the backend, during the handshake and
/// whenever a setting changes afterwards.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, new)]
pub struct ParameterStatus {
    pub name: String,
    pub value: String,
}

impl Message for ParameterStatus {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_PARAMETER_STATUS)
    }

    fn message_length(&self) -> usize {
        4 + 2 + self.name.len() + self.value.len()
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_cstring(&self.name)?;
        buf.write_cstring(&self.value)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        let name = buf.read_cstring()?;
        let value = buf.read_cstring()?;
        Ok(ParameterStatus::new(name, value))
    }
}

pub const MESSAGE_TYPE_BYTE_BACKEND_KEY_DATA: u8 = b'K';

/// Cancellation key material for this backend, recorded during the
/// handshake.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug, Clone, Copy, new)]
pub struct BackendKeyData {
    pub process_id: i32,
    pub secret_key: i32,
}

impl Message for BackendKeyData {
    #[inline]
    fn message_type() -> Option<u8> {
        Some(MESSAGE_TYPE_BYTE_BACKEND_KEY_DATA)
    }

    #[inline]
    fn message_length(&self) -> usize {
        12
    }

    fn encode_body(&self, buf: &mut Buffer) -> PgResult<()> {
        buf.write_i32(self.process_id)?;
        buf.write_i32(self.secret_key)
    }

    fn decode_body(buf: &mut Buffer) -> PgResult<Self> {
        let process_id = buf.read_i32()?;
        let secret_key = buf.read_i32()?;
        Ok(BackendKeyData::new(process_id, secret_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_wire_layout() {
        let mut startup = Startup::new();
        startup.parameters.insert("user".to_owned(), "yura".to_owned());

        let bytes = startup.encode().unwrap();
        // length, version 0x00030000, "user\0yura\0", final nul
        assert_eq!(&(bytes.len() as i32).to_be_bytes(), &bytes[0..4]);
        assert_eq!(&PROTOCOL_VERSION.to_be_bytes(), &bytes[4..8]);
        assert_eq!(b"user\0yura\0\0", &bytes[8..]);

        let decoded = Startup::decode(Buffer::from_bytes(&bytes)).unwrap();
        assert_eq!(startup, decoded);
    }

    #[test]
    fn test_startup_round_trip_with_parameters() {
        let mut startup = Startup::new();
        startup
            .parameters
            .insert("database".to_owned(), "template1".to_owned());
        startup.parameters.insert("user".to_owned(), "admin".to_owned());

        let bytes = startup.encode().unwrap();
        let decoded = Startup::decode(Buffer::from_bytes(&bytes)).unwrap();
        assert_eq!(startup, decoded);
        assert_eq!(bytes, decoded.encode().unwrap());
    }

    #[test]
    fn test_ssl_request_layout() {
        let bytes = SslRequest.encode().unwrap();
        assert_eq!([0, 0, 0, 8, 4, 210, 22, 47], bytes[..]);
        assert_eq!(
            SslRequest,
            SslRequest::decode(Buffer::from_bytes(&bytes)).unwrap()
        );
    }

    #[test]
    fn test_authentication_selector_dispatch() {
        let cases: [(i32, Authentication); 7] = [
            (0, Authentication::Ok),
            (1, Authentication::KerberosV4),
            (2, Authentication::KerberosV5),
            (3, Authentication::CleartextPassword),
            (4, Authentication::CryptPassword { salt: [b'a', b'b'] }),
            (5, Authentication::Md5Password { salt: [1, 2, 3, 4] }),
            (6, Authentication::ScmCredential),
        ];

        for (code, message) in cases {
            let bytes = message.encode().unwrap();
            assert_eq!(b'R', bytes[0]);
            assert_eq!(&code.to_be_bytes(), &bytes[5..9]);

            let decoded = Authentication::decode(Buffer::from_bytes(&bytes)).unwrap();
            assert_eq!(message, decoded);
            assert_eq!(bytes, decoded.encode().unwrap());
        }
    }

    #[test]
    fn test_authentication_unknown_selector_does_not_fail() {
        let mut bytes = vec![b'R', 0, 0, 0, 12];
        bytes.extend_from_slice(&10i32.to_be_bytes());
        bytes.extend_from_slice(b"SCRA");

        let decoded = Authentication::decode(Buffer::from_bytes(&bytes)).unwrap();
        assert_eq!(Authentication::Unknown(10), decoded);
        assert!(decoded.encode().is_err());
    }

    #[test]
    fn test_authentication_salt_truncated() {
        // md5 request that claims only 2 bytes of salt
        let mut bytes = vec![b'R', 0, 0, 0, 10];
        bytes.extend_from_slice(&5i32.to_be_bytes());
        bytes.extend_from_slice(&[1, 2]);
        assert!(Authentication::decode(Buffer::from_bytes(&bytes)).is_err());
    }

    #[test]
    fn test_password_round_trip() {
        let password = Password::new("md5abc123".to_owned());
        let bytes = password.encode().unwrap();
        assert_eq!(b'p', bytes[0]);
        assert_eq!(password, Password::decode(Buffer::from_bytes(&bytes)).unwrap());
    }

    #[test]
    fn test_parameter_status_round_trip() {
        let status = ParameterStatus::new("server_version".to_owned(), "8.0.2".to_owned());
        let bytes = status.encode().unwrap();
        assert_eq!(bytes.len(), 1 + status.message_length());
        assert_eq!(
            status,
            ParameterStatus::decode(Buffer::from_bytes(&bytes)).unwrap()
        );
    }

    #[test]
    fn test_backend_key_data_round_trip() {
        let key = BackendKeyData::new(4711, -559038737);
        let bytes = key.encode().unwrap();
        assert_eq!(13, bytes.len());
        assert_eq!(
            key,
            BackendKeyData::decode(Buffer::from_bytes(&bytes)).unwrap()
        );
    }
}
