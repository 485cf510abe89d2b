//! The connection state machine: transport ownership, the
//! startup/authentication handshake, and synchronous query execution.
//!
//! All operations block: a [`Connection::query`] call does not return until
//! the server's ready-for-query message for that cycle has been read. There
//! is no timeout plumbing; a read that never completes blocks the caller
//! indefinitely. Independent connections may be driven from separate
//! threads, but a single connection must not be shared without external
//! synchronization.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use bytes::Bytes;
use log::{debug, warn};

use crate::auth;
use crate::config::Target;
use crate::error::{PgError, PgResult};
use crate::messages::data::FieldDescription;
use crate::messages::response::{ErrorResponse, NoticeResponse};
use crate::messages::simplequery::Query;
use crate::messages::startup::{Authentication, BackendKeyData, Password, Startup};
use crate::messages::terminate::Terminate;
use crate::messages::{BackendMessage, FrontendMessage};

/// Last-known backend transaction status, from the ready-for-query
/// indicator byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Idle,
    InTransaction,
    Failed,
    Unknown,
}

impl TransactionStatus {
    fn from_indicator(indicator: u8) -> TransactionStatus {
        match indicator {
            b'I' => TransactionStatus::Idle,
            b'T' => TransactionStatus::InTransaction,
            b'E' => TransactionStatus::Failed,
            _ => TransactionStatus::Unknown,
        }
    }
}

/// Accumulated output of one query cycle. Fully populated by the time
/// [`Connection::query`] returns, never mutated afterwards.
#[derive(Debug, Default)]
pub struct QueryResult {
    /// Ordered rows; a column value is either present bytes or null.
    pub rows: Vec<Vec<Option<Bytes>>>,
    /// Column descriptions, from at most one row-description message.
    pub fields: Vec<FieldDescription>,
    /// Free-form completion tag, e.g. `SELECT 3`.
    pub command_tag: Option<String>,
}

enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Transport {
    fn connect(target: &Target) -> PgResult<Transport> {
        match target {
            Target::Tcp { host, port } => {
                Ok(Transport::Tcp(TcpStream::connect((host.as_str(), *port))?))
            }
            #[cfg(unix)]
            Target::Unix { path } => Ok(Transport::Unix(UnixStream::connect(path)?)),
            #[cfg(not(unix))]
            Target::Unix { .. } => Err(PgError::InvalidTarget(
                "unix sockets are not available on this platform".to_owned(),
            )),
        }
    }

    fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Transport::Unix(stream) => stream.flush(),
        }
    }
}

/// Callback invoked for each notice the server sends.
pub type NoticeHandler = Box<dyn FnMut(&NoticeResponse) + Send>;

/// An established session with the server. Created by a successful
/// handshake in [`Connection::connect`]; destroyed by [`Connection::close`].
pub struct Connection {
    transport: Option<Transport>,
    transaction_status: TransactionStatus,
    server_parameters: BTreeMap<String, String>,
    backend_key: Option<BackendKeyData>,
    notice_handler: Option<NoticeHandler>,
}

impl Connection {
    /// Open a transport to `target` (or the platform default) and drive the
    /// startup/authentication handshake to completion.
    pub fn connect(
        database: &str,
        user: &str,
        password: Option<&str>,
        target: Option<Target>,
    ) -> PgResult<Connection> {
        let target = target.unwrap_or_default();
        debug!("connecting to {}", target);

        let mut connection = Connection {
            transport: Some(Transport::connect(&target)?),
            transaction_status: TransactionStatus::Unknown,
            server_parameters: BTreeMap::new(),
            backend_key: None,
            notice_handler: None,
        };
        connection.handshake(database, user, password)?;
        Ok(connection)
    }

    fn handshake(&mut self, database: &str, user: &str, password: Option<&str>) -> PgResult<()> {
        let mut startup = Startup::new();
        startup.parameters.insert("user".to_owned(), user.to_owned());
        startup
            .parameters
            .insert("database".to_owned(), database.to_owned());
        self.send(FrontendMessage::Startup(startup))?;

        loop {
            let transport = self.transport.as_mut().ok_or(PgError::ConnectionClosed)?;
            match BackendMessage::read(transport)? {
                BackendMessage::Authentication(authentication) => {
                    if let Some(reply) = authentication_reply(authentication, user, password)? {
                        self.send(FrontendMessage::Password(reply))?;
                    }
                }
                BackendMessage::ParameterStatus(status) => {
                    self.server_parameters.insert(status.name, status.value);
                }
                BackendMessage::BackendKeyData(key) => {
                    self.backend_key = Some(key);
                }
                BackendMessage::NoticeResponse(notice) => self.dispatch_notice(&notice),
                BackendMessage::ErrorResponse(error) => {
                    return Err(PgError::Server(error.joined_fields()));
                }
                BackendMessage::ReadyForQuery(ready) => {
                    self.transaction_status = TransactionStatus::from_indicator(ready.status);
                    debug!("handshake complete: {:?}", self.transaction_status);
                    return Ok(());
                }
                other => return Err(PgError::UnexpectedMessage(Box::new(other))),
            }
        }
    }

    /// Execute one SQL string via the simple-query protocol, blocking until
    /// the cycle's ready-for-query message has been read.
    ///
    /// Server errors received mid-cycle are buffered rather than raised
    /// immediately; the server still sends ready-for-query after an error,
    /// and failing early would desynchronize the stream. If any errors were
    /// buffered the call fails and no partial result is returned.
    pub fn query(&mut self, sql: &str) -> PgResult<QueryResult> {
        if self.transport.is_none() {
            return Err(PgError::ConnectionClosed);
        }
        debug!("query: {}", sql);
        self.send(FrontendMessage::Query(Query::new(sql.to_owned())))?;

        let mut result = QueryResult::default();
        let mut errors: Vec<ErrorResponse> = Vec::new();

        loop {
            let transport = self.transport.as_mut().ok_or(PgError::ConnectionClosed)?;
            match BackendMessage::read(transport)? {
                BackendMessage::DataRow(row) => result.rows.push(row.columns),
                BackendMessage::RowDescription(description) => {
                    result.fields = description.fields;
                }
                BackendMessage::CommandComplete(complete) => {
                    result.command_tag = Some(complete.tag);
                }
                BackendMessage::EmptyQueryResponse(_)
                | BackendMessage::CopyInResponse(_)
                | BackendMessage::CopyOutResponse(_) => {
                    // accepted but not acted upon
                }
                BackendMessage::ErrorResponse(error) => errors.push(error),
                BackendMessage::NoticeResponse(notice) => self.dispatch_notice(&notice),
                BackendMessage::ReadyForQuery(ready) => {
                    self.transaction_status = TransactionStatus::from_indicator(ready.status);
                    break;
                }
                other => {
                    // keep the cycle in sync; messages that carry no meaning
                    // for a simple query are skipped
                    warn!("ignoring message in query cycle: {:?}", other);
                }
            }
        }

        if errors.is_empty() {
            Ok(result)
        } else {
            let joined = errors
                .iter()
                .map(ErrorResponse::joined_fields)
                .collect::<Vec<_>>()
                .join("\n");
            Err(PgError::Server(joined))
        }
    }

    /// Send a terminate message (best effort) and release the transport.
    /// Any further operation, including a second `close`, fails with
    /// [`PgError::ConnectionClosed`].
    pub fn close(&mut self) -> PgResult<()> {
        let mut transport = self.transport.take().ok_or(PgError::ConnectionClosed)?;

        let terminate = FrontendMessage::Terminate(Terminate).encode()?;
        // the server may already have dropped its end
        let _ = transport.write_all(&terminate);

        transport.shutdown()?;
        Ok(())
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Parameters reported by the server, growing as parameter-status
    /// messages arrive.
    pub fn server_parameters(&self) -> &BTreeMap<String, String> {
        &self.server_parameters
    }

    /// Cancellation key material recorded during the handshake.
    pub fn backend_key(&self) -> Option<BackendKeyData> {
        self.backend_key
    }

    pub fn set_notice_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&NoticeResponse) + Send + 'static,
    {
        self.notice_handler = Some(Box::new(handler));
    }

    fn dispatch_notice(&mut self, notice: &NoticeResponse) {
        if let Some(handler) = self.notice_handler.as_mut() {
            handler(notice);
        }
    }

    fn send(&mut self, message: FrontendMessage) -> PgResult<()> {
        let bytes = message.encode()?;
        let transport = self.transport.as_mut().ok_or(PgError::ConnectionClosed)?;
        transport.write_all(&bytes)?;
        transport.flush()?;
        Ok(())
    }
}

fn authentication_reply(
    authentication: Authentication,
    user: &str,
    password: Option<&str>,
) -> PgResult<Option<Password>> {
    match authentication {
        Authentication::Ok => Ok(None),
        Authentication::CleartextPassword => {
            let password = required_password(password)?;
            Ok(Some(Password::new(password.to_owned())))
        }
        Authentication::CryptPassword { salt } => {
            let password = required_password(password)?;
            Ok(Some(Password::new(auth::crypt_password(password, &salt)?)))
        }
        Authentication::Md5Password { salt } => {
            let password = required_password(password)?;
            Ok(Some(Password::new(auth::md5_password(user, password, &salt))))
        }
        Authentication::KerberosV4
        | Authentication::KerberosV5
        | Authentication::ScmCredential => Err(PgError::Authentication(
            "unsupported authentication kind requested by server".to_owned(),
        )),
        Authentication::Unknown(code) => Err(PgError::Authentication(format!(
            "unsupported authentication request code {}",
            code
        ))),
    }
}

fn required_password(password: Option<&str>) -> PgResult<&str> {
    password.ok_or_else(|| PgError::Authentication("no password specified".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_status_indicator_mapping() {
        assert_eq!(
            TransactionStatus::Idle,
            TransactionStatus::from_indicator(b'I')
        );
        assert_eq!(
            TransactionStatus::InTransaction,
            TransactionStatus::from_indicator(b'T')
        );
        assert_eq!(
            TransactionStatus::Failed,
            TransactionStatus::from_indicator(b'E')
        );
        assert_eq!(
            TransactionStatus::Unknown,
            TransactionStatus::from_indicator(b'?')
        );
    }

    #[test]
    fn test_auth_ok_needs_no_reply() {
        let reply = authentication_reply(Authentication::Ok, "yura", None).unwrap();
        assert!(reply.is_none());
    }

    #[test]
    fn test_missing_password_fails() {
        for request in [
            Authentication::CleartextPassword,
            Authentication::CryptPassword { salt: *b"ab" },
            Authentication::Md5Password { salt: [1, 2, 3, 4] },
        ] {
            assert!(matches!(
                authentication_reply(request, "yura", None),
                Err(PgError::Authentication(_))
            ));
        }
    }

    #[test]
    fn test_md5_reply_is_transformed() {
        let reply = authentication_reply(
            Authentication::Md5Password { salt: [1, 2, 3, 4] },
            "yura",
            Some("secret"),
        )
        .unwrap()
        .unwrap();
        assert_eq!("md52dc46741432a13a201acbd8ab9682f39", reply.password);
    }

    #[test]
    fn test_cleartext_reply_is_verbatim() {
        let reply =
            authentication_reply(Authentication::CleartextPassword, "yura", Some("secret"))
                .unwrap()
                .unwrap();
        assert_eq!("secret", reply.password);
    }

    #[test]
    fn test_unsupported_kinds_fail() {
        for request in [
            Authentication::KerberosV4,
            Authentication::KerberosV5,
            Authentication::ScmCredential,
            Authentication::Unknown(42),
        ] {
            assert!(matches!(
                authentication_reply(request, "yura", Some("secret")),
                Err(PgError::Authentication(_))
            ));
        }
    }
}
