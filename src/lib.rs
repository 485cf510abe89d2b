//! A from-scratch, synchronous client for the Postgresql wire protocol
//! (major version 3). No native client library is involved: the binary
//! message codec, the authentication handshake and the query cycle are all
//! implemented here, over a plain TCP or unix-domain-socket transport.
//!
//! ```no_run
//! use pgsync::Connection;
//!
//! # fn main() -> pgsync::PgResult<()> {
//! let mut conn = Connection::connect("mydb", "yura", Some("secret"), None)?;
//! let result = conn.query("SELECT version()")?;
//! println!("{:?}", result.rows);
//! conn.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! All I/O is blocking; there is no pooling, pipelining or TLS. See
//! [`connection`] for the concurrency contract.

#[macro_use]
extern crate derive_new;

pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod messages;

mod auth;

pub use config::Target;
pub use connection::{Connection, NoticeHandler, QueryResult, TransactionStatus};
pub use error::{PgError, PgResult};
