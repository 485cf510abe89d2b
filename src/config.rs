//! Connection target addressing.
//!
//! Two forms are accepted, mirroring the classic libpq conventions:
//! `tcp://host:port` and `unix:/path/to/socket`. Anything else is a
//! configuration error at connect time.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{PgError, PgResult};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_SOCKET_DIR: &str = "/tmp";

/// Where to reach the server: a TCP host/port pair or a local-domain socket
/// path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl Target {
    /// The conventional socket path for the default port,
    /// `/tmp/.s.PGSQL.5432`.
    pub fn default_socket_path() -> PathBuf {
        PathBuf::from(DEFAULT_SOCKET_DIR).join(format!(".s.PGSQL.{}", DEFAULT_PORT))
    }
}

impl Default for Target {
    fn default() -> Target {
        if cfg!(unix) {
            Target::Unix {
                path: Target::default_socket_path(),
            }
        } else {
            Target::Tcp {
                host: DEFAULT_HOST.to_owned(),
                port: DEFAULT_PORT,
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Target::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for Target {
    type Err = PgError;

    fn from_str(s: &str) -> PgResult<Target> {
        if let Some(rest) = s.strip_prefix("tcp://") {
            let (host, port) = match rest.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port
                        .parse::<u16>()
                        .map_err(|_| PgError::InvalidTarget(s.to_owned()))?;
                    (host, port)
                }
                None => (rest, DEFAULT_PORT),
            };
            let host = if host.is_empty() { DEFAULT_HOST } else { host };
            Ok(Target::Tcp {
                host: host.to_owned(),
                port,
            })
        } else if let Some(rest) = s.strip_prefix("unix:") {
            if rest.is_empty() {
                Ok(Target::Unix {
                    path: Target::default_socket_path(),
                })
            } else {
                Ok(Target::Unix {
                    path: PathBuf::from(rest),
                })
            }
        } else {
            Err(PgError::InvalidTarget(s.to_owned()))
        }
    }
}
