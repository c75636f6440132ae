//! Unified error type surfaced by the engine.
//!
//! Disposition (session-local vs listener-fatal vs silent) is decided by
//! the caller, not encoded in the variant; see `pipe::is_conn_closed` for
//! the one place we classify an error as "expected, don't log it".

use thiserror::Error;
use tunnel_proto::{AddrError, CipherError};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Addr(#[from] AddrError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("socks version doesn't support")]
    UnsupportedSocksVersion,

    #[error("no supported methods")]
    NoSupportedMethods,

    #[error("auth failed")]
    AuthFailed,

    #[error("can't proxy for this connection")]
    NoProxy,

    #[error("bad format")]
    BadFormat,

    #[error("network unreachable")]
    NetworkUnreachable,

    #[error("host unreachable")]
    HostUnreachable,

    #[error("connection refused")]
    ConnRefused,

    #[error("ttl expired")]
    TtlExpired,

    #[error("connect failed with reply code {0}")]
    ConnectFailed(u8),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// True if this is the normal result of a connection going away
    /// rather than a fault worth logging; see `pipe::is_conn_closed`
    /// for the underlying `io::ErrorKind` classification.
    pub fn is_conn_closed(&self) -> bool {
        match self {
            CoreError::Io(e) => crate::pipe::is_conn_closed(e),
            CoreError::NoProxy => true,
            _ => false,
        }
    }
}
