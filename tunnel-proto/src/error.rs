//! Protocol-level error types
//!
//! These cover address parsing and cipher setup; they carry no
//! knowledge of SOCKS5 or tunnel framing, which live in `tunnel-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddrError {
    #[error("illegal address")]
    IllegalAddr,

    #[error("domain name too long")]
    DomainTooLong,
}

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encrypt method not found: {0}")]
    UnknownMethod(String),

    #[error("empty key is not allowed")]
    EmptyKey,

    #[error("failed to read entropy for iv: {0}")]
    Rng(String),

    #[error("iv has wrong length: expected {expected}, got {got}")]
    BadIvLength { expected: usize, got: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
