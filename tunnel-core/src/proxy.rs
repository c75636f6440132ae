//! The common interface both the SOCKS5 front-end and the tunnel
//! back-end implement, so `local_server`/`remote_server` don't need to
//! know which one they're driving.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tunnel_proto::Addr;

use crate::error::CoreError;

/// Object-safe stand-in for `AsyncRead + AsyncWrite + Unpin + Send`.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub type BoxedConn = Box<dyn AsyncStream>;

#[async_trait]
pub trait Proxy: Send + Sync {
    /// Client side: given a raw TCP connection already dialed to this
    /// proxy's peer, perform whatever handshake is needed to request
    /// `addr`, returning a stream ready to carry payload bytes.
    async fn client(&self, conn: TcpStream, addr: &Addr) -> Result<BoxedConn, CoreError>;

    /// Server side: given an inbound raw TCP connection, perform the
    /// handshake and return a payload-ready stream plus the destination
    /// address the peer asked for.
    async fn server(&self, conn: TcpStream) -> Result<(BoxedConn, Addr), CoreError>;

    /// The address this proxy's peer listens on (`host:port`).
    fn addr(&self) -> &str;
}
