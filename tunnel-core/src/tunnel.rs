//! The encrypted tunnel's `Proxy` implementation: wraps a raw TCP
//! connection in a `TunnelConn` and exchanges a destination address
//! header as the first payload bytes in either direction.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tunnel_proto::{Addr, Cipher, CipherKind};

use crate::error::CoreError;
use crate::proxy::{BoxedConn, Proxy};
use crate::tunnel_conn::TunnelConn;

pub struct Tunnel {
    addr: String,
    origin_cipher: Cipher,
}

impl Tunnel {
    pub fn new(method: &str, key: &str, addr: String) -> Result<Self, CoreError> {
        let kind: CipherKind = method.parse()?;
        let cipher = Cipher::new(key.as_bytes().to_vec(), kind)?;
        Ok(Tunnel {
            addr,
            origin_cipher: cipher,
        })
    }

    async fn client_request(conn: &mut TunnelConn<TcpStream>, addr: &mut Addr) -> Result<(), CoreError> {
        let raw = addr.to_raw().to_vec();
        conn.write_all(&raw).await?;
        Ok(())
    }

    async fn server_request(conn: &mut TunnelConn<TcpStream>) -> Result<Addr, CoreError> {
        let mut head = [0u8; 2];
        conn.read_exact(&mut head).await?;

        let tag = head[0];
        let host_len = match tag {
            tunnel_proto::ADDR_IPV4 => 4,
            tunnel_proto::ADDR_IPV6 => 16,
            tunnel_proto::ADDR_DOMAIN_NAME => head[1] as usize,
            _ => return Err(CoreError::NoProxy),
        };

        let mut host = vec![0u8; host_len];
        if tag == tunnel_proto::ADDR_DOMAIN_NAME {
            conn.read_exact(&mut host).await?;
        } else {
            host[0] = head[1];
            conn.read_exact(&mut host[1..]).await?;
        }

        let mut port_buf = [0u8; 2];
        conn.read_exact(&mut port_buf).await?;
        let port = u16::from_be_bytes(port_buf);

        Ok(Addr::from_wire(tag, host, port)?)
    }
}

#[async_trait]
impl Proxy for Tunnel {
    async fn client(&self, conn: TcpStream, addr: &Addr) -> Result<BoxedConn, CoreError> {
        let mut tunnel_conn = TunnelConn::new(conn, self.origin_cipher.clone_fresh());
        let mut addr = addr.clone();
        Self::client_request(&mut tunnel_conn, &mut addr).await?;
        Ok(Box::new(tunnel_conn))
    }

    async fn server(&self, conn: TcpStream) -> Result<(BoxedConn, Addr), CoreError> {
        let mut tunnel_conn = TunnelConn::new(conn, self.origin_cipher.clone_fresh());
        let addr = Self::server_request(&mut tunnel_conn).await?;
        Ok((Box::new(tunnel_conn), addr))
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn client_and_server_exchange_address_then_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listen_addr = listener.local_addr().unwrap();

        let client_tunnel = Tunnel::new("aes-128-cfb", "shared secret", listen_addr.to_string()).unwrap();
        let server_tunnel = Tunnel::new("aes-128-cfb", "shared secret", listen_addr.to_string()).unwrap();

        let dest = Addr::parse(None, "origin.example:9000").unwrap();

        let accept_task = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let (mut conn, addr) = server_tunnel.server(sock).await.unwrap();
            assert_eq!(addr.to_string(), "origin.example:9000");
            let mut buf = [0u8; 5];
            conn.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");
        });

        let sock = TcpStream::connect(listen_addr).await.unwrap();
        let mut conn = client_tunnel.client(sock, &dest).await.unwrap();
        conn.write_all(b"hello").await.unwrap();

        accept_task.await.unwrap();
    }

    #[test]
    fn rejects_unknown_method() {
        assert!(Tunnel::new("rot13", "k", "a".into()).is_err());
    }

    #[test]
    fn rejects_empty_key() {
        assert!(Tunnel::new("rc4-128-md5", "", "a".into()).is_err());
    }
}
