//! SOCKS5 (RFC 1928) client and server halves, with `USERNAME_PASSWORD`
//! authentication (RFC 1929) and the `CONNECT` command only.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tunnel_proto::{Addr, AddrKind};

use crate::error::CoreError;
use crate::proxy::{AsyncStream, BoxedConn, Proxy};
use crate::user_pass::UserPass;

pub const SOCKS_VER: u8 = 0x05;

pub const AUTH_NOT_REQUIRED: u8 = 0x00;
pub const AUTH_USER_PASS: u8 = 0x02;
pub const AUTH_UNACCEPTABLE: u8 = 0xff;

pub const CMD_CONNECT: u8 = 0x01;

const USER_PASS_VERIFY_VER: u8 = 1;
const USER_PASS_VERIFY_SUCCESS: u8 = 0x00;
const USER_PASS_VERIFY_FAILED: u8 = 0x01;

fn clean_methods(methods: &[u8]) -> BTreeSet<u8> {
    methods
        .iter()
        .copied()
        .filter(|&m| m == AUTH_USER_PASS || m == AUTH_NOT_REQUIRED)
        .collect()
}

pub struct Socks5 {
    user_pass: UserPass,
    support_methods: BTreeSet<u8>,
    auth_required: bool,
    method_req: Vec<u8>,
    addr: String,
}

impl Socks5 {
    pub fn new(methods: &[u8], users: UserPass, addr: String) -> Result<Self, CoreError> {
        let support_methods = clean_methods(methods);
        if support_methods.is_empty() {
            return Err(CoreError::NoSupportedMethods);
        }
        if support_methods.len() == 1
            && support_methods.contains(&AUTH_USER_PASS)
            && users.size() == 0
        {
            return Err(CoreError::AuthFailed);
        }

        let mut method_req = vec![SOCKS_VER, support_methods.len() as u8];
        method_req.extend(support_methods.iter().copied());

        Ok(Socks5 {
            auth_required: !support_methods.contains(&AUTH_NOT_REQUIRED),
            support_methods,
            user_pass: users,
            method_req,
            addr,
        })
    }

    async fn client_handshake<S: AsyncStream>(&self, conn: &mut S) -> Result<bool, CoreError> {
        if self.user_pass.size() == 0 && self.auth_required {
            return Err(CoreError::AuthFailed);
        }

        conn.write_all(&self.method_req).await?;
        let mut resp = [0u8; 2];
        conn.read_exact(&mut resp).await?;
        if resp[0] != SOCKS_VER {
            return Err(CoreError::UnsupportedSocksVersion);
        }
        let method = resp[1];
        if (method == AUTH_NOT_REQUIRED || method == AUTH_USER_PASS)
            && self.support_methods.contains(&method)
        {
            return Ok(method == AUTH_USER_PASS);
        }
        Err(CoreError::NoSupportedMethods)
    }

    async fn client_verify_user_pass<S: AsyncStream>(&self, conn: &mut S) -> Result<(), CoreError> {
        let (user, pass) = self.user_pass.one().ok_or(CoreError::AuthFailed)?;
        let mut req = Vec::with_capacity(3 + user.len() + pass.len());
        req.push(USER_PASS_VERIFY_VER);
        req.push(user.len() as u8);
        req.extend_from_slice(user.as_bytes());
        req.push(pass.len() as u8);
        req.extend_from_slice(pass.as_bytes());

        conn.write_all(&req).await?;
        let mut resp = [0u8; 2];
        conn.read_exact(&mut resp).await?;
        if resp[0] != USER_PASS_VERIFY_VER || resp[1] != USER_PASS_VERIFY_SUCCESS {
            return Err(CoreError::AuthFailed);
        }
        Ok(())
    }

    async fn client_connect<S: AsyncStream>(&self, conn: &mut S, addr: &mut Addr) -> Result<(), CoreError> {
        let raw = addr.to_raw();
        let mut req = vec![SOCKS_VER, CMD_CONNECT, 0x00];
        req.extend_from_slice(raw);

        conn.write_all(&req).await?;

        let mut head = [0u8; 5];
        conn.read_exact(&mut head).await?;
        if head[0] != SOCKS_VER {
            return Err(CoreError::UnsupportedSocksVersion);
        }
        if head[1] != 0x00 {
            return Err(reply_error(head[1]));
        }
        let atyp = head[3];
        let remaining = match atyp {
            tunnel_proto::ADDR_IPV4 => 4 - 1 + 2,
            tunnel_proto::ADDR_IPV6 => 16 - 1 + 2,
            tunnel_proto::ADDR_DOMAIN_NAME => head[4] as usize + 2,
            _ => return Err(CoreError::BadFormat),
        };
        let mut tail = vec![0u8; remaining];
        conn.read_exact(&mut tail).await?;
        Ok(())
    }

    async fn server_handshake<S: AsyncStream>(&self, conn: &mut S) -> Result<bool, CoreError> {
        let mut head = [0u8; 2];
        conn.read_exact(&mut head).await?;
        let nmethod = head[1];
        if head[0] != SOCKS_VER || nmethod == 0 {
            conn.write_all(&[SOCKS_VER, AUTH_UNACCEPTABLE]).await?;
            return Err(CoreError::UnsupportedSocksVersion);
        }
        let mut methods = vec![0u8; nmethod as usize];
        conn.read_exact(&mut methods).await?;

        let mut selected = AUTH_UNACCEPTABLE;
        for &m in &methods {
            if self.support_methods.contains(&m) {
                selected = m;
            }
        }

        conn.write_all(&[SOCKS_VER, selected]).await?;
        if selected == AUTH_UNACCEPTABLE {
            return Err(CoreError::NoProxy);
        }
        Ok(selected == AUTH_USER_PASS)
    }

    async fn server_verify_user_pass<S: AsyncStream>(&self, conn: &mut S) -> Result<(), CoreError> {
        let mut head = [0u8; 2];
        conn.read_exact(&mut head).await?;
        if head[0] != USER_PASS_VERIFY_VER {
            conn.write_all(&[USER_PASS_VERIFY_VER, USER_PASS_VERIFY_FAILED])
                .await?;
            return Err(CoreError::NoProxy);
        }
        let user_len = head[1] as usize;
        let mut user = vec![0u8; user_len];
        conn.read_exact(&mut user).await?;

        let mut pass_len_buf = [0u8; 1];
        conn.read_exact(&mut pass_len_buf).await?;
        let mut pass = vec![0u8; pass_len_buf[0] as usize];
        conn.read_exact(&mut pass).await?;

        let user = String::from_utf8_lossy(&user);
        let pass = String::from_utf8_lossy(&pass);
        if self.user_pass.verify(&user, &pass) {
            conn.write_all(&[USER_PASS_VERIFY_VER, USER_PASS_VERIFY_SUCCESS])
                .await?;
            Ok(())
        } else {
            conn.write_all(&[USER_PASS_VERIFY_VER, USER_PASS_VERIFY_FAILED])
                .await?;
            Err(CoreError::NoProxy)
        }
    }

    fn server_connect_resp(code: u8) -> [u8; 10] {
        [
            SOCKS_VER,
            code,
            0x00,
            tunnel_proto::ADDR_IPV4,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
            0x00,
        ]
    }

    async fn server_connect<S: AsyncStream>(&self, conn: &mut S) -> Result<Addr, CoreError> {
        let mut head = [0u8; 4];
        conn.read_exact(&mut head).await?;
        if head[0] != SOCKS_VER {
            conn.write_all(&Self::server_connect_resp(0x01)).await?;
            return Err(CoreError::NoProxy);
        }
        if head[1] != CMD_CONNECT {
            conn.write_all(&Self::server_connect_resp(0x07)).await?;
            return Err(CoreError::NoProxy);
        }

        let atyp = head[3];
        let kind = match atyp {
            tunnel_proto::ADDR_IPV4 => AddrKind::V4,
            tunnel_proto::ADDR_IPV6 => AddrKind::V6,
            tunnel_proto::ADDR_DOMAIN_NAME => AddrKind::Domain,
            _ => {
                conn.write_all(&Self::server_connect_resp(0x08)).await?;
                return Err(CoreError::NoProxy);
            }
        };

        let host_len = match kind {
            AddrKind::V4 => 4,
            AddrKind::V6 => 16,
            AddrKind::Domain => {
                let mut len_buf = [0u8; 1];
                conn.read_exact(&mut len_buf).await?;
                len_buf[0] as usize
            }
        };
        let mut host = vec![0u8; host_len];
        conn.read_exact(&mut host).await?;
        let mut port_buf = [0u8; 2];
        conn.read_exact(&mut port_buf).await?;
        let port = u16::from_be_bytes(port_buf);

        conn.write_all(&Self::server_connect_resp(0x00)).await?;

        Ok(Addr::new_raw(kind, host, port)?)
    }
}

fn reply_error(code: u8) -> CoreError {
    match code {
        0x03 => CoreError::NetworkUnreachable,
        0x04 => CoreError::HostUnreachable,
        0x05 => CoreError::ConnRefused,
        0x06 => CoreError::TtlExpired,
        other => CoreError::ConnectFailed(other),
    }
}

#[async_trait]
impl Proxy for Socks5 {
    async fn client(&self, mut conn: TcpStream, addr: &Addr) -> Result<BoxedConn, CoreError> {
        let auth_required = self.client_handshake(&mut conn).await?;
        if auth_required {
            self.client_verify_user_pass(&mut conn).await?;
        }
        let mut addr = addr.clone();
        self.client_connect(&mut conn, &mut addr).await?;
        Ok(Box::new(conn))
    }

    async fn server(&self, mut conn: TcpStream) -> Result<(BoxedConn, Addr), CoreError> {
        let auth_required = self.server_handshake(&mut conn).await?;
        if auth_required {
            self.server_verify_user_pass(&mut conn).await?;
        }
        let addr = self.server_connect(&mut conn).await?;
        Ok((Box::new(conn), addr))
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::duplex;

    fn users() -> UserPass {
        UserPass::new(HashMap::from([("alice".to_string(), "wonderland".to_string())]))
    }

    #[tokio::test]
    async fn no_auth_connect_succeeds() {
        let server = Socks5::new(&[AUTH_NOT_REQUIRED], UserPass::default(), "s".into()).unwrap();
        let client = Socks5::new(&[AUTH_NOT_REQUIRED], UserPass::default(), "c".into()).unwrap();

        let (mut client_io, mut server_io) = duplex(4096);
        let addr = Addr::parse(None, "example.org:443").unwrap();

        let client_fut = client.client_handshake(&mut client_io);
        let server_fut = server.server_handshake(&mut server_io);
        let (client_auth, server_auth) = tokio::join!(client_fut, server_fut);
        assert!(!client_auth.unwrap());
        assert!(!server_auth.unwrap());

        let mut addr_mut = addr.clone();
        let client_fut = client.client_connect(&mut client_io, &mut addr_mut);
        let server_fut = server.server_connect(&mut server_io);
        let (client_res, server_addr) = tokio::join!(client_fut, server_fut);
        client_res.unwrap();
        let server_addr = server_addr.unwrap();
        assert_eq!(server_addr.to_string(), "example.org:443");
    }

    #[tokio::test]
    async fn user_pass_success() {
        let server = Socks5::new(&[AUTH_USER_PASS, AUTH_NOT_REQUIRED], users(), "s".into()).unwrap();
        let client = Socks5::new(&[AUTH_USER_PASS, AUTH_NOT_REQUIRED], users(), "c".into()).unwrap();

        let (mut client_io, mut server_io) = duplex(4096);
        let client_fut = client.client_handshake(&mut client_io);
        let server_fut = server.server_handshake(&mut server_io);
        let (client_auth, server_auth) = tokio::join!(client_fut, server_fut);
        assert!(client_auth.unwrap());
        assert!(server_auth.unwrap());

        let client_fut = client.client_verify_user_pass(&mut client_io);
        let server_fut = server.server_verify_user_pass(&mut server_io);
        let (c, s) = tokio::join!(client_fut, server_fut);
        c.unwrap();
        s.unwrap();
    }

    #[tokio::test]
    async fn user_pass_failure() {
        let server = Socks5::new(&[AUTH_USER_PASS], users(), "s".into()).unwrap();
        let bad_users = UserPass::new(HashMap::from([("alice".to_string(), "wrong".to_string())]));
        let client = Socks5::new(&[AUTH_USER_PASS], bad_users, "c".into()).unwrap();

        let (mut client_io, mut server_io) = duplex(4096);
        tokio::join!(
            client.client_handshake(&mut client_io),
            server.server_handshake(&mut server_io)
        );

        let client_fut = client.client_verify_user_pass(&mut client_io);
        let server_fut = server.server_verify_user_pass(&mut server_io);
        let (c, s) = tokio::join!(client_fut, server_fut);
        assert!(matches!(c, Err(CoreError::AuthFailed)));
        assert!(s.is_err());
    }

    #[tokio::test]
    async fn server_rejects_bad_version() {
        let server = Socks5::new(&[AUTH_NOT_REQUIRED], UserPass::default(), "s".into()).unwrap();
        let (mut client_io, mut server_io) = duplex(4096);
        client_io.write_all(&[4, 1, 0]).await.unwrap();

        let err = server.server_handshake(&mut server_io).await.unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedSocksVersion));

        let mut resp = [0u8; 2];
        client_io.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp, [SOCKS_VER, AUTH_UNACCEPTABLE]);
    }

    #[test]
    fn construction_fails_without_credentials() {
        let err = Socks5::new(&[AUTH_USER_PASS], UserPass::default(), "s".into()).unwrap_err();
        assert!(matches!(err, CoreError::AuthFailed));
    }

    #[test]
    fn construction_fails_with_no_methods() {
        let err = Socks5::new(&[0x01], UserPass::default(), "s".into()).unwrap_err();
        assert!(matches!(err, CoreError::NoSupportedMethods));
    }
}
