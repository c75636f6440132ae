//! SOCKS-style destination address: type tag, host bytes, big-endian port.
//!
//! Wire form: `[type:1][len:1 if domain][host:N][port:2 BE]`.

use crate::error::AddrError;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

pub const ADDR_IPV4: u8 = 0x01;
pub const ADDR_DOMAIN_NAME: u8 = 0x03;
pub const ADDR_IPV6: u8 = 0x04;

const MAX_DOMAIN_NAME_LEN: usize = 255;

/// Address kind, mirroring the SOCKS5 `ATYP` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrKind {
    V4,
    V6,
    Domain,
}

impl AddrKind {
    fn tag(self) -> u8 {
        match self {
            AddrKind::V4 => ADDR_IPV4,
            AddrKind::V6 => ADDR_IPV6,
            AddrKind::Domain => ADDR_DOMAIN_NAME,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            ADDR_IPV4 => Some(AddrKind::V4),
            ADDR_IPV6 => Some(AddrKind::V6),
            ADDR_DOMAIN_NAME => Some(AddrKind::Domain),
            _ => None,
        }
    }
}

/// Destination address: an IPv4/IPv6 literal or a domain name, plus port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addr {
    pub kind: AddrKind,
    pub host: Vec<u8>,
    pub port: u16,
    raw: Option<Vec<u8>>,
}

impl Addr {
    /// Build a raw address, enforcing the per-kind length invariants.
    pub fn new_raw(kind: AddrKind, host: Vec<u8>, port: u16) -> Result<Self, AddrError> {
        if port == 0 {
            return Err(AddrError::IllegalAddr);
        }
        match kind {
            AddrKind::V4 if host.len() != 4 => return Err(AddrError::IllegalAddr),
            AddrKind::V6 if host.len() != 16 => return Err(AddrError::IllegalAddr),
            AddrKind::Domain if host.len() > MAX_DOMAIN_NAME_LEN => {
                return Err(AddrError::DomainTooLong)
            }
            _ => {}
        }
        Ok(Addr {
            kind,
            host,
            port,
            raw: None,
        })
    }

    /// Parse `"host:port"` text. An explicit `kind` of V4/V6 requires the
    /// host to parse as a literal of the matching family; otherwise the
    /// host is treated as a domain name.
    pub fn parse(kind_hint: Option<AddrKind>, addr: &str) -> Result<Self, AddrError> {
        let (host, port_str) = addr
            .rsplit_once(':')
            .ok_or(AddrError::IllegalAddr)?;
        let port: u16 = port_str.parse().map_err(|_| AddrError::IllegalAddr)?;

        match kind_hint {
            Some(AddrKind::V4) => {
                let ip: Ipv4Addr = host.parse().map_err(|_| AddrError::IllegalAddr)?;
                Self::new_raw(AddrKind::V4, ip.octets().to_vec(), port)
            }
            Some(AddrKind::V6) => {
                let ip: Ipv6Addr = host.parse().map_err(|_| AddrError::IllegalAddr)?;
                Self::new_raw(AddrKind::V6, ip.octets().to_vec(), port)
            }
            _ => Self::new_raw(AddrKind::Domain, host.as_bytes().to_vec(), port),
        }
    }

    /// Parse the wire form, as read by a SOCKS5/tunnel server.
    pub fn from_wire(kind: u8, host: Vec<u8>, port: u16) -> Result<Self, AddrError> {
        let kind = AddrKind::from_tag(kind).ok_or(AddrError::IllegalAddr)?;
        Self::new_raw(kind, host, port)
    }

    /// Memoized canonical wire-form encoding.
    pub fn to_raw(&mut self) -> &[u8] {
        if self.raw.is_none() {
            let mut raw = Vec::with_capacity(1 + 1 + self.host.len() + 2);
            raw.push(self.kind.tag());
            if self.kind == AddrKind::Domain {
                raw.push(self.host.len() as u8);
            }
            raw.extend_from_slice(&self.host);
            raw.extend_from_slice(&self.port.to_be_bytes());
            self.raw = Some(raw);
        }
        self.raw.as_deref().unwrap()
    }

    pub fn host_string(&self) -> String {
        match self.kind {
            AddrKind::V4 => {
                let b = &self.host;
                format!("{}.{}.{}.{}", b[0], b[1], b[2], b[3])
            }
            AddrKind::V6 => {
                let mut segs = [0u16; 8];
                for (i, seg) in segs.iter_mut().enumerate() {
                    *seg = u16::from_be_bytes([self.host[2 * i], self.host[2 * i + 1]]);
                }
                Ipv6Addr::from(segs).to_string()
            }
            AddrKind::Domain => String::from_utf8_lossy(&self.host).into_owned(),
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_string(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_domain() {
        let mut a = Addr::new_raw(AddrKind::Domain, b"example.com".to_vec(), 443).unwrap();
        let raw = a.to_raw().to_vec();
        assert_eq!(raw[0], ADDR_DOMAIN_NAME);
        assert_eq!(raw[1] as usize, "example.com".len());

        let host = raw[2..2 + "example.com".len()].to_vec();
        let port = u16::from_be_bytes([raw[raw.len() - 2], raw[raw.len() - 1]]);
        let b = Addr::from_wire(ADDR_DOMAIN_NAME, host, port).unwrap();
        assert_eq!(a.host, b.host);
        assert_eq!(a.port, b.port);
    }

    #[test]
    fn roundtrip_ipv4() {
        let mut a = Addr::new_raw(AddrKind::V4, vec![1, 2, 3, 4], 80).unwrap();
        let raw = a.to_raw();
        assert_eq!(raw, &[ADDR_IPV4, 1, 2, 3, 4, 0, 80]);
        assert_eq!(a.to_string(), "1.2.3.4:80");
    }

    #[test]
    fn rejects_zero_port() {
        assert!(Addr::new_raw(AddrKind::V4, vec![1, 2, 3, 4], 0).is_err());
    }

    #[test]
    fn rejects_wrong_length_for_family() {
        assert!(Addr::new_raw(AddrKind::V4, vec![1, 2, 3], 80).is_err());
        assert!(Addr::new_raw(AddrKind::V6, vec![0; 4], 80).is_err());
    }

    #[test]
    fn rejects_domain_too_long() {
        let host = vec![b'a'; 256];
        assert!(matches!(
            Addr::new_raw(AddrKind::Domain, host, 80),
            Err(AddrError::DomainTooLong)
        ));
    }

    #[test]
    fn parse_text_form() {
        let a = Addr::parse(None, "example.org:8080").unwrap();
        assert_eq!(a.kind, AddrKind::Domain);
        assert_eq!(a.port, 8080);

        let a = Addr::parse(Some(AddrKind::V4), "127.0.0.1:22").unwrap();
        assert_eq!(a.kind, AddrKind::V4);
        assert_eq!(a.host, vec![127, 0, 0, 1]);
    }
}
