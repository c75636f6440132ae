//! Wire-level primitives shared by splittun's local and remote roles:
//! the destination address codec and the stream-cipher factory. Neither
//! module performs I/O; framing and handshakes live in `tunnel-core`.

pub mod addr;
pub mod cipher;
pub mod error;

pub use addr::{Addr, AddrKind, ADDR_DOMAIN_NAME, ADDR_IPV4, ADDR_IPV6};
pub use cipher::{Cipher, CipherKind, CipherMeta};
pub use error::{AddrError, CipherError};
