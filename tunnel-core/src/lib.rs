//! splittun engine: SOCKS5 front-end, the encrypted tunnel, routing,
//! and the bidirectional pipe that bridges them.

pub mod config;
pub mod error;
pub mod local_server;
pub mod pipe;
pub mod proxy;
pub mod remote_server;
pub mod signal;
pub mod site_list;
pub mod socks5;
pub mod tunnel;
pub mod tunnel_conn;
pub mod user_pass;

pub use config::Config;
pub use error::CoreError;
pub use local_server::{LocalServer, Router};
pub use proxy::{AsyncStream, BoxedConn, Proxy};
pub use remote_server::RemoteServer;
pub use signal::Signal;
pub use site_list::{ListMode, SiteList};
pub use socks5::Socks5;
pub use tunnel::Tunnel;
pub use tunnel_conn::TunnelConn;
pub use user_pass::UserPass;
