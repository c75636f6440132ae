//! The local role: SOCKS5 front-end, routing decision, and dispatch to
//! either a direct dial or the encrypted tunnel.

use std::sync::Arc;

use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

use crate::pipe::{self, BufferPool};
use crate::proxy::Proxy;
use crate::signal::Signal;
use crate::site_list::SiteList;
use tunnel_proto::Addr;

const BIND_RETRIES: u32 = 5;
const BIND_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

async fn retry_bind(addr: &str) -> std::io::Result<TcpListener> {
    let mut last_err = None;
    for attempt in 0..BIND_RETRIES {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                warn!(%addr, attempt, "bind failed, retrying");
                last_err = Some(e);
                tokio::time::sleep(BIND_RETRY_DELAY).await;
            }
        }
    }
    Err(last_err.unwrap())
}

pub struct Router {
    pub suffix_list: SiteList,
    pub direct_list: SiteList,
    pub tunnel_list: SiteList,
}

impl Router {
    /// True if `host` should be dialed directly rather than through a
    /// tunnel, per the precedence in `4.6`.
    pub fn is_direct(&self, host: &str) -> bool {
        if self.suffix_list.contains(host) {
            return true;
        }
        if self.direct_list.contains(host) {
            return true;
        }
        if self.tunnel_list.contains(host) {
            return false;
        }
        false
    }
}

pub struct LocalServer {
    sock: Arc<dyn Proxy>,
    tunnels: Vec<Arc<dyn Proxy>>,
    router: Arc<Router>,
    signal: Signal,
    pool: BufferPool,
}

impl LocalServer {
    pub fn new(
        sock: Arc<dyn Proxy>,
        tunnels: Vec<Arc<dyn Proxy>>,
        router: Arc<Router>,
        signal: Signal,
    ) -> Self {
        LocalServer {
            sock,
            tunnels,
            router,
            signal,
            pool: BufferPool::new(),
        }
    }

    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let listener = retry_bind(self.sock.addr()).await?;
        loop {
            tokio::select! {
                _ = self.signal.wait() => return Ok(()),
                accepted = listener.accept() => {
                    let (conn, _) = accepted?;
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.serve_conn(conn).await;
                    });
                }
            }
        }
    }

    fn random_tunnel(&self) -> Arc<dyn Proxy> {
        let idx = rand::thread_rng().gen_range(0..self.tunnels.len());
        Arc::clone(&self.tunnels[idx])
    }

    async fn serve_conn(&self, conn: TcpStream) {
        let (client_conn, addr) = match self.sock.server(conn).await {
            Ok(v) => v,
            Err(e) => {
                if !e.is_conn_closed() {
                    error!(error = %e, "socks5 handshake failed");
                }
                return;
            }
        };

        let remote_conn = match self.dial(&addr).await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, %addr, "dial failed for both direct and tunnel paths");
                return;
            }
        };

        if let Err(e) = pipe::run(client_conn, remote_conn, &self.pool).await {
            if !pipe::is_conn_closed(&e) {
                error!(error = %e, "pipe failed");
            }
        }
    }

    async fn dial(&self, addr: &Addr) -> std::io::Result<Box<dyn crate::proxy::AsyncStream>> {
        let host = addr.host_string();
        debug!(%host, "routing decision");

        if self.router.is_direct(&host) {
            match TcpStream::connect(addr.to_string()).await {
                Ok(conn) => {
                    debug!(%host, "dialed direct");
                    return Ok(Box::new(conn));
                }
                Err(e) => {
                    warn!(error = %e, %host, "direct dial failed, falling back to tunnel");
                }
            }
        }

        let tunnel = self.random_tunnel();
        let conn = TcpStream::connect(tunnel.addr()).await?;
        tunnel
            .client(conn, addr)
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}
