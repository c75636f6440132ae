//! The remote role: accepts tunnel connections, recovers the origin
//! address, and dials it via the OS resolver.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

use crate::pipe::{self, BufferPool};
use crate::proxy::Proxy;
use crate::signal::Signal;

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

pub struct RemoteServer {
    tunnel: Arc<dyn Proxy>,
    signal: Signal,
    pool: BufferPool,
}

impl RemoteServer {
    pub fn new(tunnel: Arc<dyn Proxy>, signal: Signal) -> Self {
        RemoteServer {
            tunnel,
            signal,
            pool: BufferPool::new(),
        }
    }

    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let listener = retry_bind(self.tunnel.addr()).await?;
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

    async fn serve_conn(&self, conn: TcpStream) {
        let (tunnel_conn, addr) = match self.tunnel.server(conn).await {
            Ok(v) => v,
            Err(e) => {
                if !e.is_conn_closed() {
                    error!(error = %e, "tunnel handshake failed");
                }
                return;
            }
        };

        debug!(%addr, "dialing origin");
        let origin_conn = match TcpStream::connect(addr.to_string()).await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, %addr, "dial to origin failed");
                return;
            }
        };

        if let Err(e) = pipe::run(tunnel_conn, origin_conn, &self.pool).await {
            if !pipe::is_conn_closed(&e) {
                error!(error = %e, "pipe failed");
            }
        }
    }
}
