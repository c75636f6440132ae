//! Buffer pool and the bidirectional copy loop shared by both roles.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

const BUF_SIZE: usize = 8192;
const POOL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct BufferPool {
    pool: Arc<ArrayQueue<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        BufferPool {
            pool: Arc::new(ArrayQueue::new(POOL_CAPACITY)),
        }
    }

    pub fn take(&self) -> Vec<u8> {
        match self.pool.pop() {
            Some(mut buf) => {
                buf.resize(BUF_SIZE, 0);
                buf
            }
            None => vec![0u8; BUF_SIZE],
        }
    }

    pub fn give(&self, buf: Vec<u8>) {
        let _ = self.pool.push(buf);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        BufferPool::new()
    }
}

/// True if `err` looks like the normal result of the peer or ourselves
/// tearing down a connection, rather than a fault worth logging.
pub fn is_conn_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

/// Copy `src` into `dst` using a pooled buffer, then shut down `dst`'s
/// write half so the peer observes EOF. Errors that just mean "the
/// connection went away" are swallowed; anything else is returned.
pub async fn pipe_close_dst<R, W>(mut src: R, mut dst: W, pool: &BufferPool) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = pool.take();
    let result = copy_loop(&mut src, &mut dst, &mut buf).await;
    pool.give(buf);
    let _ = dst.shutdown().await;
    match result {
        Ok(()) => Ok(()),
        Err(ref e) if is_conn_closed(e) => Ok(()),
        Err(e) => Err(e),
    }
}

async fn copy_loop<R, W>(src: &mut R, dst: &mut W, buf: &mut [u8]) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let n = src.read(buf).await?;
        if n == 0 {
            return Ok(());
        }
        dst.write_all(&buf[..n]).await?;
    }
}

/// Runs both directions of a split connection concurrently. As soon as
/// either direction finishes, the other is aborted rather than left to
/// wait on its own EOF — a peer that only half-closes (or never closes
/// at all) would otherwise pin this task and its split halves forever.
/// Aborting drops the loser's held `ReadHalf`/`WriteHalf` immediately,
/// which together with the winner's already-dropped halves fully
/// releases both underlying connections.
pub async fn run<A, B>(a: A, b: B, pool: &BufferPool) -> io::Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (a_rd, a_wr) = io::split(a);
    let (b_rd, b_wr) = io::split(b);

    let done = Arc::new(Notify::new());

    let pool_a = pool.clone();
    let done_a = Arc::clone(&done);
    let client_to_remote = tokio::spawn(async move {
        let result = pipe_close_dst(a_rd, b_wr, &pool_a).await;
        done_a.notify_one();
        result
    });

    let pool_b = pool.clone();
    let done_b = Arc::clone(&done);
    let remote_to_client = tokio::spawn(async move {
        let result = pipe_close_dst(b_rd, a_wr, &pool_b).await;
        done_b.notify_one();
        result
    });

    done.notified().await;
    client_to_remote.abort();
    remote_to_client.abort();

    let r1 = match client_to_remote.await {
        Ok(r) => r,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    };
    let r2 = match remote_to_client.await {
        Ok(r) => r,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    };
    r1?;
    r2?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn pipe_copies_until_eof() {
        let pool = BufferPool::new();
        let (mut src_wr, src_rd) = duplex(64);
        let (dst_wr, mut dst_rd) = duplex(64);

        src_wr.write_all(b"hello world").await.unwrap();
        drop(src_wr);

        pipe_close_dst(src_rd, dst_wr, &pool).await.unwrap();

        let mut out = Vec::new();
        dst_rd.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn run_aborts_the_other_direction_when_one_side_closes() {
        let pool = BufferPool::new();
        let (a, a_peer) = duplex(64);
        let (b, b_peer) = duplex(64);

        drop(a_peer);
        // b_peer is never closed or written to: a cooperative peer would
        // hang this direction forever if the other weren't force-aborted.

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), run(a, b, &pool)).await;
        assert!(result.is_ok(), "run() did not return once one side closed");

        drop(b_peer);
    }

    #[test]
    fn pool_reuses_buffers() {
        let pool = BufferPool::new();
        let buf = pool.take();
        assert_eq!(buf.len(), BUF_SIZE);
        pool.give(buf);
        assert_eq!(pool.pool.len(), 1);
    }
}
