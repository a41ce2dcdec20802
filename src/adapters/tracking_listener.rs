//! Connection-tracking listener for `axum::serve`.
//!
//! Every accepted connection is wrapped in a [`TrackedStream`] that owns a
//! [`ConnectionGuard`], so the coordinator sees an open when the connection is
//! accepted and a close when the server drops it. While the coordinator's
//! accept flag is cleared, new connections are dropped right after accept.
use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use axum::serve::Listener;
use futures_util::{Stream, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{TcpListener, TcpStream},
};
use tokio_stream::wrappers::TcpListenerStream;

use crate::{core::ShutdownCoordinator, utils::connection_guard::ConnectionGuard};

/// Pause after an accept error that is not tied to a single connection.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Errors that only affect the connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// An accepted connection reporting its close to the coordinator on drop.
#[derive(Debug)]
pub struct TrackedStream<I> {
    inner: I,
    guard: ConnectionGuard,
}

impl<I> TrackedStream<I> {
    pub fn new(inner: I, guard: ConnectionGuard) -> Self {
        Self { inner, guard }
    }

    pub fn get_ref(&self) -> &I {
        &self.inner
    }

    /// Detach the underlying stream, reporting the connection as taken over.
    pub fn into_taken_over(self) -> I {
        self.guard.take_over();
        self.inner
    }
}

impl<I: AsyncRead + Unpin> AsyncRead for TrackedStream<I> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<I: AsyncWrite + Unpin> AsyncWrite for TrackedStream<I> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Listener reporting accepted connections to a [`ShutdownCoordinator`].
pub struct TrackingListener<S> {
    stream: S,
    local_addr: SocketAddr,
    coordinator: Arc<ShutdownCoordinator>,
}

impl<S> TrackingListener<S> {
    pub fn new(stream: S, local_addr: SocketAddr, coordinator: Arc<ShutdownCoordinator>) -> Self {
        Self {
            stream,
            local_addr,
            coordinator,
        }
    }
}

/// Bind a TCP listener on `addr` reporting to `coordinator`.
pub async fn bind(
    addr: SocketAddr,
    coordinator: Arc<ShutdownCoordinator>,
) -> io::Result<
    TrackingListener<impl Stream<Item = io::Result<(TcpStream, SocketAddr)>> + Unpin + Send + 'static>,
> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let stream = TcpListenerStream::new(listener).map(|res| {
        res.and_then(|stream| {
            let peer = stream.peer_addr()?;
            Ok((stream, peer))
        })
    });
    Ok(TrackingListener::new(stream, local_addr, coordinator))
}

impl<S, I> Listener for TrackingListener<S>
where
    S: Stream<Item = io::Result<(I, SocketAddr)>> + Unpin + Send + 'static,
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Io = TrackedStream<I>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.stream.next().await {
                Some(Ok((io, addr))) => {
                    if !self.coordinator.is_accepting() {
                        tracing::debug!("Not accepting connections, dropping {}", addr);
                        drop(io);
                        continue;
                    }
                    let guard = ConnectionGuard::open(self.coordinator.clone());
                    return (TrackedStream::new(io, guard), addr);
                }
                Some(Err(e)) if is_connection_error(&e) => {
                    tracing::debug!("Connection failed during accept: {}", e);
                }
                Some(Err(e)) => {
                    // Typically EMFILE/ENFILE: retrying at once would spin.
                    tracing::error!(
                        "Accept error: {}, retrying in {:?}",
                        e,
                        ACCEPT_ERROR_BACKOFF
                    );
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
                // The stream only ends if the socket is gone; keep the server
                // alive so shutdown stays under the signal handler's control.
                None => std::future::pending().await,
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt, duplex},
        sync::mpsc,
        time::{Instant, timeout},
    };
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;

    fn coordinator() -> Arc<ShutdownCoordinator> {
        Arc::new(ShutdownCoordinator::new(1000, Vec::new()).unwrap())
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_tracked_stream_passes_data_and_reports_close() {
        let coordinator = coordinator();
        let (client, server) = duplex(64);
        let mut tracked = TrackedStream::new(server, ConnectionGuard::open(coordinator.clone()));
        let mut client = client;

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        tracked.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        tracked.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        assert_eq!(coordinator.live_connections(), 1);
        drop(tracked);
        assert_eq!(coordinator.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_taken_over_stream_is_no_longer_counted() {
        let coordinator = coordinator();
        let (_client, server) = duplex(64);
        let tracked = TrackedStream::new(server, ConnectionGuard::open(coordinator.clone()));

        let _raw = tracked.into_taken_over();
        assert_eq!(coordinator.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_listener_drops_connections_while_not_accepting() {
        let coordinator = coordinator();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listener =
            TrackingListener::new(UnboundedReceiverStream::new(rx), peer(80), coordinator.clone());

        let (mut rejected_client, s1) = duplex(64);
        tx.send(Ok::<_, io::Error>((s1, peer(1001)))).unwrap();

        // Accept flag starts cleared: the connection is dropped and accept keeps waiting.
        assert!(timeout(Duration::from_millis(50), listener.accept()).await.is_err());
        let mut buf = [0u8; 1];
        assert_eq!(rejected_client.read(&mut buf).await.unwrap(), 0);
        assert_eq!(coordinator.live_connections(), 0);

        coordinator.set_accepting(true);
        let (_client, s2) = duplex(64);
        tx.send(Ok((s2, peer(1002)))).unwrap();

        let (io, addr) = listener.accept().await;
        assert_eq!(addr, peer(1002));
        assert_eq!(coordinator.live_connections(), 1);
        drop(io);
        assert_eq!(coordinator.live_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_backs_off_before_retrying() {
        let coordinator = coordinator();
        coordinator.set_accepting(true);
        let (_client, server) = duplex(64);
        let incoming = futures_util::stream::iter(vec![
            Err(io::Error::other("too many open files")),
            Ok((server, peer(3001))),
        ]);
        let mut listener = TrackingListener::new(incoming, peer(80), coordinator.clone());

        let started = Instant::now();
        let (_io, addr) = listener.accept().await;
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
        assert_eq!(addr, peer(3001));
        assert_eq!(coordinator.live_connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_connection_is_skipped_without_backoff() {
        let coordinator = coordinator();
        coordinator.set_accepting(true);
        let (_client, server) = duplex(64);
        let incoming = futures_util::stream::iter(vec![
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
            Ok((server, peer(3002))),
        ]);
        let mut listener = TrackingListener::new(incoming, peer(80), coordinator.clone());

        let started = Instant::now();
        let (_io, addr) = listener.accept().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(addr, peer(3002));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_waits_after_stream_ends() {
        let coordinator = coordinator();
        coordinator.set_accepting(true);
        let incoming =
            futures_util::stream::iter(Vec::<io::Result<(tokio::io::DuplexStream, SocketAddr)>>::new());
        let mut listener = TrackingListener::new(incoming, peer(80), coordinator);

        assert!(timeout(Duration::from_secs(60), listener.accept()).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_reports_local_addr() {
        let listener = bind(peer(0), coordinator()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(addr.ip(), peer(0).ip());
        assert_ne!(addr.port(), 0);
    }
}
