use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace};

use crate::channel::{Completion, StreamChannel};


/// Signals closing of a channel to pending operations
#[derive(Default)]
pub(crate) struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// completes when the channel is closed
    pub async fn closed(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // register before checking the flag so a concurrent close() is not missed
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}


/// A [StreamChannel] on top of tokio's `AsyncRead` / `AsyncWrite`, typically a `TcpStream`.
///
/// Reads and writes go through separate halves, so a pending read does not block writing.
pub struct TokioStreamChannel<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    peer_addr: Option<SocketAddr>,
    close_signal: CloseSignal,
}

impl TokioStreamChannel<OwnedReadHalf, OwnedWriteHalf> {
    pub fn from_tcp(stream: TcpStream) -> Self {
        let peer_addr = stream.peer_addr().ok();
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {}", e);
        }

        let (reader, writer) = stream.into_split();
        TokioStreamChannel::new(reader, writer, peer_addr)
    }
}

impl<T: AsyncRead + AsyncWrite + Send + 'static> TokioStreamChannel<ReadHalf<T>, WriteHalf<T>> {
    pub fn from_io(io: T) -> Self {
        let (reader, writer) = tokio::io::split(io);
        TokioStreamChannel::new(reader, writer, None)
    }
}

impl<R, W> TokioStreamChannel<R, W> {
    pub fn new(reader: R, writer: W, peer_addr: Option<SocketAddr>) -> Self {
        TokioStreamChannel {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            peer_addr,
            close_signal: Default::default(),
        }
    }
}

/// `filled` is kept by the caller, so it is accurate even if the read is abandoned
async fn read_fully(reader: &mut (impl AsyncRead + Unpin), buf: &mut [u8], filled: &mut usize) -> Completion {
    while *filled < buf.len() {
        match reader.read(&mut buf[*filled..]).await {
            Ok(0) => return Completion::failed(std::io::ErrorKind::UnexpectedEof.into(), *filled),
            Ok(n) => *filled += n,
            Err(e) => return Completion::failed(e, *filled),
        }
    }
    Completion::done(*filled)
}

async fn write_fully(writer: &mut (impl AsyncWrite + Unpin), buf: &[u8], written: &mut usize) -> Completion {
    while *written < buf.len() {
        match writer.write(&buf[*written..]).await {
            Ok(0) => return Completion::failed(std::io::ErrorKind::WriteZero.into(), *written),
            Ok(n) => *written += n,
            Err(e) => return Completion::failed(e, *written),
        }
    }
    if let Err(e) = writer.flush().await {
        return Completion::failed(e, *written);
    }
    Completion::done(*written)
}

#[async_trait]
impl<R, W> StreamChannel for TokioStreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn read(&self, buf: &mut [u8]) -> Completion {
        if self.close_signal.is_closed() {
            return Completion::closed();
        }

        let mut reader = self.reader.lock().await;
        let mut filled = 0;
        let completion = select! {
            completion = read_fully(&mut *reader, buf, &mut filled) => Some(completion),
            _ = self.close_signal.closed() => None,
        };

        match completion {
            Some(completion) => {
                trace!("read {} bytes", completion.transferred);
                if matches!(&completion.error, Some(e) if e.kind() == std::io::ErrorKind::UnexpectedEof) {
                    debug!("end of stream from {:?}", self.peer_addr);
                    self.close_signal.close();
                }
                completion
            }
            None => {
                trace!("read interrupted by close after {} bytes", filled);
                Completion::closed_after(filled)
            }
        }
    }

    async fn write(&self, buf: &[u8]) -> Completion {
        if self.close_signal.is_closed() {
            return Completion::closed();
        }

        let mut writer = self.writer.lock().await;
        let mut written = 0;
        let completion = select! {
            completion = write_fully(&mut *writer, buf, &mut written) => Some(completion),
            _ = self.close_signal.closed() => None,
        };
        completion.unwrap_or_else(|| Completion::closed_after(written))
    }

    fn close(&self) {
        debug!("closing stream channel to {:?}", self.peer_addr);
        self.close_signal.close();
    }

    fn is_open(&self) -> bool {
        !self.close_signal.is_closed()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}
