//! The asynchronous I/O capability that connections are built on.
//!
//! Connections do not talk to sockets directly. They drive a [StreamChannel] or
//!  [DatagramChannel], which reports the outcome of each transfer as a [Completion]. This decouples
//!  the framing state machines from the actual I/O and allows running them against in-memory
//!  channels for testing.

pub mod tokio_stream;
pub mod udp;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;

use crate::error::NetError;


pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// The outcome of a single read or write: an optional error, and the number of bytes that were
///  transferred (which may be non-zero even if there was an error).
#[derive(Debug)]
pub struct Completion {
    pub error: Option<io::Error>,
    pub transferred: usize,
}

impl Completion {
    pub fn done(transferred: usize) -> Completion {
        Completion { error: None, transferred }
    }

    pub fn failed(error: io::Error, transferred: usize) -> Completion {
        Completion { error: Some(error), transferred }
    }

    pub fn closed() -> Completion {
        Completion::closed_after(0)
    }

    /// the channel was closed while a transfer was in progress, after `transferred` bytes
    pub fn closed_after(transferred: usize) -> Completion {
        Completion::failed(io::Error::new(io::ErrorKind::NotConnected, "channel is closed"), transferred)
    }

    /// A transfer is successful only if there is no error *and* all `expected` bytes were
    ///  transferred
    pub fn expect_len(self, expected: usize) -> Result<(), NetError> {
        if let Some(e) = self.error {
            return Err(NetError::Channel(e));
        }
        if self.transferred != expected {
            return Err(NetError::ShortTransfer {
                expected,
                actual: self.transferred,
            });
        }
        Ok(())
    }
}


/// An ordered, reliable byte stream, e.g. a TCP connection.
///
/// Every operation completes exactly once. Closing the channel causes pending and subsequent
///  operations to complete with an error rather than hang.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StreamChannel: Send + Sync + 'static {
    /// Schedule work in the channel's execution context. Connections run their state machines
    ///  this way.
    fn execute(&self, task: Task) {
        tokio::spawn(task);
    }

    /// Read exactly `buf.len()` bytes. Fewer bytes are transferred only on error or end of stream.
    async fn read(&self, buf: &mut [u8]) -> Completion;

    /// Write all of `buf`. Fewer bytes are transferred only on error.
    async fn write(&self, buf: &[u8]) -> Completion;

    fn close(&self);

    fn is_open(&self) -> bool;

    fn peer_addr(&self) -> Option<SocketAddr>;
}


/// An unreliable, boundary-preserving packet transport, e.g. a UDP socket.
#[async_trait]
pub trait DatagramChannel: Send + Sync + 'static {
    fn execute(&self, task: Task) {
        tokio::spawn(task);
    }

    /// Receive a single packet into `buf`, returning the number of bytes received and the sender.
    ///  Packets that do not fit the buffer are truncated.
    async fn recv_from(&self, buf: &mut [u8]) -> (Completion, Option<SocketAddr>);

    /// Send `buf` as a single packet
    async fn send_to(&self, buf: &[u8], to: SocketAddr) -> Completion;

    fn close(&self);

    fn is_open(&self) -> bool;

    fn local_addr(&self) -> Option<SocketAddr>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::error::ErrorKind;

    #[rstest]
    #[case::complete(Completion::done(8), 8, None)]
    #[case::short(Completion::done(3), 8, Some(ErrorKind::ShortTransfer))]
    #[case::long(Completion::done(9), 8, Some(ErrorKind::ShortTransfer))]
    #[case::error(Completion::failed(io::ErrorKind::ConnectionReset.into(), 8), 8, Some(ErrorKind::Channel))]
    #[case::closed(Completion::closed(), 0, Some(ErrorKind::Channel))]
    fn test_expect_len(#[case] completion: Completion, #[case] expected: usize, #[case] error: Option<ErrorKind>) {
        assert_eq!(completion.expect_len(expected).err().map(|e| e.kind()), error);
    }
}
