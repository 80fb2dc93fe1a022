use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::select;
use tracing::{debug, trace};

use crate::channel::tokio_stream::CloseSignal;
use crate::channel::{Completion, DatagramChannel};


/// A [DatagramChannel] on top of a tokio `UdpSocket`
pub struct UdpChannel {
    socket: Arc<UdpSocket>,
    close_signal: CloseSignal,
}

impl UdpChannel {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<UdpChannel> {
        let socket = UdpSocket::bind(addr).await?;
        debug!("bound UDP socket to {:?}", socket.local_addr()?);
        Ok(UdpChannel::new(Arc::new(socket)))
    }

    pub fn new(socket: Arc<UdpSocket>) -> UdpChannel {
        UdpChannel {
            socket,
            close_signal: Default::default(),
        }
    }
}

#[async_trait]
impl DatagramChannel for UdpChannel {
    async fn recv_from(&self, buf: &mut [u8]) -> (Completion, Option<SocketAddr>) {
        if self.close_signal.is_closed() {
            return (Completion::closed(), None);
        }

        select! {
            result = self.socket.recv_from(buf) => match result {
                Ok((n, from)) => {
                    trace!("received packet of {} bytes from {:?}", n, from);
                    (Completion::done(n), Some(from))
                }
                Err(e) => (Completion::failed(e, 0), None),
            },
            _ = self.close_signal.closed() => (Completion::closed(), None),
        }
    }

    async fn send_to(&self, buf: &[u8], to: SocketAddr) -> Completion {
        if self.close_signal.is_closed() {
            return Completion::closed();
        }

        select! {
            result = self.socket.send_to(buf, to) => match result {
                Ok(n) => Completion::done(n),
                Err(e) => Completion::failed(e, 0),
            },
            _ = self.close_signal.closed() => Completion::closed(),
        }
    }

    fn close(&self) {
        debug!("closing UDP channel {:?}", self.socket.local_addr().ok());
        self.close_signal.close();
    }

    fn is_open(&self) -> bool {
        !self.close_signal.is_closed()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_recv() {
        let a = UdpChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        a.send_to(b"hello", b.local_addr().unwrap()).await.expect_len(5).unwrap();

        let mut buf = [0u8; 16];
        let (completion, from) = b.recv_from(&mut buf).await;
        assert_eq!(completion.transferred, 5);
        assert!(completion.error.is_none());
        assert_eq!(from, a.local_addr());
        assert_eq!(&buf[..5], b"hello");
    }

    #[tokio::test]
    async fn test_close() {
        let a = Arc::new(UdpChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap());

        let receiver = {
            let a = a.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 16];
                a.recv_from(&mut buf).await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        a.close();

        let (completion, from) = receiver.await.unwrap();
        assert!(completion.error.is_some());
        assert!(from.is_none());
        assert!(!a.is_open());
    }
}
