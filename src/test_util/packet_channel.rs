use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::select;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use crate::channel::tokio_stream::CloseSignal;
use crate::channel::{Completion, DatagramChannel};


type Packet = (Vec<u8>, SocketAddr);

/// An in-memory [DatagramChannel]: tests feed inbound packets and inspect outbound packets.
///
/// Like a real socket, an inbound packet that does not fit the receive buffer is truncated.
pub struct PacketChannel {
    local_addr: SocketAddr,
    inbound_tx: mpsc::UnboundedSender<Packet>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Packet>>,
    sent_tx: mpsc::UnboundedSender<Packet>,
    sent_rx: Mutex<mpsc::UnboundedReceiver<Packet>>,
    close_signal: CloseSignal,
}

impl PacketChannel {
    pub fn new(local_addr: SocketAddr) -> PacketChannel {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        PacketChannel {
            local_addr,
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            sent_tx,
            sent_rx: Mutex::new(sent_rx),
            close_signal: Default::default(),
        }
    }

    /// makes a packet available for receiving
    pub fn feed(&self, data: Vec<u8>, from: SocketAddr) {
        // the channel owns a receiver, so this can not fail
        let _ = self.inbound_tx.send((data, from));
    }

    /// Waits for the next packet that was sent through this channel, panicking if there is none
    ///  within a few seconds
    pub async fn next_sent(&self) -> Packet {
        let mut sent = self.sent_rx.lock().await;
        match timeout(Duration::from_secs(5), sent.recv()).await {
            Ok(Some(packet)) => packet,
            _ => panic!("no packet was sent"),
        }
    }
}

#[async_trait]
impl DatagramChannel for PacketChannel {
    async fn recv_from(&self, buf: &mut [u8]) -> (Completion, Option<SocketAddr>) {
        if self.close_signal.is_closed() {
            return (Completion::closed(), None);
        }

        let mut inbound = self.inbound_rx.lock().await;
        select! {
            Some((data, from)) = inbound.recv() => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                (Completion::done(n), Some(from))
            }
            _ = self.close_signal.closed() => (Completion::closed(), None),
        }
    }

    async fn send_to(&self, buf: &[u8], to: SocketAddr) -> Completion {
        if self.close_signal.is_closed() {
            return Completion::closed();
        }
        let _ = self.sent_tx.send((buf.to_vec(), to));
        Completion::done(buf.len())
    }

    fn close(&self) {
        self.close_signal.close();
    }

    fn is_open(&self) -> bool {
        !self.close_signal.is_closed()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_truncates_to_buffer() {
        let channel = PacketChannel::new(SocketAddr::from(([127, 0, 0, 1], 1)));
        let from = SocketAddr::from(([127, 0, 0, 1], 2));
        channel.feed(b"abcdef".to_vec(), from);

        let mut buf = [0u8; 4];
        let (completion, sender) = channel.recv_from(&mut buf).await;
        assert_eq!(completion.transferred, 4);
        assert_eq!(sender, Some(from));
        assert_eq!(&buf, b"abcd");
    }
}
