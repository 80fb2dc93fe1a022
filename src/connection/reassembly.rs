use std::net::SocketAddr;

use tracing::{debug, trace};

use crate::connection::accept_header;
use crate::connection::processor::MessageProcessor;
use crate::message::header::Header;
use crate::message::message::Message;
use crate::message::owned_message::OwnedMessage;


/// Rebuilds messages from a sequence of datagrams.
///
/// A datagram may contain several messages back to back, and a message may span several
///  datagrams, including its header. Partial state always belongs to a single sender: a datagram
///  from a different sender discards it.
pub struct Reassembler<H: Header> {
    max_body_len: usize,
    partial_header: Vec<u8>,
    current: Option<Message<H>>,
    remaining: usize,
    sender: Option<SocketAddr>,
}

impl<H: Header> Reassembler<H> {
    pub fn new(max_body_len: usize) -> Reassembler<H> {
        Reassembler {
            max_body_len,
            partial_header: Vec::with_capacity(H::LEN),
            current: None,
            remaining: 0,
            sender: None,
        }
    }

    /// `true` if there is no partially received message
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.partial_header.is_empty()
    }

    pub fn reset(&mut self) {
        self.partial_header.clear();
        self.current = None;
        self.remaining = 0;
        self.sender = None;
    }

    /// Processes a single datagram, passing every message it completes to the processor
    pub fn on_packet<P: MessageProcessor<OwnedMessage<H>>>(&mut self, packet: &[u8], from: SocketAddr, processor: &P) {
        if !self.is_idle() && self.sender != Some(from) {
            debug!("packet from {:?} interrupts a partial message from {:?} - discarding the partial message", from, self.sender);
            self.reset();
        }
        self.sender = Some(from);

        let mut rest = packet;
        while !rest.is_empty() {
            if self.current.is_none() {
                let n = (H::LEN - self.partial_header.len()).min(rest.len());
                self.partial_header.extend_from_slice(&rest[..n]);
                rest = &rest[n..];
                if self.partial_header.len() < H::LEN {
                    trace!("header continues in the next packet");
                    return;
                }

                let header = H::from_bytes(&self.partial_header);
                self.partial_header.clear();
                if !accept_header::<OwnedMessage<H>, P>(&header, self.max_body_len, processor) {
                    // the remaining bytes can not be interpreted without knowing where the rejected body ends
                    debug!("discarding the remaining {} bytes of the packet", rest.len());
                    self.reset();
                    return;
                }
                self.remaining = header.body_len();
                self.current = Some(Message::new(header));
            }

            let n = self.remaining.min(rest.len());
            if let Some(current) = self.current.as_mut() {
                current.add_data(&rest[..n]);
            }
            self.remaining -= n;
            rest = &rest[n..];

            if self.remaining == 0 {
                if let Some(msg) = self.current.take() {
                    trace!("received {:?} from {:?}", msg.header, from);
                    processor.on_receive(OwnedMessage::new(msg, from));
                }
            }
        }
    }
}
