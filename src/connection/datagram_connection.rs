use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace, warn};

use crate::channel::DatagramChannel;
use crate::config::ConnectionConfig;
use crate::connection::processor::MessageProcessor;
use crate::connection::reassembly::Reassembler;
use crate::connection::scratch_buffer::ScratchBuffer;
use crate::connection::{keep_receiving, keep_sending};
use crate::error::{NetError, PushError};
use crate::message::header::{Header, MessageHeader};
use crate::message::message::Message;
use crate::message::owned_message::OwnedMessage;
use crate::queue::MessageQueue;


/// Messages over a connectionless datagram socket, talking to any number of peers.
///
/// Every outbound message goes out as a single datagram (header followed by body), so it must
///  fit into the outbound scratch buffer. Inbound, a datagram may hold several messages, and a
///  message may span several datagrams (see [Reassembler]).
///
/// Received messages carry their sender, and outbound messages carry their destination.
pub struct DatagramConnection<C, P, H: Header = MessageHeader> {
    channel: Arc<C>,
    processor: Arc<P>,
    out_queue: MessageQueue<OwnedMessage<H>>,
    sending: AtomicBool,
    in_buffer: ScratchBuffer,
    out_buffer: ScratchBuffer,
    max_body_len: usize,
}

impl<C, P, H> DatagramConnection<C, P, H>
where
    C: DatagramChannel,
    P: MessageProcessor<OwnedMessage<H>>,
    H: Header,
{
    pub fn new(channel: Arc<C>, processor: Arc<P>, config: &ConnectionConfig) -> anyhow::Result<DatagramConnection<C, P, H>> {
        config.validate::<H>()?;

        let out_queue = match config.out_queue_capacity {
            Some(capacity) => MessageQueue::bounded(capacity),
            None => MessageQueue::new(),
        };

        Ok(DatagramConnection {
            channel,
            processor,
            out_queue,
            sending: AtomicBool::new(false),
            in_buffer: ScratchBuffer::new("inbound", config.datagram_in_buffer_size),
            out_buffer: ScratchBuffer::new("outbound", config.datagram_out_buffer_size),
            max_body_len: config.max_body_len,
        })
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.channel.local_addr()
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    pub fn close(&self) {
        debug!("closing datagram connection on {:?}", self.local_addr());
        self.channel.close();
    }

    pub fn pending_sends(&self) -> usize {
        self.out_queue.size()
    }

    pub fn in_buffer_size(&self) -> usize {
        self.in_buffer.size()
    }

    /// Fails once the buffer was allocated, i.e. after listening started. [Self::free_in_buffer]
    ///  makes the size configurable again.
    pub fn set_in_buffer_size(&self, size: usize) -> Result<(), NetError> {
        self.in_buffer.set_size(size)
    }

    pub fn free_in_buffer(&self) -> Result<(), NetError> {
        self.in_buffer.free()
    }

    pub fn out_buffer_size(&self) -> usize {
        self.out_buffer.size()
    }

    pub fn set_out_buffer_size(&self, size: usize) -> Result<(), NetError> {
        self.out_buffer.set_size(size)
    }

    pub fn free_out_buffer(&self) -> Result<(), NetError> {
        self.out_buffer.free()
    }

    /// Queues a message for its endpoint, starting a send cycle unless one is active
    pub fn send_message(self: &Arc<Self>, msg: OwnedMessage<H>) -> Result<(), PushError<OwnedMessage<H>>> {
        let pending = self.out_queue.push_back(msg)?;
        trace!("queued datagram for sending, {} pending", pending);
        self.start_send_cycle();
        Ok(())
    }

    pub fn send_message_to(self: &Arc<Self>, msg: Message<H>, to: SocketAddr) -> Result<(), PushError<Message<H>>> {
        self.send_message(OwnedMessage::new(msg, to))
            .map_err(|e| match e {
                PushError::Full(msg) => PushError::Full(msg.into_message()),
                PushError::Closed(msg) => PushError::Closed(msg.into_message()),
            })
    }

    pub fn listen_for_messages(self: &Arc<Self>) {
        let this = self.clone();
        self.channel.execute(Box::pin(async move {
            this.receive_loop().await;
        }));
    }

    async fn receive_loop(&self) {
        debug!("listening for datagrams on {:?}", self.local_addr());

        let mut buf = self.in_buffer.acquire();
        let mut reassembler = Reassembler::<H>::new(self.max_body_len);
        loop {
            let (completion, from) = self.channel.recv_from(&mut buf[..]).await;
            if let Some(e) = completion.error {
                if keep_receiving::<OwnedMessage<H>, P>(self.processor.as_ref(), &NetError::Channel(e), self.channel.is_open()) {
                    continue;
                }
                break;
            }

            match from {
                Some(from) => {
                    let len = completion.transferred.min(buf.len());
                    trace!("received datagram of {} bytes from {:?}", len, from);
                    reassembler.on_packet(&buf[..len], from, self.processor.as_ref());
                }
                None => warn!("datagram without sender address - ignoring it"),
            }
        }
        self.in_buffer.release(buf);

        debug!("stopped listening for datagrams on {:?}", self.local_addr());
    }

    fn start_send_cycle(self: &Arc<Self>) {
        if self.sending.swap(true, Ordering::AcqRel) {
            return;
        }

        let this = self.clone();
        self.channel.execute(Box::pin(async move {
            this.send_cycle().await;
        }));
    }

    async fn send_cycle(&self) {
        loop {
            let mut buf = self.out_buffer.acquire();
            let stopped = !self.drain_queue(&mut buf).await;
            // released before the flag is reset, so the next cycle finds the buffer parked
            self.out_buffer.release(buf);
            self.sending.store(false, Ordering::Release);

            if stopped || self.out_queue.is_empty() || self.sending.swap(true, Ordering::AcqRel) {
                return;
            }
        }
    }

    /// Returns `false` if sending was stopped
    async fn drain_queue(&self, buf: &mut BytesMut) -> bool {
        while let Some(msg) = self.out_queue.pop_front() {
            if let Err(e) = self.send_one(buf, &msg).await {
                if !keep_sending::<OwnedMessage<H>, P>(self.processor.as_ref(), &e, self.channel.is_open()) {
                    debug!("{} datagrams remain queued", self.out_queue.size());
                    return false;
                }
            }
        }
        true
    }

    async fn send_one(&self, buf: &mut BytesMut, msg: &OwnedMessage<H>) -> Result<(), NetError> {
        self.processor.on_send(msg);

        let len = H::LEN + msg.body_len();
        let capacity = self.out_buffer.size();
        if len > capacity {
            return Err(NetError::MessageTooLarge { len, capacity });
        }

        buf.clear();
        buf.put_slice(msg.header.as_bytes());
        buf.put_slice(msg.body());
        self.channel.send_to(&buf[..], msg.endpoint).await.expect_len(len)
    }
}
