use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::channel::StreamChannel;
use crate::config::ConnectionConfig;
use crate::connection::processor::MessageProcessor;
use crate::connection::{accept_header, keep_receiving, keep_sending};
use crate::error::{NetError, PushError};
use crate::message::header::{Header, MessageHeader};
use crate::message::message::Message;
use crate::queue::MessageQueue;


/// Frames messages on an ordered byte stream: every message is its header followed by exactly
///  the number of body bytes the header declares.
///
/// The receive loop reads a header, asks the processor whether to accept it, reads the body and
///  delivers the message. There is no resynchronization: if the header is rejected, its body
///  bytes stay in the stream.
pub struct StreamConnection<C, P, H: Header = MessageHeader> {
    channel: Arc<C>,
    processor: Arc<P>,
    out_queue: MessageQueue<Message<H>>,
    sending: AtomicBool,
    max_body_len: usize,
}

impl<C, P, H> StreamConnection<C, P, H>
where
    C: StreamChannel,
    P: MessageProcessor<Message<H>>,
    H: Header,
{
    pub fn new(channel: Arc<C>, processor: Arc<P>, config: &ConnectionConfig) -> anyhow::Result<StreamConnection<C, P, H>> {
        config.validate_stream()?;

        let out_queue = match config.out_queue_capacity {
            Some(capacity) => MessageQueue::bounded(capacity),
            None => MessageQueue::new(),
        };

        Ok(StreamConnection {
            channel,
            processor,
            out_queue,
            sending: AtomicBool::new(false),
            max_body_len: config.max_body_len,
        })
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.channel.peer_addr()
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Closes the underlying channel. Pending transfers complete with an error, which is passed
    ///  to the processor's failure hooks.
    pub fn close(&self) {
        debug!("closing connection to {:?}", self.peer_addr());
        self.channel.close();
    }

    /// number of messages that are queued but not sent yet
    pub fn pending_sends(&self) -> usize {
        self.out_queue.size()
    }

    /// Queues a message for sending, starting a send cycle unless one is active. The message is
    ///  handed back if the outbound queue is full or closed.
    pub fn send_message(self: &Arc<Self>, msg: Message<H>) -> Result<(), PushError<Message<H>>> {
        let pending = self.out_queue.push_back(msg)?;
        trace!("queued message for sending, {} pending", pending);
        self.start_send_cycle();
        Ok(())
    }

    /// Starts the receive loop. It runs until the processor stops it or the channel is closed.
    pub fn listen_for_messages(self: &Arc<Self>) {
        let this = self.clone();
        self.channel.execute(Box::pin(async move {
            this.receive_loop().await;
        }));
    }

    async fn receive_loop(&self) {
        debug!("listening for messages from {:?}", self.peer_addr());

        let mut header_buf = vec![0u8; H::LEN];
        let mut body_buf = BytesMut::new();
        loop {
            if let Err(e) = self.receive_message(&mut header_buf, &mut body_buf).await {
                if !keep_receiving::<Message<H>, P>(self.processor.as_ref(), &e, self.channel.is_open()) {
                    break;
                }
            }
        }

        debug!("stopped listening for messages from {:?}", self.peer_addr());
    }

    async fn receive_message(&self, header_buf: &mut [u8], body_buf: &mut BytesMut) -> Result<(), NetError> {
        self.channel.read(header_buf).await.expect_len(H::LEN)?;

        let header = H::from_bytes(header_buf);
        if !accept_header::<Message<H>, P>(&header, self.max_body_len, self.processor.as_ref()) {
            return Ok(());
        }

        let mut msg = Message::new(header);
        let body_len = header.body_len();
        if body_len > 0 {
            body_buf.clear();
            body_buf.resize(body_len, 0);

            let completion = self.channel.read(&mut body_buf[..]).await;
            msg.add_data(&body_buf[..completion.transferred.min(body_len)]);
            if let Err(e) = completion.expect_len(body_len) {
                debug!("dropping incomplete message {:?}: received {} of {} body bytes", msg.header, msg.body_len(), body_len);
                return Err(e);
            }
        }

        trace!("received {:?}", msg.header);
        self.processor.on_receive(msg);
        Ok(())
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
            let stopped = !self.drain_queue().await;
            self.sending.store(false, Ordering::Release);

            // re-check for messages that were queued after the queue was found empty
            if stopped || self.out_queue.is_empty() || self.sending.swap(true, Ordering::AcqRel) {
                return;
            }
        }
    }

    /// Returns `false` if sending was stopped
    async fn drain_queue(&self) -> bool {
        while let Some(msg) = self.out_queue.pop_front() {
            if let Err(e) = self.send_one(&msg).await {
                if !keep_sending::<Message<H>, P>(self.processor.as_ref(), &e, self.channel.is_open()) {
                    debug!("{} messages remain queued", self.out_queue.size());
                    return false;
                }
            }
        }
        true
    }

    async fn send_one(&self, msg: &Message<H>) -> Result<(), NetError> {
        self.processor.on_send(msg);

        self.channel.write(msg.header.as_bytes()).await.expect_len(H::LEN)?;
        if !msg.is_empty() {
            self.channel.write(msg.body()).await.expect_len(msg.body_len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use mockall::Sequence;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
    use tokio::sync::mpsc;

    use super::*;
    use crate::channel::tokio_stream::TokioStreamChannel;
    use crate::channel::{Completion, MockStreamChannel};
    use crate::error::ErrorKind;
    use crate::test_util::commands::{test_message, TestCommand};
    use crate::test_util::processor::{Events, ProcessorEvent, RecordingProcessor};

    type DuplexChannel = TokioStreamChannel<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;
    type TestConnection = StreamConnection<DuplexChannel, RecordingProcessor<Message>>;

    fn connection(io: DuplexStream, config: &ConnectionConfig) -> (Arc<TestConnection>, Events<Message>) {
        let (processor, events) = RecordingProcessor::new();
        let channel = Arc::new(TokioStreamChannel::from_io(io));
        (Arc::new(StreamConnection::new(channel, processor, config).unwrap()), events)
    }

    fn wire(msg: &Message) -> Vec<u8> {
        let mut result = msg.header.as_bytes().to_vec();
        result.extend_from_slice(msg.body());
        result
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (a, b) = duplex(64);
        let (sender, mut sender_events) = connection(a, &Default::default());
        let (receiver, mut receiver_events) = connection(b, &Default::default());
        receiver.listen_for_messages();

        let messages = vec![
            test_message(TestCommand::Chat, "hello"),
            Message::with_command(TestCommand::Ping),
            test_message(TestCommand::Chat, &"x".repeat(200)),
        ];
        for msg in &messages {
            sender.send_message(msg.clone()).unwrap();
        }

        for msg in &messages {
            assert_eq!(&sender_events.next_sent().await, msg);
        }
        for msg in &messages {
            let received = receiver_events.next_received().await;
            assert_eq!(&received, msg);
            assert!(received.is_complete());
        }
        assert_eq!(sender.pending_sends(), 0);
    }

    #[tokio::test]
    async fn test_rejected_header_is_skipped() {
        let (a, b) = duplex(64);
        let (sender, _sender_events) = connection(a, &Default::default());
        let (receiver, mut receiver_events) = connection(b, &Default::default());
        receiver.processor().set_header_filter(|h: &MessageHeader| h.id != u32::from(TestCommand::Ping));
        receiver.listen_for_messages();

        let accepted = test_message(TestCommand::Chat, "after");
        sender.send_message(Message::with_command(TestCommand::Ping)).unwrap();
        sender.send_message(accepted.clone()).unwrap();

        assert_eq!(receiver_events.next_received().await, accepted);
        receiver_events.assert_quiet(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_oversized_body_stays_in_stream() {
        let (a, b) = duplex(64);
        let config = ConnectionConfig {
            max_body_len: 8,
            ..Default::default()
        };
        let (sender, _sender_events) = connection(a, &Default::default());
        let (receiver, mut receiver_events) = connection(b, &config);
        receiver.listen_for_messages();

        let mut small = Message::with_command(TestCommand::Move);
        small.write(&1i32).write(&2i32);

        // the dropped message's body is read as the next message
        let mut oversized = Message::with_command(TestCommand::Chat);
        oversized.push_bytes(&wire(&small));
        sender.send_message(oversized).unwrap();

        assert_eq!(receiver_events.next_received().await, small);
        receiver_events.assert_quiet(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_eof_inside_body_fails_and_stops() {
        let (mut raw, b) = duplex(64);
        let (receiver, mut events) = connection(b, &Default::default());
        receiver.listen_for_messages();

        let data = wire(&test_message(TestCommand::Chat, "truncated"));
        raw.write_all(&data[..data.len() - 3]).await.unwrap();
        drop(raw);

        match events.next().await {
            ProcessorEvent::ReceiveFailed(kind) => assert_eq!(kind, ErrorKind::Channel),
            other => panic!("unexpected event {:?}", other),
        }
        events.assert_quiet(Duration::from_millis(50)).await;
        assert!(!receiver.is_open());
    }

    #[tokio::test]
    async fn test_close_stops_listening() {
        let (_a, b) = duplex(64);
        let (receiver, mut events) = connection(b, &Default::default());
        receiver.listen_for_messages();

        tokio::time::sleep(Duration::from_millis(10)).await;
        receiver.close();

        match events.next().await {
            ProcessorEvent::ReceiveFailed(kind) => assert_eq!(kind, ErrorKind::Channel),
            other => panic!("unexpected event {:?}", other),
        }
        events.assert_quiet(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_close_inside_body_fails_and_stops() {
        let (mut raw, b) = duplex(64);
        let (receiver, mut events) = connection(b, &Default::default());
        receiver.listen_for_messages();

        let data = wire(&test_message(TestCommand::Chat, "interrupted"));
        raw.write_all(&data[..MessageHeader::LEN + 3]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        receiver.close();

        assert!(matches!(events.next().await, ProcessorEvent::ReceiveFailed(ErrorKind::Channel)));
        events.assert_quiet(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_close_with_stopping_processor() {
        let (_a, b) = duplex(64);
        let (receiver, mut events) = connection(b, &Default::default());
        receiver.processor().set_keep_receiving(false);
        receiver.listen_for_messages();

        tokio::time::sleep(Duration::from_millis(10)).await;
        receiver.close();

        assert!(matches!(events.next().await, ProcessorEvent::ReceiveFailed(ErrorKind::Channel)));
        events.assert_quiet(Duration::from_millis(50)).await;
        assert!(!receiver.is_open());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ConnectionConfig {
            out_queue_capacity: Some(0),
            ..Default::default()
        };
        let (processor, _events) = RecordingProcessor::<Message>::new();
        let result: anyhow::Result<StreamConnection<_, _>> = StreamConnection::new(Arc::new(MockStreamChannel::new()), processor, &config);
        assert!(result.is_err());
    }

    fn spawning_mock() -> MockStreamChannel {
        let mut channel = MockStreamChannel::new();
        channel.expect_execute().returning(|task| {
            tokio::spawn(task);
        });
        channel.expect_is_open().returning(|| true);
        channel.expect_peer_addr().returning(|| None);
        channel
    }

    #[tokio::test]
    async fn test_processor_stops_receiving() {
        let reads = Arc::new(AtomicUsize::new(0));

        let mut channel = spawning_mock();
        let counter = reads.clone();
        channel.expect_read().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Completion::failed(io::ErrorKind::ConnectionReset.into(), 0)
        });

        let (processor, mut events) = RecordingProcessor::<Message>::new();
        processor.set_keep_receiving(false);
        let connection: Arc<StreamConnection<_, _>> = Arc::new(StreamConnection::new(Arc::new(channel), processor, &Default::default()).unwrap());
        connection.listen_for_messages();

        assert!(matches!(events.next().await, ProcessorEvent::ReceiveFailed(ErrorKind::Channel)));
        events.assert_quiet(Duration::from_millis(50)).await;
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_header_is_written_before_body() {
        let first = test_message(TestCommand::Chat, "first");
        let second = Message::with_command(TestCommand::Pong);
        let (done_sender, mut done) = mpsc::unbounded_channel();

        let mut channel = spawning_mock();
        let mut seq = Sequence::new();
        for (bytes, is_last) in [
            (first.header.as_bytes().to_vec(), false),
            (first.body().to_vec(), false),
            (second.header.as_bytes().to_vec(), true),
        ] {
            let done_sender = done_sender.clone();
            channel.expect_write()
                .times(1)
                .in_sequence(&mut seq)
                .withf(move |buf| buf.to_vec() == bytes)
                .returning(move |buf| {
                    if is_last {
                        done_sender.send(()).unwrap();
                    }
                    Completion::done(buf.len())
                });
        }

        let (processor, _events) = RecordingProcessor::<Message>::new();
        let connection: Arc<StreamConnection<_, _>> = Arc::new(StreamConnection::new(Arc::new(channel), processor, &Default::default()).unwrap());
        connection.send_message(first).unwrap();
        connection.send_message(second).unwrap();

        tokio::time::timeout(Duration::from_secs(5), done.recv()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_failure_continues_with_next_message() {
        let failing = test_message(TestCommand::Chat, "lost");
        let next = Message::with_command(TestCommand::Ping);
        let (done_sender, mut done) = mpsc::unbounded_channel();

        let mut channel = spawning_mock();
        let mut seq = Sequence::new();
        channel.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Completion::failed(io::ErrorKind::BrokenPipe.into(), 0));
        let expected = next.header.as_bytes().to_vec();
        channel.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .withf(move |buf| buf.to_vec() == expected)
            .returning(move |buf| {
                done_sender.send(()).unwrap();
                Completion::done(buf.len())
            });

        let (processor, mut events) = RecordingProcessor::<Message>::new();
        let connection: Arc<StreamConnection<_, _>> = Arc::new(StreamConnection::new(Arc::new(channel), processor, &Default::default()).unwrap());
        connection.send_message(failing.clone()).unwrap();
        connection.send_message(next.clone()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), done.recv()).await.unwrap();
        assert!(matches!(events.next().await, ProcessorEvent::Sent(m) if m == failing));
        assert!(matches!(events.next().await, ProcessorEvent::SendFailed(ErrorKind::Channel)));
        assert!(matches!(events.next().await, ProcessorEvent::Sent(m) if m == next));
    }

    #[tokio::test]
    async fn test_stopped_send_cycle_keeps_remaining_messages() {
        let (done_sender, mut done) = mpsc::unbounded_channel();

        let mut channel = spawning_mock();
        let mut seq = Sequence::new();
        channel.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Completion::failed(io::ErrorKind::BrokenPipe.into(), 0));
        channel.expect_write()
            .times(2)
            .in_sequence(&mut seq)
            .returning(move |buf| {
                done_sender.send(()).unwrap();
                Completion::done(buf.len())
            });

        let (processor, mut events) = RecordingProcessor::<Message>::new();
        processor.set_keep_sending(false);
        let connection: Arc<StreamConnection<_, _>> = Arc::new(StreamConnection::new(Arc::new(channel), processor, &Default::default()).unwrap());
        connection.send_message(Message::with_command(TestCommand::Ping)).unwrap();
        connection.send_message(Message::with_command(TestCommand::Pong)).unwrap();

        assert!(matches!(events.next().await, ProcessorEvent::Sent(_)));
        assert!(matches!(events.next().await, ProcessorEvent::SendFailed(_)));
        events.assert_quiet(Duration::from_millis(20)).await;
        assert_eq!(connection.pending_sends(), 1);

        // the next message restarts sending, beginning with the one that was left behind
        connection.send_message(Message::with_command(TestCommand::Move)).unwrap();
        for _ in 0..2 {
            tokio::time::timeout(Duration::from_secs(5), done.recv()).await.unwrap();
        }
        assert!(matches!(events.next().await, ProcessorEvent::Sent(m) if m.header.id == u32::from(TestCommand::Pong)));
        assert!(matches!(events.next().await, ProcessorEvent::Sent(m) if m.header.id == u32::from(TestCommand::Move)));
        assert_eq!(connection.pending_sends(), 0);
    }

    #[tokio::test]
    async fn test_bounded_queue_refuses_messages() {
        let mut channel = MockStreamChannel::new();
        // never runs the send cycle, so messages stay queued
        channel.expect_execute().returning(|_| ());

        let config = ConnectionConfig {
            out_queue_capacity: Some(1),
            ..Default::default()
        };
        let (processor, _events) = RecordingProcessor::<Message>::new();
        let connection: Arc<StreamConnection<_, _>> = Arc::new(StreamConnection::new(Arc::new(channel), processor, &config).unwrap());

        connection.send_message(Message::with_command(TestCommand::Ping)).unwrap();
        let refused = connection.send_message(Message::with_command(TestCommand::Pong)).unwrap_err();
        assert!(refused.is_full());
        assert_eq!(refused.into_inner().header.id, u32::from(TestCommand::Pong));
        assert_eq!(connection.pending_sends(), 1);
    }
}
