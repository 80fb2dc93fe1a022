use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::connection::processor::MessageProcessor;
use crate::error::{ErrorKind, NetError};
use crate::message::NetMessage;


const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum ProcessorEvent<M> {
    Received(M),
    Sent(M),
    ReceiveFailed(ErrorKind),
    SendFailed(ErrorKind),
}

type HeaderFilter<H> = Box<dyn Fn(&H) -> bool + Send>;

/// A [MessageProcessor] that reports every hook call as a [ProcessorEvent], with configurable
///  return values for the hooks that decide how a connection continues.
pub struct RecordingProcessor<M: NetMessage> {
    events: mpsc::UnboundedSender<ProcessorEvent<M>>,
    keep_receiving: AtomicBool,
    keep_sending: AtomicBool,
    header_filter: Mutex<Option<HeaderFilter<M::Header>>>,
}

impl<M: NetMessage> RecordingProcessor<M> {
    pub fn new() -> (Arc<RecordingProcessor<M>>, Events<M>) {
        let (events, rx) = mpsc::unbounded_channel();
        let processor = RecordingProcessor {
            events,
            keep_receiving: AtomicBool::new(true),
            keep_sending: AtomicBool::new(true),
            header_filter: Default::default(),
        };
        (Arc::new(processor), Events { rx })
    }

    pub fn set_keep_receiving(&self, value: bool) {
        self.keep_receiving.store(value, Ordering::Release);
    }

    pub fn set_keep_sending(&self, value: bool) {
        self.keep_sending.store(value, Ordering::Release);
    }

    /// headers for which the filter returns `false` are rejected
    pub fn set_header_filter(&self, filter: impl Fn(&M::Header) -> bool + Send + 'static) {
        *self.header_filter.lock().unwrap() = Some(Box::new(filter));
    }

    fn record(&self, event: ProcessorEvent<M>) {
        // the receiving end may be gone at the end of a test
        let _ = self.events.send(event);
    }
}

impl<M: NetMessage + Clone> MessageProcessor<M> for RecordingProcessor<M> {
    fn on_receive(&self, msg: M) {
        self.record(ProcessorEvent::Received(msg));
    }

    fn on_send(&self, msg: &M) {
        self.record(ProcessorEvent::Sent(msg.clone()));
    }

    fn on_receive_header(&self, header: &M::Header) -> bool {
        match self.header_filter.lock().unwrap().as_ref() {
            Some(filter) => filter(header),
            None => true,
        }
    }

    fn on_receive_fail(&self, error: &NetError) -> bool {
        self.record(ProcessorEvent::ReceiveFailed(error.kind()));
        self.keep_receiving.load(Ordering::Acquire)
    }

    fn on_send_fail(&self, error: &NetError) -> bool {
        self.record(ProcessorEvent::SendFailed(error.kind()));
        self.keep_sending.load(Ordering::Acquire)
    }
}


/// The receiving end of a [RecordingProcessor]'s events. Waiting for an event panics if there is
///  none within a few seconds.
pub struct Events<M> {
    rx: mpsc::UnboundedReceiver<ProcessorEvent<M>>,
}

impl<M: Debug> Events<M> {
    pub async fn next(&mut self) -> ProcessorEvent<M> {
        match timeout(EVENT_TIMEOUT, self.rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => panic!("processor was dropped"),
            Err(_) => panic!("no processor event within {:?}", EVENT_TIMEOUT),
        }
    }

    /// the next received message, skipping `Sent` events
    pub async fn next_received(&mut self) -> M {
        loop {
            match self.next().await {
                ProcessorEvent::Received(msg) => return msg,
                ProcessorEvent::Sent(_) => {}
                other => panic!("expected a received message, was {:?}", other),
            }
        }
    }

    /// the next sent message, skipping `Received` events
    pub async fn next_sent(&mut self) -> M {
        loop {
            match self.next().await {
                ProcessorEvent::Sent(msg) => return msg,
                ProcessorEvent::Received(_) => {}
                other => panic!("expected a sent message, was {:?}", other),
            }
        }
    }

    pub async fn assert_quiet(&mut self, duration: Duration) {
        if let Ok(Some(event)) = timeout(duration, self.rx.recv()).await {
            panic!("unexpected event {:?}", event);
        }
    }
}
