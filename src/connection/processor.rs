use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::{NetError, PushError};
use crate::message::NetMessage;
use crate::queue::MessageQueue;


/// The application's hooks into a connection.
///
/// A connection calls these from its own execution context, one at a time per direction. They
///  should return quickly: heavy work belongs on an application thread, e.g. by handing messages
///  over through a [MessageQueue] (see [ForwardingProcessor]).
///
/// The default implementations log and keep the connection going.
pub trait MessageProcessor<M: NetMessage>: Send + Sync + 'static {
    /// called with every completely received message
    fn on_receive(&self, msg: M) {
        debug!("received {:?}", msg);
    }

    /// called for every message right before it is sent
    fn on_send(&self, msg: &M) {
        trace!("sending {:?}", msg);
    }

    /// Called for every received header before its body is read. Returning `false` drops the
    ///  message.
    fn on_receive_header(&self, header: &M::Header) -> bool {
        trace!("received header {:?}", header);
        true
    }

    /// Returning `true` keeps the connection listening for messages. A partially received
    ///  message is discarded.
    fn on_receive_fail(&self, error: &NetError) -> bool {
        warn!("receive failed: {}", error);
        true
    }

    /// Returning `true` keeps the connection sending queued messages
    fn on_send_fail(&self, error: &NetError) -> bool {
        warn!("send failed: {}", error);
        true
    }
}


/// Default hooks only
pub struct LoggingProcessor;

impl<M: NetMessage> MessageProcessor<M> for LoggingProcessor {}


/// Hands received messages to a queue that application threads consume, typically blocking in
///  [MessageQueue::wait].
pub struct ForwardingProcessor<M> {
    queue: Arc<MessageQueue<M>>,
}

impl<M> ForwardingProcessor<M> {
    pub fn new(queue: Arc<MessageQueue<M>>) -> ForwardingProcessor<M> {
        ForwardingProcessor { queue }
    }

    pub fn queue(&self) -> &Arc<MessageQueue<M>> {
        &self.queue
    }
}

impl<M: NetMessage> MessageProcessor<M> for ForwardingProcessor<M> {
    fn on_receive(&self, msg: M) {
        match self.queue.push_back(msg) {
            Ok(len) => trace!("forwarded received message, {} waiting", len),
            Err(PushError::Full(msg)) => warn!("inbound queue is full - dropping {:?}", msg),
            Err(PushError::Closed(msg)) => debug!("inbound queue is closed - dropping {:?}", msg),
        }
    }
}
