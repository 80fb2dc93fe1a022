use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};

use crate::message::header::{Header, MessageHeader};
use crate::message::message::Message;
use crate::message::NetMessage;


/// A message together with the peer it belongs to: the sender for received messages, the
///  destination for messages that are sent.
///
/// This is what datagram connections carry, since a single datagram socket talks to any number
///  of peers.
#[derive(Clone, Eq, PartialEq)]
pub struct OwnedMessage<H: Header = MessageHeader> {
    pub message: Message<H>,
    pub endpoint: SocketAddr,
}

impl<H: Header> OwnedMessage<H> {
    pub fn new(message: Message<H>, endpoint: SocketAddr) -> OwnedMessage<H> {
        OwnedMessage { message, endpoint }
    }

    pub fn into_message(self) -> Message<H> {
        self.message
    }
}

impl<H: Header> Deref for OwnedMessage<H> {
    type Target = Message<H>;

    fn deref(&self) -> &Message<H> {
        &self.message
    }
}

impl<H: Header> DerefMut for OwnedMessage<H> {
    fn deref_mut(&mut self) -> &mut Message<H> {
        &mut self.message
    }
}

impl<H: Header> NetMessage for OwnedMessage<H> {
    type Header = H;

    fn header(&self) -> &H {
        &self.message.header
    }

    fn body(&self) -> &[u8] {
        self.message.body()
    }
}

impl<H: Header> Debug for OwnedMessage<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}@{:?}", self.message, self.endpoint)
    }
}
